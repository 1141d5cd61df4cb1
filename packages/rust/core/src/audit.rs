//! Audit tracking for a single unit run.
//!
//! An [`AuditTracker`] owns the `running` audit row of one unit. It tallies
//! counts while the unit is processed and is consumed when the audit closes,
//! so a closed audit cannot be touched again.

use tracing::{debug, info};

use objectivedb_shared::{
    AuditCounts, AuditId, AuditRecord, AuditStatus, Objective, ObjectiveDbError, Result,
};
use objectivedb_storage::Storage;

/// Tracks one running audit.
pub struct AuditTracker<'a> {
    storage: &'a Storage,
    id: AuditId,
    unit_id: String,
    counts: AuditCounts,
}

impl<'a> AuditTracker<'a> {
    /// Persist a `running` audit for `unit_id`.
    pub async fn start(storage: &'a Storage, unit_id: &str) -> Result<Self> {
        let id = storage.start_audit(unit_id).await?;
        debug!(audit = %id, unit_id, "audit started");
        Ok(Self {
            storage,
            id,
            unit_id: unit_id.to_string(),
            counts: AuditCounts::default(),
        })
    }

    pub fn id(&self) -> &AuditId {
        &self.id
    }

    pub fn counts(&self) -> AuditCounts {
        self.counts
    }

    pub fn record_queries(&mut self, n: u32) {
        self.counts.queries_run += n;
    }

    pub fn record_test(&mut self) {
        self.counts.tests_found += 1;
    }

    /// Tally a persisted objective by provenance.
    pub fn record_objective(&mut self, objective: &Objective) {
        if objective.is_inferred {
            self.counts.objectives_inferred += 1;
        } else {
            self.counts.objectives_found += 1;
        }
    }

    /// Close the audit with a terminal status.
    pub async fn finish(self, status: AuditStatus, notes: Option<&str>) -> Result<AuditRecord> {
        if !AuditStatus::Running.can_transition_to(status) {
            return Err(ObjectiveDbError::audit(format!(
                "audit {} cannot close as {status}",
                self.id
            )));
        }

        self.storage
            .complete_audit(&self.id, status, &self.counts, notes)
            .await?;
        info!(
            audit = %self.id,
            unit_id = %self.unit_id,
            %status,
            tests = self.counts.tests_found,
            objectives = self.counts.total_objectives(),
            "audit closed"
        );

        self.storage
            .get_audit(&self.id)
            .await?
            .ok_or_else(|| ObjectiveDbError::audit(format!("audit {} vanished", self.id)))
    }

    /// Close the audit as `error` with `message` as notes.
    pub async fn fail(self, message: &str) -> Result<AuditRecord> {
        self.finish(AuditStatus::Error, Some(message)).await
    }
}
