//! Batch pipeline: unit → discovery → per-test objectives → gate → storage → audit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use objectivedb_discovery::{DiscoveryEngine, DiscoveryOutcome, ObjectiveExtraction};
use objectivedb_inference::InferenceEngine;
use objectivedb_shared::{
    AuditRecord, AuditStatus, Objective, ObjectiveDbError, ProcessingUnit, ReferenceData, Result,
    RunConfig, TestCandidate,
};
use objectivedb_storage::Storage;
use objectivedb_validation::{ValidationGate, assign_status};

use crate::audit::AuditTracker;
use crate::catalog::sample_tests;

// ---------------------------------------------------------------------------
// Test sources
// ---------------------------------------------------------------------------

/// Where a unit's tests and their official objectives come from.
#[async_trait]
pub trait TestSource: Send + Sync {
    /// Discover the tests of a unit. An error fails the unit's audit.
    async fn discover(&self, unit: &ProcessingUnit) -> Result<DiscoveryOutcome>;

    /// Extract verified objectives for one test. Never fails.
    async fn extract_objectives(&self, test: &TestCandidate) -> ObjectiveExtraction;
}

#[async_trait]
impl TestSource for DiscoveryEngine {
    async fn discover(&self, unit: &ProcessingUnit) -> Result<DiscoveryOutcome> {
        Ok(DiscoveryEngine::discover(self, unit).await)
    }

    async fn extract_objectives(&self, test: &TestCandidate) -> ObjectiveExtraction {
        DiscoveryEngine::extract_objectives(self, test).await
    }
}

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

/// Per-run knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Minimum confidence kept by inference (inclusive).
    pub confidence_threshold: f64,
    /// Fall back to the sample tests when discovery finds none.
    pub synthesize_when_empty: bool,
    /// Try extraction and standards synthesis before inference.
    pub extract_objectives: bool,
    /// Wall-clock limit for one unit.
    pub unit_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for OrchestratorOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            synthesize_when_empty: config.synthesize_when_empty,
            extract_objectives: config.extract_objectives,
            unit_timeout: Duration::from_secs(config.unit_timeout_secs),
        }
    }
}

/// Outcome of one unit: its closed audit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: ProcessingUnit,
    pub audit: AuditRecord,
}

/// Totals over a batch, reduced from the closed audits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub units_processed: usize,
    pub total_tests: u64,
    pub total_objectives: u64,
    pub total_verified: u64,
    pub total_inferred: u64,
    /// Names of units whose audit closed as `error` or that could not be
    /// processed at all.
    pub error_units: Vec<String>,
    /// The batch stopped early on cancellation.
    pub cancelled: bool,
    pub reports: Vec<UnitReport>,
    /// Units that failed before an audit could be recorded.
    pub failures: Vec<UnitFailure>,
}

/// A unit that failed outside its audit, e.g. while registering the unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit: ProcessingUnit,
    pub error: String,
}

impl BatchSummary {
    fn push(&mut self, report: UnitReport) {
        let counts = report.audit.counts;
        self.units_processed += 1;
        self.total_tests += u64::from(counts.tests_found);
        self.total_objectives += u64::from(counts.total_objectives());
        self.total_verified += u64::from(counts.objectives_found);
        self.total_inferred += u64::from(counts.objectives_inferred);
        if report.audit.status == AuditStatus::Error {
            self.error_units.push(report.unit.name.clone());
        }
        self.reports.push(report);
    }

    fn push_failure(&mut self, unit: &ProcessingUnit, error: &ObjectiveDbError) {
        self.units_processed += 1;
        self.error_units.push(unit.name.clone());
        self.failures.push(UnitFailure {
            unit: unit.clone(),
            error: error.to_string(),
        });
    }

    /// Share of objectives that were not inferred, in percent.
    pub fn verified_pct(&self) -> f64 {
        if self.total_objectives == 0 {
            0.0
        } else {
            self.total_verified as f64 / self.total_objectives as f64 * 100.0
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a unit starts.
    fn unit_started(&self, unit: &ProcessingUnit, current: usize, total: usize);
    /// Called when entering a phase within a unit.
    fn phase(&self, name: &str);
    /// Called before a test's objectives are gathered.
    fn test_started(&self, name: &str, current: usize, total: usize);
    /// Called when a unit's audit closes.
    fn unit_done(&self, report: &UnitReport);
    /// Called when a unit fails without a closed audit.
    fn unit_failed(&self, unit: &ProcessingUnit, error: &ObjectiveDbError);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn unit_started(&self, _unit: &ProcessingUnit, _current: usize, _total: usize) {}
    fn phase(&self, _name: &str) {}
    fn test_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn unit_done(&self, _report: &UnitReport) {}
    fn unit_failed(&self, _unit: &ProcessingUnit, _error: &ObjectiveDbError) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// How a unit's work ended, before its audit is closed.
enum UnitEnd {
    Finished(Result<()>),
    TimedOut,
    Cancelled,
}

/// Runs units through the pipeline and records an audit per unit.
pub struct Orchestrator {
    storage: Storage,
    source: Arc<dyn TestSource>,
    gate: ValidationGate,
    inference: InferenceEngine,
    opts: OrchestratorOptions,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        storage: Storage,
        source: Arc<dyn TestSource>,
        refs: Arc<ReferenceData>,
        opts: OrchestratorOptions,
    ) -> Self {
        // Sender dropped: the receiver never reports cancellation.
        let (_tx, cancel) = watch::channel(false);
        Self {
            storage,
            source,
            gate: ValidationGate::new(Arc::clone(&refs)),
            inference: InferenceEngine::new(refs),
            opts,
            cancel,
        }
    }

    /// Stop the batch once `cancel` turns `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Process units strictly in order. Unit failures are recorded in their
    /// audits and do not stop the batch; cancellation does.
    #[instrument(skip_all, fields(units = units.len()))]
    pub async fn run_batch(
        &self,
        units: &[ProcessingUnit],
        progress: &dyn ProgressReporter,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        info!("starting batch");

        for (i, unit) in units.iter().enumerate() {
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            progress.unit_started(unit, i + 1, units.len());
            let report = match self.process_unit(unit, progress).await {
                Ok(report) => report,
                Err(e) => {
                    error!(unit = %unit.name, error = %e, "unit could not be processed");
                    progress.unit_failed(unit, &e);
                    summary.push_failure(unit, &e);
                    continue;
                }
            };
            progress.unit_done(&report);

            let cancelled = report.audit.status == AuditStatus::Error && self.is_cancelled();
            summary.push(report);
            if cancelled {
                summary.cancelled = true;
                break;
            }
        }

        info!(
            units = summary.units_processed,
            tests = summary.total_tests,
            objectives = summary.total_objectives,
            verified = summary.total_verified,
            inferred = summary.total_inferred,
            errors = summary.error_units.len(),
            cancelled = summary.cancelled,
            "batch complete"
        );
        Ok(summary)
    }

    /// Run one unit and close its audit.
    ///
    /// Errors inside the unit close the audit as `error`. Failing to register
    /// the unit or to open or close its audit is returned as an error, which
    /// [`Orchestrator::run_batch`] records without stopping the batch.
    #[instrument(skip_all, fields(unit = %unit.name))]
    pub async fn process_unit(
        &self,
        unit: &ProcessingUnit,
        progress: &dyn ProgressReporter,
    ) -> Result<UnitReport> {
        let unit_id = self.storage.upsert_unit(&unit.name, &unit.short_code).await?;
        let mut tracker = AuditTracker::start(&self.storage, &unit_id).await?;
        let mut cancel = self.cancel.clone();

        let end = {
            let work = self.run_unit(unit, &unit_id, &mut tracker, progress);
            tokio::select! {
                res = tokio::time::timeout(self.opts.unit_timeout, work) => match res {
                    Ok(res) => UnitEnd::Finished(res),
                    Err(_) => UnitEnd::TimedOut,
                },
                _ = cancelled(&mut cancel) => UnitEnd::Cancelled,
            }
        };

        let audit_id = tracker.id().clone();
        let counts = tracker.counts();
        let closed = match end {
            UnitEnd::Finished(Ok(())) => {
                let status = if counts.tests_found > 0 {
                    AuditStatus::Complete
                } else {
                    AuditStatus::Partial
                };
                tracker.finish(status, None).await
            }
            UnitEnd::Finished(Err(e)) => {
                error!(error = %e, "unit failed");
                tracker.fail(&e.to_string()).await
            }
            UnitEnd::TimedOut => {
                let message = format!("timed out after {:?}", self.opts.unit_timeout);
                error!("{message}");
                tracker.fail(&message).await
            }
            UnitEnd::Cancelled => {
                warn!("unit cancelled");
                tracker.fail(&ObjectiveDbError::Cancelled.to_string()).await
            }
        };

        let audit = match closed {
            Ok(audit) => audit,
            Err(e) => {
                // Leave no audit `running` behind.
                let notes = format!("audit close failed: {e}");
                if let Err(close_err) = self
                    .storage
                    .complete_audit(&audit_id, AuditStatus::Error, &counts, Some(&notes))
                    .await
                {
                    warn!(audit = %audit_id, error = %close_err, "could not close audit as error");
                }
                return Err(e);
            }
        };

        Ok(UnitReport {
            unit: unit.clone(),
            audit,
        })
    }

    async fn run_unit(
        &self,
        unit: &ProcessingUnit,
        unit_id: &str,
        tracker: &mut AuditTracker<'_>,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        progress.phase("Discovering tests");
        let outcome = self.source.discover(unit).await?;
        tracker.record_queries(outcome.queries_run);

        let mut tests = outcome.tests;
        if tests.is_empty() && self.opts.synthesize_when_empty {
            info!("no tests discovered, using sample tests");
            tests = sample_tests(unit);
        }

        progress.phase("Gathering objectives");
        let total = tests.len();
        for (i, test) in tests.iter().enumerate() {
            progress.test_started(&test.name, i + 1, total);

            let verdict = self.gate.validate_test(test);
            if !verdict.is_accepted() {
                warn!(test = %test.name, issues = ?verdict.issues, "test rejected");
                continue;
            }

            let test_id = self.storage.upsert_test(unit_id, test).await?;
            tracker.record_test();

            let objectives = self.objectives_for(test).await;
            self.storage.replace_objectives(&test_id, &objectives).await?;
            for objective in &objectives {
                tracker.record_objective(objective);
            }
            info!(test = %test.name, objectives = objectives.len(), "test stored");
        }
        Ok(())
    }

    /// Extraction, then standards synthesis, then inference: the first path
    /// with gate-accepted objectives wins.
    async fn objectives_for(&self, test: &TestCandidate) -> Vec<Objective> {
        let info = test.to_test_info();

        if self.opts.extract_objectives {
            let extraction = self.source.extract_objectives(test).await;
            let verified: Vec<Objective> = extraction
                .objectives
                .into_iter()
                .map(|mut o| {
                    o.validation_status = assign_status(&o);
                    o
                })
                .collect();
            let accepted = self.accepted(verified);
            if !accepted.is_empty() {
                return accepted;
            }

            if let Some(raw) = extraction.raw_text.as_deref() {
                let accepted = self.accepted(self.inference.synthesize_from_standards(raw, &info));
                if !accepted.is_empty() {
                    return accepted;
                }
            }
        }

        self.accepted(self.inference.infer(&info, self.opts.confidence_threshold))
    }

    fn accepted(&self, candidates: Vec<Objective>) -> Vec<Objective> {
        candidates
            .into_iter()
            .filter(|o| {
                let verdict = self.gate.validate_objective(o);
                if !verdict.is_accepted() {
                    warn!(
                        index = o.index,
                        notes = %verdict.notes().unwrap_or_default(),
                        "objective rejected"
                    );
                }
                verdict.is_accepted()
            })
            .collect()
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Resolves once the flag turns `true`; never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use objectivedb_shared::{ObjectiveDbError, ValidationStatus};
    use uuid::Uuid;

    use super::*;
    use crate::catalog::SampleCatalog;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("odb_pipeline_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn opts() -> OrchestratorOptions {
        OrchestratorOptions {
            confidence_threshold: 0.4,
            synthesize_when_empty: true,
            extract_objectives: true,
            unit_timeout: Duration::from_secs(30),
        }
    }

    fn unit(name: &str, code: &str) -> ProcessingUnit {
        ProcessingUnit::new(name, code).unwrap()
    }

    async fn orchestrator(source: Arc<dyn TestSource>, opts: OrchestratorOptions) -> Orchestrator {
        Orchestrator::new(
            test_storage().await,
            source,
            Arc::new(ReferenceData::default()),
            opts,
        )
    }

    /// Source whose discovery fails for configured unit codes and otherwise
    /// serves one test with canned extraction output.
    #[derive(Default)]
    struct FakeSource {
        failing: Vec<String>,
        tests: Vec<TestCandidate>,
        extraction: Vec<Objective>,
        raw_text: Option<String>,
        discovered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TestSource for FakeSource {
        async fn discover(&self, unit: &ProcessingUnit) -> Result<DiscoveryOutcome> {
            self.discovered.lock().unwrap().push(unit.short_code.clone());
            if self.failing.contains(&unit.short_code) {
                return Err(ObjectiveDbError::Network("search backend unreachable".into()));
            }
            Ok(DiscoveryOutcome {
                tests: self.tests.clone(),
                queries_run: 11,
                sources: vec![],
            })
        }

        async fn extract_objectives(&self, _test: &TestCandidate) -> ObjectiveExtraction {
            ObjectiveExtraction {
                objectives: self.extraction.clone(),
                raw_text: self.raw_text.clone(),
            }
        }
    }

    /// Source that never finishes discovery.
    struct StuckSource;

    #[async_trait]
    impl TestSource for StuckSource {
        async fn discover(&self, _unit: &ProcessingUnit) -> Result<DiscoveryOutcome> {
            std::future::pending().await
        }

        async fn extract_objectives(&self, _test: &TestCandidate) -> ObjectiveExtraction {
            ObjectiveExtraction::default()
        }
    }

    fn praxis_math() -> TestCandidate {
        TestCandidate::new("Praxis", "Mathematics: Content Knowledge")
            .with_code("5161")
            .with_subject("Mathematics")
            .with_provider("ETS")
            .with_source_url("https://www.ets.org/praxis/5161")
    }

    /// Rows persisted for a unit, split by provenance.
    async fn persisted_counts(storage: &Storage, unit_id: &str) -> (u32, u32) {
        let mut verified = 0;
        let mut inferred = 0;
        for test in storage.list_tests_by_unit(unit_id).await.unwrap() {
            for o in storage.list_objectives_by_test(&test.id).await.unwrap() {
                if o.is_inferred {
                    inferred += 1;
                } else {
                    verified += 1;
                }
            }
        }
        (verified, inferred)
    }

    #[tokio::test]
    async fn demo_unit_counts_match_storage() {
        let orch = orchestrator(Arc::new(SampleCatalog), opts()).await;
        let report = orch.process_unit(&unit("Alabama", "AL"), &SilentProgress).await.unwrap();

        assert_eq!(report.audit.status, AuditStatus::Complete);
        assert_eq!(report.audit.counts.tests_found, 3);
        assert!(report.audit.counts.objectives_inferred > 0);
        assert_eq!(report.audit.counts.objectives_found, 0);

        let (verified, inferred) = persisted_counts(orch.storage(), &report.audit.unit_id).await;
        assert_eq!(verified, report.audit.counts.objectives_found);
        assert_eq!(inferred, report.audit.counts.objectives_inferred);
    }

    #[tokio::test]
    async fn rerun_replaces_objectives() {
        let orch = orchestrator(Arc::new(SampleCatalog), opts()).await;
        let first = orch.process_unit(&unit("Alabama", "AL"), &SilentProgress).await.unwrap();
        let second = orch.process_unit(&unit("Alabama", "AL"), &SilentProgress).await.unwrap();
        assert_ne!(first.audit.id, second.audit.id);

        let tests = orch.storage().list_tests_by_unit(&second.audit.unit_id).await.unwrap();
        assert_eq!(tests.len(), 3);
        let (_, inferred) = persisted_counts(orch.storage(), &second.audit.unit_id).await;
        assert_eq!(inferred, second.audit.counts.objectives_inferred);
    }

    #[tokio::test]
    async fn extracted_objectives_win_over_inference() {
        let source = FakeSource {
            tests: vec![praxis_math()],
            extraction: vec![
                Objective::verified(
                    0,
                    "Demonstrate understanding of number and quantity concepts",
                    "https://www.ets.org/praxis/5161",
                ),
                Objective::verified(1, "Apply knowledge", "https://www.ets.org/praxis/5161"),
            ],
            ..FakeSource::default()
        };
        let orch = orchestrator(Arc::new(source), opts()).await;
        let report = orch.process_unit(&unit("Ohio", "OH"), &SilentProgress).await.unwrap();

        assert_eq!(report.audit.counts.objectives_found, 1);
        assert_eq!(report.audit.counts.objectives_inferred, 0);
        assert_eq!(report.audit.counts.queries_run, 11);

        let tests = orch.storage().list_tests_by_unit(&report.audit.unit_id).await.unwrap();
        let stored = orch.storage().list_objectives_by_test(&tests[0].id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].validation_status, ValidationStatus::Verified);
    }

    #[tokio::test]
    async fn synthesis_used_before_inference() {
        let source = FakeSource {
            tests: vec![praxis_math()],
            raw_text: Some(
                "Menu\nCandidates demonstrate the ability to model proportional relationships\n"
                    .into(),
            ),
            ..FakeSource::default()
        };
        let orch = orchestrator(Arc::new(source), opts()).await;
        let report = orch.process_unit(&unit("Ohio", "OH"), &SilentProgress).await.unwrap();

        let tests = orch.storage().list_tests_by_unit(&report.audit.unit_id).await.unwrap();
        let stored = orch.storage().list_objectives_by_test(&tests[0].id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].validation_status, ValidationStatus::Partial);
        assert_eq!(report.audit.counts.objectives_inferred, 1);
    }

    #[tokio::test]
    async fn no_tests_without_fallback_is_partial() {
        let source = FakeSource::default();
        let orch = orchestrator(
            Arc::new(source),
            OrchestratorOptions {
                synthesize_when_empty: false,
                ..opts()
            },
        )
        .await;
        let report = orch.process_unit(&unit("Utah", "UT"), &SilentProgress).await.unwrap();
        assert_eq!(report.audit.status, AuditStatus::Partial);
        assert_eq!(report.audit.counts.tests_found, 0);
    }

    #[tokio::test]
    async fn rejected_tests_are_not_stored() {
        let source = FakeSource {
            tests: vec![TestCandidate::new("Praxis", "Praxis 5001")],
            ..FakeSource::default()
        };
        let orch = orchestrator(Arc::new(source), opts()).await;
        let report = orch.process_unit(&unit("Utah", "UT"), &SilentProgress).await.unwrap();
        assert_eq!(report.audit.counts.tests_found, 0);
        assert_eq!(report.audit.status, AuditStatus::Partial);
    }

    #[tokio::test]
    async fn failing_discovery_closes_error_and_batch_continues() {
        let source = Arc::new(FakeSource {
            failing: vec!["AK".into()],
            tests: vec![praxis_math()],
            ..FakeSource::default()
        });
        let orch = orchestrator(source.clone(), opts()).await;
        let units = [unit("Alabama", "AL"), unit("Alaska", "AK"), unit("Arizona", "AZ")];
        let summary = orch.run_batch(&units, &SilentProgress).await.unwrap();

        assert_eq!(summary.units_processed, 3);
        assert_eq!(summary.error_units, vec!["Alaska".to_string()]);
        assert!(!summary.cancelled);

        let alaska = &summary.reports[1].audit;
        assert_eq!(alaska.status, AuditStatus::Error);
        assert!(alaska.notes.as_deref().unwrap().contains("search backend unreachable"));
        assert_eq!(alaska.counts.tests_found, 0);

        assert_eq!(summary.reports[0].audit.status, AuditStatus::Complete);
        assert_eq!(summary.reports[2].audit.status, AuditStatus::Complete);
        assert_eq!(summary.total_tests, 2);
        let per_unit = summary.reports[0].audit.counts.total_objectives();
        assert!(per_unit > 0);
        assert_eq!(summary.total_objectives, u64::from(per_unit) * 2);
        assert_eq!(*source.discovered.lock().unwrap(), vec!["AL", "AK", "AZ"]);
    }

    #[tokio::test]
    async fn unregistrable_unit_is_recorded_and_batch_continues() {
        let orch = orchestrator(Arc::new(SampleCatalog), opts()).await;
        // Another unit already owns the AL code.
        orch.storage().upsert_unit("Old Alabama", "AL").await.unwrap();

        let units = [unit("Alabama", "AL"), unit("Alaska", "AK")];
        let summary = orch.run_batch(&units, &SilentProgress).await.unwrap();

        assert_eq!(summary.units_processed, 2);
        assert_eq!(summary.error_units, vec!["Alabama".to_string()]);
        assert!(!summary.cancelled);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].unit.short_code, "AL");
        assert!(summary.failures[0].error.contains("short_code"));

        assert_eq!(summary.reports.len(), 1);
        let alaska = &summary.reports[0];
        assert_eq!(alaska.unit.name, "Alaska");
        assert_eq!(alaska.audit.status, AuditStatus::Complete);
        assert_eq!(summary.total_tests, 3);

        let audits = orch.storage().list_audits(None).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert!(audits.iter().all(|a| a.status != AuditStatus::Running));
    }

    #[tokio::test]
    async fn timeout_closes_unit_and_batch_continues() {
        let orch = orchestrator(
            Arc::new(StuckSource),
            OrchestratorOptions {
                unit_timeout: Duration::from_millis(50),
                ..opts()
            },
        )
        .await;
        let units = [unit("Alabama", "AL"), unit("Alaska", "AK")];
        let summary = orch.run_batch(&units, &SilentProgress).await.unwrap();

        assert_eq!(summary.units_processed, 2);
        assert_eq!(summary.error_units.len(), 2);
        assert!(!summary.cancelled);
        assert_eq!(summary.reports[0].audit.notes.as_deref(), Some("timed out after 50ms"));
    }

    #[tokio::test]
    async fn cancel_stops_batch() {
        let (tx, rx) = watch::channel(false);
        let orch = orchestrator(Arc::new(StuckSource), opts()).await.with_cancel(rx);
        let units = [unit("Alabama", "AL"), unit("Alaska", "AK")];

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        });
        let summary = orch.run_batch(&units, &SilentProgress).await.unwrap();
        cancel.await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.units_processed, 1);
        assert_eq!(summary.reports[0].audit.status, AuditStatus::Error);
        assert_eq!(summary.reports[0].audit.notes.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn threshold_above_every_strategy_leaves_tests_empty() {
        let orch = orchestrator(
            Arc::new(SampleCatalog),
            OrchestratorOptions {
                confidence_threshold: 0.9,
                ..opts()
            },
        )
        .await;
        let report = orch.process_unit(&unit("Maine", "ME"), &SilentProgress).await.unwrap();
        assert_eq!(report.audit.status, AuditStatus::Complete);
        assert_eq!(report.audit.counts.tests_found, 3);
        assert_eq!(report.audit.counts.total_objectives(), 0);
    }
}
