//! libSQL storage layer for units, tests, objectives and audits.
//!
//! The [`Storage`] struct wraps a local libSQL database. The orchestrator is
//! the sole writer via [`Storage::open`]; reporting commands use
//! [`Storage::open_readonly`].

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use objectivedb_shared::{
    AuditCounts, AuditId, AuditRecord, AuditStatus, Objective, ObjectiveDbError, ProcessingUnit,
    Result, StoredTest, TestCandidate, ValidationStatus,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Row counts across the whole database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub units: u64,
    pub tests: u64,
    pub objectives: u64,
    pub verified: u64,
    pub partial: u64,
    pub inferred: u64,
    pub audits_running: u64,
    pub audits_complete: u64,
    pub audits_partial: u64,
    pub audits_error: u64,
}

fn db_err(e: libsql::Error) -> ObjectiveDbError {
    ObjectiveDbError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ObjectiveDbError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ObjectiveDbError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ObjectiveDbError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ObjectiveDbError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Units
    // -----------------------------------------------------------------------

    /// Return the id of the unit named `name`, creating it on first reference.
    ///
    /// A different unit already holding `short_code` is a storage error.
    pub async fn upsert_unit(&self, name: &str, short_code: &str) -> Result<String> {
        self.check_writable()?;
        let unit = ProcessingUnit::new(name, short_code)?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO units (id, name, short_code, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO NOTHING",
                params![id.as_str(), unit.name.as_str(), unit.short_code.as_str(), now.as_str()],
            )
            .await
            .map_err(db_err)?;

        let mut rows = self
            .conn
            .query(
                "SELECT id, short_code FROM units WHERE name = ?1",
                params![unit.name.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let existing_code = row.get::<String>(1).map_err(db_err)?;
                if existing_code != unit.short_code {
                    warn!(
                        unit = %unit.name,
                        stored = %existing_code,
                        requested = %unit.short_code,
                        "unit identity is immutable; keeping stored short code"
                    );
                }
                row.get::<String>(0).map_err(db_err)
            }
            None => Err(ObjectiveDbError::Storage(format!(
                "unit {} not found after upsert",
                unit.name
            ))),
        }
    }

    /// List all units as `(id, unit)`, ordered by name.
    pub async fn list_units(&self) -> Result<Vec<(String, ProcessingUnit)>> {
        let mut rows = self
            .conn
            .query("SELECT id, name, short_code FROM units ORDER BY name", params![])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let id = row.get::<String>(0).map_err(db_err)?;
            let unit = ProcessingUnit {
                name: row.get::<String>(1).map_err(db_err)?,
                short_code: row.get::<String>(2).map_err(db_err)?,
            };
            results.push((id, unit));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    /// Insert or update a test keyed by `(unit, system, name, code)`.
    ///
    /// Re-discovery refreshes the mutable metadata and `discovered_at`; the id
    /// of an existing row is preserved.
    pub async fn upsert_test(&self, unit_id: &str, test: &TestCandidate) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let code = test.code.as_deref().unwrap_or("");

        let mut rows = self
            .conn
            .query(
                "INSERT INTO tests (id, unit_id, system, name, code, subject_area, grade_band,
                                    provider, source_url, source_updated, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(unit_id, system, name, code) DO UPDATE SET
                    subject_area = excluded.subject_area,
                    grade_band = excluded.grade_band,
                    provider = excluded.provider,
                    source_url = excluded.source_url,
                    source_updated = excluded.source_updated,
                    discovered_at = excluded.discovered_at
                 RETURNING id",
                params![
                    id.as_str(),
                    unit_id,
                    test.system.as_str(),
                    test.name.as_str(),
                    code,
                    test.subject_area.as_deref(),
                    test.grade_band.as_deref(),
                    test.provider.as_deref(),
                    test.source_url.as_deref(),
                    test.source_updated.as_deref(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;

        let row = rows
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| ObjectiveDbError::Storage("test upsert returned no id".into()))?;
        let stored_id = row.get::<String>(0).map_err(db_err)?;
        debug!(test = %test.name, id = %stored_id, "upserted test");
        Ok(stored_id)
    }

    /// List the tests of a unit in discovery order.
    pub async fn list_tests_by_unit(&self, unit_id: &str) -> Result<Vec<StoredTest>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, unit_id, system, name, code, subject_area, grade_band, provider,
                        source_url, source_updated, discovered_at
                 FROM tests WHERE unit_id = ?1 ORDER BY rowid",
                params![unit_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_stored_test(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Objectives
    // -----------------------------------------------------------------------

    /// Insert one objective for a test. Indices are unique per test.
    pub async fn insert_objective(&self, test_id: &str, objective: &Objective) -> Result<String> {
        self.check_writable()?;
        insert_objective_row(&self.conn, test_id, objective).await
    }

    /// Replace the objective set of a test in one transaction.
    ///
    /// Either every objective is written or the previous set is kept. A
    /// dropped future rolls the transaction back.
    pub async fn replace_objectives(&self, test_id: &str, objectives: &[Objective]) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let written = async {
            let removed = tx
                .execute("DELETE FROM objectives WHERE test_id = ?1", params![test_id])
                .await
                .map_err(db_err)?;
            for objective in objectives {
                insert_objective_row(&tx, test_id, objective).await?;
            }
            Ok::<u64, ObjectiveDbError>(removed)
        }
        .await;

        match written {
            Ok(removed) => {
                tx.commit().await.map_err(db_err)?;
                debug!(test_id, removed, inserted = objectives.len(), "objectives replaced");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(test_id, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Delete every objective of a test. Returns the number removed.
    pub async fn clear_objectives(&self, test_id: &str) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM objectives WHERE test_id = ?1", params![test_id])
            .await
            .map_err(db_err)
    }

    /// List the objectives of a test ordered by index.
    pub async fn list_objectives_by_test(&self, test_id: &str) -> Result<Vec<Objective>> {
        let mut rows = self
            .conn
            .query(
                "SELECT objective_index, text, evidence_excerpt, evidence_url, is_inferred,
                        confidence, rationale, validation_status, validator_notes
                 FROM objectives WHERE test_id = ?1 ORDER BY objective_index",
                params![test_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_objective(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Audits
    // -----------------------------------------------------------------------

    /// Create a `running` audit for a unit.
    pub async fn start_audit(&self, unit_id: &str) -> Result<AuditId> {
        self.check_writable()?;
        let id = AuditId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO audits (id, unit_id, status, started_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    unit_id,
                    AuditStatus::Running.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Close a running audit with a terminal status and its final counts.
    ///
    /// Fails with an audit error if `status` is not terminal or the audit is
    /// unknown or already closed.
    pub async fn complete_audit(
        &self,
        id: &AuditId,
        status: AuditStatus,
        counts: &AuditCounts,
        notes: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        if !AuditStatus::Running.can_transition_to(status) {
            return Err(ObjectiveDbError::audit(format!(
                "cannot close audit {id} as {status}"
            )));
        }

        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE audits SET status = ?1, tests_found = ?2, objectives_found = ?3,
                        objectives_inferred = ?4, queries_run = ?5, ended_at = ?6, notes = ?7
                 WHERE id = ?8 AND status = 'running'",
                params![
                    status.as_str(),
                    i64::from(counts.tests_found),
                    i64::from(counts.objectives_found),
                    i64::from(counts.objectives_inferred),
                    i64::from(counts.queries_run),
                    now.as_str(),
                    notes,
                    id.to_string()
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(ObjectiveDbError::audit(format!(
                "audit {id} is unknown or already closed"
            )));
        }
        Ok(())
    }

    /// Get one audit by id.
    pub async fn get_audit(&self, id: &AuditId) -> Result<Option<AuditRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_audit(&row)?)),
            None => Ok(None),
        }
    }

    /// List audits, newest first, optionally restricted to one unit.
    pub async fn list_audits(&self, unit_id: Option<&str>) -> Result<Vec<AuditRecord>> {
        let mut rows = match unit_id {
            Some(unit_id) => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {AUDIT_COLUMNS} FROM audits WHERE unit_id = ?1
                             ORDER BY started_at DESC, id DESC"
                        ),
                        params![unit_id],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(
                        &format!(
                            "SELECT {AUDIT_COLUMNS} FROM audits ORDER BY started_at DESC, id DESC"
                        ),
                        params![],
                    )
                    .await
            }
        }
        .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_audit(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Count rows across all tables.
    pub async fn statistics(&self) -> Result<Statistics> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                    (SELECT COUNT(*) FROM units),
                    (SELECT COUNT(*) FROM tests),
                    (SELECT COUNT(*) FROM objectives),
                    (SELECT COUNT(*) FROM objectives WHERE validation_status = 'verified'),
                    (SELECT COUNT(*) FROM objectives WHERE validation_status = 'partial'),
                    (SELECT COUNT(*) FROM objectives WHERE validation_status = 'inferred'),
                    (SELECT COUNT(*) FROM audits WHERE status = 'running'),
                    (SELECT COUNT(*) FROM audits WHERE status = 'complete'),
                    (SELECT COUNT(*) FROM audits WHERE status = 'partial'),
                    (SELECT COUNT(*) FROM audits WHERE status = 'error')",
                params![],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(Statistics::default());
        };
        let count = |i: i32| -> Result<u64> {
            let n = row.get::<i64>(i).map_err(db_err)?;
            Ok(u64::try_from(n).unwrap_or(0))
        };

        Ok(Statistics {
            units: count(0)?,
            tests: count(1)?,
            objectives: count(2)?,
            verified: count(3)?,
            partial: count(4)?,
            inferred: count(5)?,
            audits_running: count(6)?,
            audits_complete: count(7)?,
            audits_partial: count(8)?,
            audits_error: count(9)?,
        })
    }
}

async fn insert_objective_row(
    conn: &Connection,
    test_id: &str,
    objective: &Objective,
) -> Result<String> {
    if !(0.0..=1.0).contains(&objective.confidence) {
        return Err(ObjectiveDbError::validation(format!(
            "confidence {} outside [0, 1]",
            objective.confidence
        )));
    }

    let id = Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO objectives (id, test_id, objective_index, text, evidence_excerpt,
                                 evidence_url, is_inferred, confidence, rationale,
                                 validation_status, validator_notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            id.as_str(),
            test_id,
            i64::from(objective.index),
            objective.text.as_str(),
            objective.evidence_excerpt.as_deref(),
            objective.evidence_url.as_deref(),
            i64::from(objective.is_inferred),
            objective.confidence,
            objective.rationale.as_deref(),
            objective.validation_status.as_str(),
            objective.validator_notes.as_deref(),
            now.as_str()
        ],
    )
    .await
    .map_err(db_err)?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const AUDIT_COLUMNS: &str = "id, unit_id, status, tests_found, objectives_found, \
                             objectives_inferred, queries_run, started_at, ended_at, notes";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ObjectiveDbError::Storage(format!("invalid timestamp {raw}: {e}")))
}

fn get_count(row: &Row, idx: i32) -> Result<u32> {
    let n = row.get::<i64>(idx).map_err(db_err)?;
    u32::try_from(n).map_err(|_| ObjectiveDbError::Storage(format!("count out of range: {n}")))
}

fn row_to_stored_test(row: &Row) -> Result<StoredTest> {
    let code = row.get::<String>(4).map_err(db_err)?;
    let test = TestCandidate {
        system: row.get::<String>(2).map_err(db_err)?,
        name: row.get::<String>(3).map_err(db_err)?,
        code: (!code.is_empty()).then_some(code),
        subject_area: row.get::<String>(5).ok(),
        grade_band: row.get::<String>(6).ok(),
        provider: row.get::<String>(7).ok(),
        source_url: row.get::<String>(8).ok(),
        source_updated: row.get::<String>(9).ok(),
        content_sample: None,
    };
    let discovered_at = parse_timestamp(&row.get::<String>(10).map_err(db_err)?)?;

    Ok(StoredTest {
        id: row.get::<String>(0).map_err(db_err)?,
        unit_id: row.get::<String>(1).map_err(db_err)?,
        test,
        discovered_at,
    })
}

fn row_to_objective(row: &Row) -> Result<Objective> {
    let index = row.get::<i64>(0).map_err(db_err)?;
    let status = row.get::<String>(7).map_err(db_err)?;

    Ok(Objective {
        index: u32::try_from(index)
            .map_err(|_| ObjectiveDbError::Storage(format!("invalid objective index {index}")))?,
        text: row.get::<String>(1).map_err(db_err)?,
        evidence_excerpt: row.get::<String>(2).ok(),
        evidence_url: row.get::<String>(3).ok(),
        is_inferred: row.get::<i64>(4).map_err(db_err)? != 0,
        confidence: row.get::<f64>(5).map_err(db_err)?,
        rationale: row.get::<String>(6).ok(),
        validation_status: status
            .parse::<ValidationStatus>()
            .map_err(|e| ObjectiveDbError::Storage(e.to_string()))?,
        validator_notes: row.get::<String>(8).ok(),
    })
}

fn row_to_audit(row: &Row) -> Result<AuditRecord> {
    let raw_id = row.get::<String>(0).map_err(db_err)?;
    let id = raw_id
        .parse::<AuditId>()
        .map_err(|e| ObjectiveDbError::Storage(format!("invalid audit id {raw_id}: {e}")))?;
    let status = row
        .get::<String>(2)
        .map_err(db_err)?
        .parse::<AuditStatus>()
        .map_err(|e| ObjectiveDbError::Storage(e.to_string()))?;
    let ended_at = match row.get::<String>(8).ok() {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(AuditRecord {
        id,
        unit_id: row.get::<String>(1).map_err(db_err)?,
        status,
        counts: AuditCounts {
            tests_found: get_count(row, 3)?,
            objectives_found: get_count(row, 4)?,
            objectives_inferred: get_count(row, 5)?,
            queries_run: get_count(row, 6)?,
        },
        started_at: parse_timestamp(&row.get::<String>(7).map_err(db_err)?)?,
        ended_at,
        notes: row.get::<String>(9).ok(),
    })
}
