//! Export of stored objectives: one JSONL file per unit plus an aggregate
//! JSON document, written from storage.
//!
//! Files are written atomically (temp file, then rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use objectivedb_shared::{Objective, ObjectiveDbError, ProcessingUnit, Result, TestCandidate};
use objectivedb_storage::Storage;

/// File name of the aggregate export.
pub const AGGREGATE_FILE: &str = "all_units_objectives.json";

/// A stored test with its export timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedTest {
    #[serde(flatten)]
    pub test: TestCandidate,
    pub discovered_at: DateTime<Utc>,
}

/// One JSONL line: a test and its ordered objectives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub unit: String,
    pub test: ExportedTest,
    pub objectives: Vec<Objective>,
}

/// Aggregate entry for one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateTest {
    #[serde(flatten)]
    pub test: ExportedTest,
    pub objectives_count: usize,
    pub objectives: Vec<Objective>,
}

/// Aggregate entry for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateUnit {
    pub unit_info: ProcessingUnit,
    pub tests: Vec<AggregateTest>,
}

/// What an export wrote.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub units: usize,
    pub tests: usize,
    pub objectives: usize,
    pub files: Vec<PathBuf>,
}

/// Export every unit in storage into `out_dir`.
#[instrument(skip_all, fields(out_dir = %out_dir.display()))]
pub async fn export_all(storage: &Storage, out_dir: &Path) -> Result<ExportSummary> {
    std::fs::create_dir_all(out_dir).map_err(|e| ObjectiveDbError::io(out_dir, e))?;

    let mut summary = ExportSummary::default();
    let mut aggregate: BTreeMap<String, AggregateUnit> = BTreeMap::new();

    for (unit_id, unit) in storage.list_units().await? {
        let mut lines = String::new();
        let mut tests = Vec::new();

        for stored in storage.list_tests_by_unit(&unit_id).await? {
            let objectives = storage.list_objectives_by_test(&stored.id).await?;
            summary.tests += 1;
            summary.objectives += objectives.len();

            let record = TestRecord {
                unit: unit.name.clone(),
                test: ExportedTest {
                    test: stored.test,
                    discovered_at: stored.discovered_at,
                },
                objectives,
            };
            lines.push_str(&to_json_line(&record)?);
            lines.push('\n');

            tests.push(AggregateTest {
                objectives_count: record.objectives.len(),
                test: record.test,
                objectives: record.objectives,
            });
        }

        let path = out_dir.join(format!("{}.jsonl", unit.file_stem()));
        write_atomic(&path, &lines)?;
        debug!(unit = %unit.name, tests = tests.len(), "wrote unit export");
        summary.files.push(path);
        summary.units += 1;

        aggregate.insert(
            unit.name.clone(),
            AggregateUnit {
                unit_info: unit,
                tests,
            },
        );
    }

    let aggregate_json = serde_json::to_string_pretty(&aggregate).map_err(|e| {
        ObjectiveDbError::Conversion(format!("JSON serialization failed: {e}"))
    })?;
    let aggregate_path = out_dir.join(AGGREGATE_FILE);
    write_atomic(&aggregate_path, &aggregate_json)?;
    summary.files.push(aggregate_path);

    info!(
        units = summary.units,
        tests = summary.tests,
        objectives = summary.objectives,
        "export complete"
    );
    Ok(summary)
}

fn to_json_line<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| ObjectiveDbError::Conversion(format!("JSON serialization failed: {e}")))
}

fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("export");
    let temp = target.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&temp, content).map_err(|e| ObjectiveDbError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| ObjectiveDbError::io(target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use objectivedb_shared::ReferenceData;
    use uuid::Uuid;

    use super::*;
    use crate::catalog::SampleCatalog;
    use crate::pipeline::{Orchestrator, OrchestratorOptions, SilentProgress};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("odb-export-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn populated() -> Orchestrator {
        let db = temp_dir().join("objectives.db");
        let storage = Storage::open(&db).await.unwrap();
        let orch = Orchestrator::new(
            storage,
            Arc::new(SampleCatalog),
            Arc::new(ReferenceData::default()),
            OrchestratorOptions::default(),
        );
        let units = [
            ProcessingUnit::new("New York", "NY").unwrap(),
            ProcessingUnit::new("Ohio", "OH").unwrap(),
        ];
        orch.run_batch(&units, &SilentProgress).await.unwrap();
        orch
    }

    #[tokio::test]
    async fn writes_jsonl_per_unit_and_aggregate() {
        let orch = populated().await;
        let out = temp_dir().join("data");
        let summary = export_all(orch.storage(), &out).await.unwrap();

        assert_eq!(summary.units, 2);
        assert_eq!(summary.tests, 6);
        assert_eq!(summary.files.len(), 3);

        let jsonl = std::fs::read_to_string(out.join("New_York.jsonl")).unwrap();
        let records: Vec<TestRecord> = jsonl
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.unit == "New York"));
        assert_eq!(records[0].test.test.code.as_deref(), Some("5001"));
        for record in &records {
            let indices: Vec<u32> = record.objectives.iter().map(|o| o.index).collect();
            let mut sorted = indices.clone();
            sorted.sort_unstable();
            assert_eq!(indices, sorted);
        }

        let aggregate: BTreeMap<String, AggregateUnit> =
            serde_json::from_str(&std::fs::read_to_string(out.join(AGGREGATE_FILE)).unwrap())
                .unwrap();
        assert_eq!(aggregate.len(), 2);
        let ohio = &aggregate["Ohio"];
        assert_eq!(ohio.unit_info.short_code, "OH");
        assert_eq!(ohio.tests.len(), 3);
        assert!(ohio.tests.iter().all(|t| t.objectives_count == t.objectives.len()));

        let total: usize = aggregate
            .values()
            .flat_map(|u| &u.tests)
            .map(|t| t.objectives_count)
            .sum();
        assert_eq!(total, summary.objectives);
    }

    #[tokio::test]
    async fn export_is_repeatable_without_temp_files() {
        let orch = populated().await;
        let out = temp_dir();
        export_all(orch.storage(), &out).await.unwrap();
        export_all(orch.storage(), &out).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn empty_database_writes_empty_aggregate() {
        let storage = Storage::open(&temp_dir().join("empty.db")).await.unwrap();
        let out = temp_dir();
        let summary = export_all(&storage, &out).await.unwrap();
        assert_eq!(summary.units, 0);
        let content = std::fs::read_to_string(out.join(AGGREGATE_FILE)).unwrap();
        assert_eq!(content.trim(), "{}");
    }
}
