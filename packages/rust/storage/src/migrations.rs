//! SQL migration definitions for the objectives database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: units, tests, objectives, audits",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Processing units (jurisdictions)
CREATE TABLE IF NOT EXISTS units (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    short_code  TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

-- Certification tests; a missing code is stored as '' so the key stays unique
CREATE TABLE IF NOT EXISTS tests (
    id             TEXT PRIMARY KEY,
    unit_id        TEXT NOT NULL REFERENCES units(id) ON DELETE CASCADE,
    system         TEXT NOT NULL,
    name           TEXT NOT NULL,
    code           TEXT NOT NULL DEFAULT '',
    subject_area   TEXT,
    grade_band     TEXT,
    provider       TEXT,
    source_url     TEXT,
    source_updated TEXT,
    discovered_at  TEXT NOT NULL,
    UNIQUE(unit_id, system, name, code)
);

CREATE INDEX IF NOT EXISTS idx_tests_unit_id ON tests(unit_id);

-- Objectives, ordered by index within a test
CREATE TABLE IF NOT EXISTS objectives (
    id                TEXT PRIMARY KEY,
    test_id           TEXT NOT NULL REFERENCES tests(id) ON DELETE CASCADE,
    objective_index   INTEGER NOT NULL,
    text              TEXT NOT NULL,
    evidence_excerpt  TEXT,
    evidence_url      TEXT,
    is_inferred       INTEGER NOT NULL,
    confidence        REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    rationale         TEXT,
    validation_status TEXT NOT NULL CHECK (validation_status IN ('verified', 'partial', 'inferred')),
    validator_notes   TEXT,
    created_at        TEXT NOT NULL,
    UNIQUE(test_id, objective_index)
);

CREATE INDEX IF NOT EXISTS idx_objectives_test_id ON objectives(test_id);

-- One audit row per unit run
CREATE TABLE IF NOT EXISTS audits (
    id                  TEXT PRIMARY KEY,
    unit_id             TEXT NOT NULL REFERENCES units(id) ON DELETE CASCADE,
    status              TEXT NOT NULL CHECK (status IN ('running', 'complete', 'partial', 'error')),
    tests_found         INTEGER NOT NULL DEFAULT 0,
    objectives_found    INTEGER NOT NULL DEFAULT 0,
    objectives_inferred INTEGER NOT NULL DEFAULT 0,
    queries_run         INTEGER NOT NULL DEFAULT 0,
    started_at          TEXT NOT NULL,
    ended_at            TEXT,
    notes               TEXT
);

CREATE INDEX IF NOT EXISTS idx_audits_unit_id ON audits(unit_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
