//! Shared types, error model, configuration, and reference data for objectivedb.
//!
//! This crate is the foundation depended on by all other objectivedb crates.
//! It provides:
//! - [`ObjectiveDbError`]: the unified error type
//! - Domain types ([`ProcessingUnit`], [`TestCandidate`], [`Objective`], [`AuditRecord`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)
//! - [`ReferenceData`]: the immutable vocabularies and templates
//! - Capability traits for the external search and fetch services

pub mod capability;
pub mod config;
pub mod error;
pub mod reference;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use capability::{ContentFetcher, SearchHit, SearchProvider};
pub use config::{
    AppConfig, DefaultsConfig, DiscoveryConfig, PdfConfig, RunConfig, RunMode, config_dir,
    config_file_path, init_config, load_config, load_config_from, load_reference_data,
};
pub use error::{ObjectiveDbError, Result};
pub use reference::{
    ReferenceData, ReferenceSource, SubjectTemplate, SystemExtra, TestPattern, TestPatternSpec,
};
pub use types::{
    AuditCounts, AuditId, AuditRecord, AuditStatus, Objective, ProcessingUnit, StoredTest,
    TestCandidate, TestInfo, ValidationStatus,
};
