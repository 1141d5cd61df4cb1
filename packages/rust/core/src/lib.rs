//! Core pipeline orchestration for objectivedb.
//!
//! Ties discovery, objective extraction, inference and the validation gate
//! into per-unit runs recorded by an audit, plus the unit catalog and the
//! JSONL/JSON exports.

pub mod audit;
pub mod catalog;
pub mod export;
pub mod pipeline;
