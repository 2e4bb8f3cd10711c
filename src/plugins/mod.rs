//! Automation subsystems.
//!
//! - `rules`: rule documents, context selection, evaluation (`rule_validate`,
//!   `rule_scrape`, `rule_export` extend it)
//! - `checksum`, `cache`: incremental change detection per task
//! - `state`: execution records, key/value state, rule history
//! - `analyzer`: cached check runner; `docs_check` and `hook_coverage` implement it
//! - `runner`: wires a task through cache, analyzer, and state

pub mod analyzer;
pub mod cache;
pub mod checksum;
pub mod docs_check;
pub mod hook_coverage;
pub mod rule_export;
pub mod rule_scrape;
pub mod rule_validate;
pub mod rules;
pub mod runner;
pub mod state;
