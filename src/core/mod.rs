//! Core modules shared by every automation subsystem.
//!
//! Errors, configuration, the persistent-store thin waist, and output helpers
//! live here. Subsystems (rules, cache, state, analyzers) live in `plugins`.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod schemas;
pub mod store;
pub mod time;
