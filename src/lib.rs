//! isotone-automation: rule validation and incremental analysis for Isotone projects.
//!
//! The crate keeps a project's automation honest between runs:
//!
//! - **Rules** are declarative YAML units (priority, context, conditions,
//!   dependencies, path patterns, actions). The engine validates them through
//!   five gates and evaluates them against run-time data.
//! - **Cache** tracks a cheap `(size, mtime)` checksum per file so each task
//!   only re-examines what changed since it last completed.
//! - **State** records every task execution and arbitrary key/value state in
//!   one SQLite database, and degrades to memory when the database is
//!   unreachable.
//! - **Analyzers** run ordered named checks and replay cached verdicts for
//!   inputs that did not change.
//!
//! # Layout
//!
//! - [`core`]: errors, config, store, broker, schemas, output helpers
//! - [`plugins`]: rules, cache, state, analyzers, task runner
//!
//! # Examples
//!
//! ```bash
//! isotone-automation validate
//! isotone-automation rules export --format markdown
//! isotone-automation check hooks
//! isotone-automation status --format json
//! ```

mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{Cli, Command, RulesCommand};
use crate::core::{config::AutomationConfig, error, store::Store};
use crate::plugins::{
    cache::{self, CacheManager},
    rule_export::ExportFormat,
    rules::RuleEngine,
    runner::{self, TaskRunner},
    state::{self, AutomationStatus, StateManager, StoreHealth},
};

use clap::Parser;
use std::fs;

pub fn run() -> Result<(), error::AutomationError> {
    let cli = Cli::parse();
    let project_root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let config = AutomationConfig::load(&project_root)?;
    let store = Store::from_config(&project_root, &config);

    match cli.command {
        Command::Validate(format) => {
            let engine = RuleEngine::load(&store, &config);
            let report = engine.run_validation();
            if format.is_json() {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
            if !report.is_valid() {
                return Err(error::AutomationError::ValidationError(format!(
                    "{} rule violation(s)",
                    report.errors().count()
                )));
            }
        }
        Command::Rules(rules_cli) => {
            let engine = RuleEngine::load(&store, &config);
            match rules_cli.command {
                RulesCommand::List { context } => {
                    for rule in engine.rules_for_context(&context) {
                        println!(
                            "{:>4}  {:<32} {}{}",
                            rule.effective_priority(),
                            rule.name,
                            rule.category,
                            if rule.enabled { "" } else { " (disabled)" }
                        );
                    }
                }
                RulesCommand::Export { format, output } => {
                    let rendered = engine.export_rules(format.parse::<ExportFormat>()?)?;
                    match output {
                        Some(path) => {
                            fs::write(&path, rendered)?;
                            println!("rules: exported to {}", path.display());
                        }
                        None => print!("{}", rendered),
                    }
                }
                RulesCommand::Apply { context, data } => {
                    let data = state::parse_loose_json(&data);
                    let state = StateManager::open(&store, config.health.clone());
                    let outcome = runner::apply_rules_recorded(&engine, &state, &context, &data);
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
            }
        }
        Command::Check {
            task,
            force,
            format,
        } => {
            let mut cache = CacheManager::open(&store, config.tasks.clone());
            let mut state = StateManager::open(&store, config.health.clone());
            let outcome = TaskRunner::new(&store, &config, &mut cache, &mut state).run(&task, force)?;
            if format.is_json() {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.rendered);
            }
            if !outcome.success() {
                return Err(error::AutomationError::ValidationError(format!(
                    "task '{}' reported {} error(s)",
                    task,
                    outcome.report.errors.len()
                )));
            }
        }
        Command::Status(format) => {
            let status = StateManager::open(&store, config.health.clone()).get_status();
            if format.is_json() {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Command::State(state_cli) => {
            state::run_state_cli(&store, config.health.clone(), state_cli)?;
        }
        Command::Cache(cache_cli) => {
            cache::run_cache_cli(&store, config.tasks.clone(), cache_cli)?;
        }
        Command::Cleanup { days } => {
            let removed = StateManager::open(&store, config.health.clone()).cleanup(days);
            println!("cleanup: removed {} execution record(s) older than {} day(s)", removed, days);
        }
        Command::Reap { older_than } => {
            let reaped =
                StateManager::open(&store, config.health.clone()).reap_stale_executions(older_than);
            println!("reap: marked {} stale execution(s) as abandoned", reaped);
        }
    }
    Ok(())
}

fn print_status(status: &AutomationStatus) {
    use colored::Colorize;

    let store = match status.health.store {
        StoreHealth::Connected => "connected".bright_green(),
        StoreHealth::Unavailable => "unavailable".bright_red(),
    };
    println!("status: store {}", store);
    println!(
        "status: runs={} success_rate={:.1}% avg_time={:.2}s",
        status.stats.total, status.stats.success_rate, status.stats.average_time
    );
    for warning in &status.health.warnings {
        println!("  {} {}", "⚠️".yellow(), warning);
    }
    for exec in &status.recent_executions {
        println!(
            "  #{:<5} {:<10} {:<9} {}Z{}",
            exec.id,
            exec.task,
            exec.status.as_str(),
            exec.started_at,
            exec.execution_time
                .map(|t| format!(" ({:.2}s)", t))
                .unwrap_or_default()
        );
    }
}
