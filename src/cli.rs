//! CLI struct definitions for the isotone-automation command line.
//!
//! All clap-derived types live here, except the per-subsystem groups that
//! their plugins own (`state`, `cache`). Dispatch lives in `lib.rs`.

use crate::plugins::{cache, state};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "isotone-automation",
    version = env!("CARGO_PKG_VERSION"),
    about = "Rule validation, incremental analysis, and execution bookkeeping for Isotone projects"
)]
pub(crate) struct Cli {
    /// Project root (defaults to the current working directory).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub(crate) struct FormatArg {
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

impl FormatArg {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct RulesCli {
    #[clap(subcommand)]
    pub command: RulesCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RulesCommand {
    /// List rules applicable to a context, highest priority first.
    List {
        #[clap(long, default_value = "*")]
        context: String,
    },
    /// Export the rule table.
    Export {
        /// yaml, json, rust, or markdown.
        #[clap(long, default_value = "yaml")]
        format: String,
        /// Write to a file instead of stdout.
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Apply rules for a context against JSON run-time data.
    Apply {
        context: String,
        #[clap(long, default_value = "{}")]
        data: String,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Validate the rule documents (structure, references, conflicts, paths, commands).
    Validate(FormatArg),

    /// Inspect, export, or apply rules.
    Rules(RulesCli),

    /// Run a task's analyzer over the files changed since its last run.
    Check {
        task: String,
        /// Re-run every check regardless of the cache.
        #[clap(long)]
        force: bool,
        #[clap(flatten)]
        format: FormatArg,
    },

    /// Execution statistics and health.
    Status(FormatArg),

    /// Persisted key/value state and rule history.
    State(state::StateCli),

    /// Incremental scan cache.
    Cache(cache::CacheCli),

    /// Delete execution records older than the given number of days.
    Cleanup {
        #[clap(long, default_value = "30")]
        days: u32,
    },

    /// Mark executions still running after the given age (seconds) as abandoned.
    Reap {
        #[clap(long, default_value = "86400")]
        older_than: i64,
    },
}
