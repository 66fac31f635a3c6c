//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// caseql - answer questions over an event log, generating derived columns on demand
#[derive(Parser, Debug)]
#[command(name = "cq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the columns that must be generated for a request
    Plan(PlanArgs),

    /// List the derivable columns and their dependencies
    Columns(ColumnsArgs),

    /// Run one SQL query against the event table
    Query(QueryArgs),

    /// Answer a scripted question set and write the outcome report
    Run(RunArgs),
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Requested columns (comma-separated)
    #[arg(long)]
    pub columns: String,

    /// Columns to treat as already generated (comma-separated)
    #[arg(short, long)]
    pub available: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: PlanOutput,
}

/// Plan output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutput {
    /// Numbered list with definitions
    Text,
    /// JSON plan outcome
    Json,
}

/// Arguments for the columns command
#[derive(Args, Debug)]
pub struct ColumnsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: ColumnsOutput,
}

/// Columns output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnsOutput {
    /// Aligned table
    Table,
    /// JSON array
    Json,
}

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQL to execute
    pub sql: String,

    /// Override the configured query timeout
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Override the result size cap in characters
    #[arg(long)]
    pub max_chars: Option<usize>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file with questions and scripted collaborator answers
    #[arg(short, long)]
    pub scenario: String,

    /// Report path (default: target/caseql_report.json in the project)
    #[arg(short, long)]
    pub report: Option<String>,

    /// Questions answered concurrently (overrides orchestrator.concurrency)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Suppress the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
