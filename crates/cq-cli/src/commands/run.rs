//! Run command implementation

use anyhow::{Context, Result};
use cq_engine::{Environment, Orchestrator, OutcomeReport, QuestionOutcome, Scenario};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::cli::{GlobalArgs, RunArgs};
use crate::commands::common::{self, load_config};

/// Execute the run command
pub(crate) async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let start = Instant::now();
    let mut config = load_config(global)?;
    let root = common::project_root(global);

    if let Some(threads) = args.threads {
        config.orchestrator.concurrency = threads.max(1);
    }

    let scenario = Scenario::load(Path::new(&args.scenario))
        .with_context(|| format!("Failed to load scenario {}", args.scenario))?;
    let questions = scenario.questions();

    let env = Environment::open(&config, &root, scenario.collaborators()).await?;
    log::info!(
        "Opened {} ({} rows), answering {} question(s) with concurrency {}",
        env.table.name,
        env.expected_rows,
        questions.len(),
        env.settings.concurrency
    );
    let orchestrator = Orchestrator::new(Arc::new(env));

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(questions.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    };

    let outcomes = orchestrator
        .answer_all_with(&questions, |outcome| {
            pb.set_message(format!("{} {}", outcome.id, outcome.state));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();
    let outcomes = outcomes.context("Run halted")?;

    print_outcomes(&outcomes);

    let report = OutcomeReport::new(config.name.clone(), outcomes);
    let report_path = args
        .report
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join("target").join("caseql_report.json"));
    report.save(&report_path)?;

    let summary = &report.summary;
    println!();
    println!(
        "Answered {}/{} in {:.2}s (failed: {})",
        summary.answered,
        summary.questions,
        start.elapsed().as_secs_f64(),
        summary.failed
    );
    println!(
        "Decisions: TP {} FP {} TN {} FN {} | precision {:.2} recall {:.2} f1 {:.2} accuracy {:.2}",
        summary.matrix.true_positive,
        summary.matrix.false_positive,
        summary.matrix.true_negative,
        summary.matrix.false_negative,
        summary.precision,
        summary.recall,
        summary.f1,
        summary.accuracy
    );
    if let Some(mean) = summary.mean_score {
        println!("Mean score: {mean:.2}");
    }
    println!("Report written to {}", report_path.display());

    Ok(())
}

fn print_outcomes(outcomes: &[QuestionOutcome]) {
    let id_width = outcomes.iter().map(|o| o.id.len()).max().unwrap_or(2).max(2);
    let state_width = 9;

    println!(
        "{:<id_width$}  {:<state_width$}  {:<5}  {:<5}  MATERIALIZED",
        "ID", "STATE", "LABEL", "SCORE"
    );
    println!(
        "{:-<id_width$}  {:-<state_width$}  {:-<5}  {:-<5}  {}",
        "",
        "",
        "",
        "",
        "-".repeat(30)
    );
    for outcome in outcomes {
        let label = outcome
            .last_label()
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|| "-".to_string());
        let score = outcome
            .score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let materialized: Vec<&str> = outcome.materialized.iter().map(|c| c.as_str()).collect();
        println!(
            "{:<id_width$}  {:<state_width$}  {:<5}  {:<5}  {}",
            outcome.id,
            outcome.state.to_string(),
            label,
            score,
            if materialized.is_empty() {
                "-".to_string()
            } else {
                materialized.join(", ")
            }
        );
    }
}
