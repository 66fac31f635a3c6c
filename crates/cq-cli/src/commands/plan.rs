//! Plan command implementation

use anyhow::Result;
use cq_core::{AvailableColumns, PlanOutcome};

use crate::cli::{GlobalArgs, PlanArgs, PlanOutput};
use crate::commands::common::{self, load_config, load_graph, parse_column_list};

/// Execute the plan command
pub(crate) async fn execute(args: &PlanArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let graph = load_graph(&config, &common::project_root(global))?;

    let requested = parse_column_list(&args.columns);
    let mut available = AvailableColumns::new();
    if let Some(list) = &args.available {
        available.extend(parse_column_list(list));
    }

    let outcome = graph.plan(&requested, &available)?;
    log::debug!(
        "Planned {} column(s) for {} requested",
        outcome.columns().len(),
        requested.len()
    );

    match args.output {
        PlanOutput::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        PlanOutput::Text => match &outcome {
            PlanOutcome::NotNeeded => println!("All requested columns are available."),
            PlanOutcome::Plan(plan) => {
                let definitions = graph.definitions_for(plan)?;
                for (i, (column, definition)) in plan.columns.iter().zip(definitions).enumerate() {
                    println!("{:>3}. {} - {}", i + 1, column, definition);
                }
                if !plan.skipped.is_empty() {
                    let skipped: Vec<&str> = plan.skipped.iter().map(|c| c.as_str()).collect();
                    println!("Skipped (dependency unavailable): {}", skipped.join(", "));
                }
                println!("\n{} column(s) to generate", plan.len());
            }
        },
    }

    Ok(())
}
