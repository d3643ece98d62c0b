//! `potluck finalize` and `potluck sweep`: one-shot finalization attempts.

use anyhow::{Context, Result};
use uuid::Uuid;

use potluck_core::worker::{FinalizationOutcome, FinalizationWorker};

/// Try to finalize a single plan now and print what happened.
pub async fn run_finalize(worker: &FinalizationWorker, plan_id_str: &str) -> Result<()> {
    let plan_id =
        Uuid::parse_str(plan_id_str).with_context(|| format!("invalid plan ID: {plan_id_str}"))?;

    let outcome = worker.finalize_plan(plan_id).await?;
    match &outcome {
        FinalizationOutcome::Finalized(finalized) => {
            println!("Meal plan {plan_id} finalized ({:?}).", finalized.reason);
            for choice in &finalized.choices {
                let suffix = if choice.tiebroken { " (tiebroken)" } else { "" };
                println!(
                    "  event {} -> option {}{suffix}",
                    choice.event_id, choice.option_id
                );
            }
            println!(
                "Grocery list: {} inserted, {} updated, {} unchanged, {} skipped",
                finalized.grocery.inserted(),
                finalized.grocery.updated(),
                finalized.grocery.unchanged(),
                finalized.grocery.skipped.len(),
            );
        }
        FinalizationOutcome::NotReady { undecided_events } => {
            println!("Meal plan {plan_id} is still awaiting votes.");
            for event_id in undecided_events {
                println!("  undecided: event {event_id}");
            }
        }
        FinalizationOutcome::AlreadyFinalized => {
            println!("Meal plan {plan_id} was already finalized.");
        }
        FinalizationOutcome::NotFound => {
            anyhow::bail!("meal plan {plan_id} not found");
        }
        FinalizationOutcome::TimedOut => {
            anyhow::bail!(
                "finalization of meal plan {plan_id} timed out after {}s; nothing was written",
                worker.config().attempt_timeout.as_secs()
            );
        }
    }

    Ok(())
}

/// Finalize every plan whose deadline has passed and print the counts.
pub async fn run_sweep(worker: &FinalizationWorker) -> Result<()> {
    let report = worker.sweep().await?;

    println!("Sweep complete: {} due plan(s)", report.attempted);
    println!(
        "  finalized={} not_ready={} already_finalized={} not_found={} timed_out={} failed={}",
        report.finalized,
        report.not_ready,
        report.already_finalized,
        report.not_found,
        report.timed_out,
        report.failed,
    );

    if report.failed > 0 {
        anyhow::bail!("{} plan(s) failed to finalize; see log for details", report.failed);
    }
    Ok(())
}
