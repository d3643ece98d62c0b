//! Long-running worker loop: periodic deadline sweeps plus vote
//! notifications received with PostgreSQL `LISTEN`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{FinalizationOutcome, FinalizationWorker};
use crate::trigger::VoteRecorded;

/// How long in-flight vote handlers get to finish after cancellation.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run until `cancel` fires.
///
/// The first sweep runs immediately. Sweeps and vote notifications are
/// handled in spawned tasks so cancellation is seen right away; at most
/// `max_concurrent_plans` vote handlers run at once.
pub async fn run_worker(worker: FinalizationWorker, cancel: CancellationToken) -> Result<()> {
    let config = worker.config().clone();

    let mut listener = PgListener::connect_with(worker.pool())
        .await
        .context("failed to open notification listener")?;
    listener
        .listen(&config.vote_channel)
        .await
        .with_context(|| format!("failed to LISTEN on {}", config.vote_channel))?;

    tracing::info!(
        vote_channel = %config.vote_channel,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        max_concurrent_plans = config.max_concurrent_plans,
        "finalization worker started"
    );

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_plans.max(1)));
    let mut in_flight: JoinSet<()> = JoinSet::new();
    // At most one sweep runs at a time; a tick that lands mid-sweep is skipped.
    let mut sweeps: JoinSet<()> = JoinSet::new();
    let mut sweep = tokio::time::interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = sweep.tick(), if sweeps.is_empty() => {
                let worker = worker.clone();
                sweeps.spawn(async move { run_sweep(&worker).await });
            }

            notification = listener.recv() => {
                let notification = match notification {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!(error = %e, "notification listener error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };
                let trigger = match VoteRecorded::parse(notification.payload()) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(
                            payload = notification.payload(),
                            error = %e,
                            "ignoring vote notification"
                        );
                        continue;
                    }
                };
                let permit = tokio::select! {
                    _ = cancel.cancelled() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                let worker = worker.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    handle_trigger(&worker, &trigger).await;
                });
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "vote handler task failed");
                }
            }

            Some(joined) = sweeps.join_next(), if !sweeps.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "deadline sweep task failed");
                }
            }
        }
    }

    tracing::info!(
        in_flight = in_flight.len(),
        sweeping = !sweeps.is_empty(),
        "finalization worker stopping, draining handlers"
    );
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while in_flight.join_next().await.is_some() {}
        while sweeps.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = in_flight.len() + sweeps.len(),
            "drain timeout expired, aborting remaining handlers"
        );
        in_flight.abort_all();
        sweeps.abort_all();
    }

    Ok(())
}

async fn run_sweep(worker: &FinalizationWorker) {
    match worker.sweep().await {
        Ok(report) if report.attempted > 0 => {
            tracing::info!(
                attempted = report.attempted,
                finalized = report.finalized,
                not_ready = report.not_ready,
                already_finalized = report.already_finalized,
                timed_out = report.timed_out,
                failed = report.failed,
                "deadline sweep finished"
            );
        }
        Ok(_) => tracing::debug!("deadline sweep found nothing due"),
        Err(e) => tracing::error!(error = %e, "deadline sweep failed"),
    }
}

async fn handle_trigger(worker: &FinalizationWorker, trigger: &VoteRecorded) {
    match worker.handle_vote_recorded(trigger).await {
        Ok(FinalizationOutcome::Finalized(f)) => {
            tracing::info!(meal_plan_id = %f.meal_plan_id, "meal plan finalized after vote");
        }
        Ok(outcome) => {
            tracing::debug!(?trigger, outcome = outcome.label(), "vote trigger handled");
        }
        Err(e) => {
            tracing::error!(?trigger, error = %e, "vote trigger failed");
        }
    }
}
