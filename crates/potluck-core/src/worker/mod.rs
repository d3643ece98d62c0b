//! Finalization worker: runs the state machine against storage.
//!
//! Every trigger (vote notification, deadline sweep, CLI) funnels into
//! [`FinalizationWorker::finalize_plan_at`]. The plan row's status is the
//! only serialization point: the write transaction starts with a
//! conditional `awaiting_votes -> finalized` update, and a worker that
//! loses that race rolls back and reports [`FinalizationOutcome::AlreadyFinalized`]
//! without publishing anything.

pub mod listener;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use potluck_db::models::MealPlanStatus;
use potluck_db::queries::{meal_plans, options};

use crate::finalize::{Decision, EventChoice, FinalizationStateMachine, FinalizeReason};
use crate::grocery::{GroceryListGenerator, GroceryReport};
use crate::publish::{ChangePublisher, DataChangeMessage, DEFAULT_CHANGE_CHANNEL};
use crate::trigger::{DEFAULT_VOTE_CHANNEL, VoteRecorded};

pub use listener::run_worker;

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time between deadline sweeps.
    pub sweep_interval: Duration,
    /// Upper bound on one plan's read, decide and write.
    pub attempt_timeout: Duration,
    /// Plans processed in parallel by a sweep or by vote notifications.
    pub max_concurrent_plans: usize,
    /// Due plans fetched per sweep.
    pub sweep_batch_size: i64,
    pub vote_channel: String,
    pub change_channel: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(30),
            max_concurrent_plans: 4,
            sweep_batch_size: 100,
            vote_channel: DEFAULT_VOTE_CHANNEL.to_string(),
            change_channel: DEFAULT_CHANGE_CHANNEL.to_string(),
        }
    }
}

/// A committed finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedPlan {
    pub meal_plan_id: Uuid,
    pub household_id: Uuid,
    pub reason: FinalizeReason,
    pub choices: Vec<EventChoice>,
    pub grocery: GroceryReport,
}

/// Result of one finalization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizationOutcome {
    /// This attempt moved the plan to `finalized`.
    Finalized(FinalizedPlan),
    /// The plan stays `awaiting_votes`.
    NotReady { undecided_events: Vec<Uuid> },
    /// The plan was already terminal, possibly by a concurrent attempt.
    AlreadyFinalized,
    /// No live plan with that ID.
    NotFound,
    /// The attempt exceeded its deadline and was rolled back.
    TimedOut,
}

impl FinalizationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Finalized(_) => "finalized",
            Self::NotReady { .. } => "not_ready",
            Self::AlreadyFinalized => "already_finalized",
            Self::NotFound => "not_found",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub finalized: usize,
    pub not_ready: usize,
    pub already_finalized: usize,
    pub not_found: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &Result<FinalizationOutcome>) {
        self.attempted += 1;
        match outcome {
            Ok(FinalizationOutcome::Finalized(_)) => self.finalized += 1,
            Ok(FinalizationOutcome::NotReady { .. }) => self.not_ready += 1,
            Ok(FinalizationOutcome::AlreadyFinalized) => self.already_finalized += 1,
            Ok(FinalizationOutcome::NotFound) => self.not_found += 1,
            Ok(FinalizationOutcome::TimedOut) => self.timed_out += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Finalizes meal plans and generates their grocery lists.
///
/// Holds no per-plan state; clones share the pool and publisher.
#[derive(Clone)]
pub struct FinalizationWorker {
    pool: PgPool,
    publisher: Arc<dyn ChangePublisher>,
    config: WorkerConfig,
}

impl FinalizationWorker {
    pub fn new(pool: PgPool, publisher: Arc<dyn ChangePublisher>, config: WorkerConfig) -> Self {
        Self {
            pool,
            publisher,
            config,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Try to finalize a plan now.
    pub async fn finalize_plan(&self, meal_plan_id: Uuid) -> Result<FinalizationOutcome> {
        self.finalize_plan_at(meal_plan_id, Utc::now()).await
    }

    /// Try to finalize a plan as of `now`.
    ///
    /// The read, decision and write run under `attempt_timeout`. Change
    /// messages are published only after a successful commit; publish
    /// failures are logged and do not affect the returned outcome.
    pub async fn finalize_plan_at(
        &self,
        meal_plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<FinalizationOutcome> {
        let attempt =
            tokio::time::timeout(self.config.attempt_timeout, self.attempt(meal_plan_id, now))
                .await;
        let outcome = match attempt {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    meal_plan_id = %meal_plan_id,
                    timeout_secs = self.config.attempt_timeout.as_secs_f64(),
                    "finalization attempt timed out, plan left untouched"
                );
                return Ok(FinalizationOutcome::TimedOut);
            }
        };

        if let FinalizationOutcome::Finalized(finalized) = &outcome {
            self.publish_finalized(finalized).await;
        }
        Ok(outcome)
    }

    async fn attempt(&self, meal_plan_id: Uuid, now: DateTime<Utc>) -> Result<FinalizationOutcome> {
        let Some(snapshot) = snapshot::load_snapshot(&self.pool, meal_plan_id).await? else {
            return Ok(FinalizationOutcome::NotFound);
        };
        let household_id = snapshot.plan.belongs_to_household;

        let evaluation = FinalizationStateMachine::evaluate(&snapshot, now);
        for issue in &evaluation.issues {
            tracing::warn!(meal_plan_id = %meal_plan_id, %issue, "skipping inconsistent meal plan data");
        }
        for rejected in evaluation.rejected_ballots() {
            tracing::warn!(
                meal_plan_id = %meal_plan_id,
                voter = %rejected.voter(),
                error = %rejected,
                "ignoring malformed ballot"
            );
        }

        let (reason, choices) = match evaluation.decision {
            Decision::AlreadyFinalized => return Ok(FinalizationOutcome::AlreadyFinalized),
            Decision::NotReady { undecided_events } => {
                tracing::debug!(
                    meal_plan_id = %meal_plan_id,
                    undecided = undecided_events.len(),
                    "meal plan not ready to finalize"
                );
                return Ok(FinalizationOutcome::NotReady { undecided_events });
            }
            Decision::Finalize { reason, choices } => (reason, choices),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin finalization transaction")?;

        if meal_plans::finalize_meal_plan(&mut tx, meal_plan_id).await? == 0 {
            tx.rollback()
                .await
                .context("failed to roll back lost finalization")?;
            tracing::info!(
                meal_plan_id = %meal_plan_id,
                "meal plan already finalized by another attempt"
            );
            return Ok(FinalizationOutcome::AlreadyFinalized);
        }

        for choice in &choices {
            options::mark_option_chosen(
                &mut tx,
                choice.event_id,
                choice.option_id,
                choice.tiebroken,
            )
            .await?;
        }

        let chosen: Vec<Uuid> = choices.iter().map(|c| c.option_id).collect();
        let grocery = GroceryListGenerator::generate(&mut tx, meal_plan_id, &chosen).await?;

        tx.commit()
            .await
            .with_context(|| format!("failed to commit finalization of meal plan {meal_plan_id}"))?;

        tracing::info!(
            meal_plan_id = %meal_plan_id,
            reason = ?reason,
            events = choices.len(),
            tiebroken = choices.iter().filter(|c| c.tiebroken).count(),
            grocery_items = grocery.lines.len(),
            "meal plan finalized"
        );

        Ok(FinalizationOutcome::Finalized(FinalizedPlan {
            meal_plan_id,
            household_id,
            reason,
            choices,
            grocery,
        }))
    }

    /// Resolve a vote trigger to its plan and try to finalize it.
    pub async fn handle_vote_recorded(&self, trigger: &VoteRecorded) -> Result<FinalizationOutcome> {
        match trigger.resolve_meal_plan_id(&self.pool).await? {
            Some(meal_plan_id) => self.finalize_plan(meal_plan_id).await,
            None => Ok(FinalizationOutcome::NotFound),
        }
    }

    /// Finalize every plan whose voting deadline has passed.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as of `now`. Plans are processed in parallel; a failure on one
    /// plan is logged and counted, and the rest continue.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due =
            meal_plans::list_due_meal_plan_ids(&self.pool, now, self.config.sweep_batch_size)
                .await?;

        let results: Vec<(Uuid, Result<FinalizationOutcome>)> = futures::stream::iter(due)
            .map(|id| async move { (id, self.finalize_plan_at(id, now).await) })
            .buffer_unordered(self.config.max_concurrent_plans.max(1))
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (meal_plan_id, result) in &results {
            if let Err(e) = result {
                tracing::error!(
                    meal_plan_id = %meal_plan_id,
                    error = %e,
                    "finalization failed, plan left for the next sweep"
                );
            }
            report.record(result);
        }
        Ok(report)
    }

    /// Re-run grocery list generation for an already finalized plan.
    pub async fn regenerate_grocery_list(&self, meal_plan_id: Uuid) -> Result<GroceryReport> {
        let (household_id, report) = tokio::time::timeout(
            self.config.attempt_timeout,
            self.regenerate(meal_plan_id),
        )
        .await
        .with_context(|| format!("grocery list regeneration for meal plan {meal_plan_id} timed out"))??;

        self.publish_grocery(meal_plan_id, household_id, &report)
            .await;
        Ok(report)
    }

    async fn regenerate(&self, meal_plan_id: Uuid) -> Result<(Uuid, GroceryReport)> {
        let plan = meal_plans::get_meal_plan(&self.pool, meal_plan_id)
            .await?
            .with_context(|| format!("meal plan {meal_plan_id} not found"))?;
        if plan.status != MealPlanStatus::Finalized {
            bail!(
                "meal plan {} is {}, grocery lists are only generated for finalized plans",
                meal_plan_id,
                plan.status
            );
        }

        let chosen: Vec<Uuid> = options::list_options_for_meal_plan(&self.pool, meal_plan_id)
            .await?
            .into_iter()
            .filter(|o| o.chosen)
            .map(|o| o.id)
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin grocery list transaction")?;
        let report = GroceryListGenerator::generate(&mut tx, meal_plan_id, &chosen).await?;
        tx.commit()
            .await
            .with_context(|| format!("failed to commit grocery list of meal plan {meal_plan_id}"))?;

        tracing::info!(
            meal_plan_id = %meal_plan_id,
            inserted = report.inserted(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            "grocery list regenerated"
        );
        Ok((plan.belongs_to_household, report))
    }

    async fn publish_finalized(&self, finalized: &FinalizedPlan) {
        let plan = finalized.meal_plan_id;
        let household = finalized.household_id;

        self.publish(DataChangeMessage::plan_finalized(plan, household))
            .await;
        for choice in &finalized.choices {
            self.publish(DataChangeMessage::option_chosen(
                plan,
                household,
                choice.option_id,
            ))
            .await;
        }
        self.publish_grocery(plan, household, &finalized.grocery)
            .await;
    }

    async fn publish_grocery(&self, meal_plan_id: Uuid, household_id: Uuid, report: &GroceryReport) {
        for item_id in report.written_ids() {
            self.publish(DataChangeMessage::grocery_item_upserted(
                meal_plan_id,
                household_id,
                item_id,
            ))
            .await;
        }
        for item_id in report.archived_ids() {
            self.publish(DataChangeMessage::grocery_item_archived(
                meal_plan_id,
                household_id,
                item_id,
            ))
            .await;
        }
    }

    async fn publish(&self, message: DataChangeMessage) {
        if let Err(e) = self.publisher.publish(&message).await {
            tracing::error!(
                meal_plan_id = %message.meal_plan_id,
                entity_id = %message.entity_id,
                event_type = ?message.event_type,
                error = %e,
                "failed to publish change message"
            );
        }
    }
}
