//! Outbound "data changed" messages.
//!
//! The worker publishes one message per mutated entity after its
//! transaction commits. Delivery is at-least-once; a publish failure is
//! logged by the caller and never undoes the committed state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default PostgreSQL channel for change messages.
pub const DEFAULT_CHANGE_CHANNEL: &str = "potluck_data_changes";

/// Kind of change a message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventType {
    MealPlanFinalized,
    MealPlanOptionChosen,
    GroceryListItemUpserted,
    GroceryListItemArchived,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChangeMessage {
    pub event_type: ChangeEventType,
    pub meal_plan_id: Uuid,
    pub household_id: Uuid,
    /// The mutated row: the plan, the chosen option or the grocery item.
    pub entity_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl DataChangeMessage {
    pub fn plan_finalized(meal_plan_id: Uuid, household_id: Uuid) -> Self {
        Self::new(
            ChangeEventType::MealPlanFinalized,
            meal_plan_id,
            household_id,
            meal_plan_id,
        )
    }

    pub fn option_chosen(meal_plan_id: Uuid, household_id: Uuid, option_id: Uuid) -> Self {
        Self::new(
            ChangeEventType::MealPlanOptionChosen,
            meal_plan_id,
            household_id,
            option_id,
        )
    }

    pub fn grocery_item_upserted(meal_plan_id: Uuid, household_id: Uuid, item_id: Uuid) -> Self {
        Self::new(
            ChangeEventType::GroceryListItemUpserted,
            meal_plan_id,
            household_id,
            item_id,
        )
    }

    pub fn grocery_item_archived(meal_plan_id: Uuid, household_id: Uuid, item_id: Uuid) -> Self {
        Self::new(
            ChangeEventType::GroceryListItemArchived,
            meal_plan_id,
            household_id,
            item_id,
        )
    }

    fn new(
        event_type: ChangeEventType,
        meal_plan_id: Uuid,
        household_id: Uuid,
        entity_id: Uuid,
    ) -> Self {
        Self {
            event_type,
            meal_plan_id,
            household_id,
            entity_id,
            occurred_at: Utc::now(),
        }
    }
}

/// Sink for change messages.
///
/// Object-safe so the worker can hold an `Arc<dyn ChangePublisher>`.
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(&self, message: &DataChangeMessage) -> Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ChangePublisher) {}
};

/// Publishes JSON payloads with `pg_notify` on a fixed channel.
#[derive(Debug, Clone)]
pub struct PgNotifyPublisher {
    pool: PgPool,
    channel: String,
}

impl PgNotifyPublisher {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangePublisher for PgNotifyPublisher {
    async fn publish(&self, message: &DataChangeMessage) -> Result<()> {
        let payload =
            serde_json::to_string(message).context("failed to serialize change message")?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .with_context(|| {
                format!(
                    "failed to publish {:?} for {} on channel {}",
                    message.event_type, message.entity_id, self.channel
                )
            })?;
        Ok(())
    }
}

/// Forwards messages to an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<DataChangeMessage>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end of its channel.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<DataChangeMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChangePublisher for ChannelPublisher {
    async fn publish(&self, message: &DataChangeMessage) -> Result<()> {
        self.tx
            .send(message.clone())
            .await
            .context("change message receiver dropped")?;
        Ok(())
    }
}
