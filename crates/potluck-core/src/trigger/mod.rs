//! Inbound "vote recorded" triggers.
//!
//! The payload names the plan directly or any row beneath it. The most
//! specific ID wins when resolving: plan, then event, then option.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use potluck_db::queries::meal_plans;

/// Default PostgreSQL channel for vote notifications.
pub const DEFAULT_VOTE_CHANNEL: &str = "potluck_vote_recorded";

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("malformed vote trigger payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("vote trigger names no meal plan, event or option")]
    Empty,
}

/// A vote was written somewhere under a meal plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecorded {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan_event_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_plan_option_id: Option<Uuid>,
}

impl VoteRecorded {
    pub fn for_plan(meal_plan_id: Uuid) -> Self {
        Self {
            meal_plan_id: Some(meal_plan_id),
            ..Self::default()
        }
    }

    pub fn for_option(meal_plan_option_id: Uuid) -> Self {
        Self {
            meal_plan_option_id: Some(meal_plan_option_id),
            ..Self::default()
        }
    }

    /// Parse a JSON payload. At least one ID must be present.
    pub fn parse(payload: &str) -> Result<Self, TriggerError> {
        let trigger: Self = serde_json::from_str(payload)?;
        if trigger.meal_plan_id.is_none()
            && trigger.meal_plan_event_id.is_none()
            && trigger.meal_plan_option_id.is_none()
        {
            return Err(TriggerError::Empty);
        }
        Ok(trigger)
    }

    /// Resolve the owning plan through storage. `None` when the named row
    /// does not exist or is archived.
    pub async fn resolve_meal_plan_id(&self, pool: &PgPool) -> Result<Option<Uuid>> {
        if let Some(id) = self.meal_plan_id {
            return Ok(Some(id));
        }
        if let Some(event_id) = self.meal_plan_event_id {
            return meal_plans::find_meal_plan_id_for_event(pool, event_id).await;
        }
        if let Some(option_id) = self.meal_plan_option_id {
            return meal_plans::find_meal_plan_id_for_option(pool, option_id).await;
        }
        Ok(None)
    }
}
