// Enforcement port - how resolved actions leave the engine.
//
// The core never performs actions itself. The Discord layer implements this
// trait and reports back what happened so results can be logged.

use super::automod_models::{ActionType, EvaluationResult};
use async_trait::async_trait;

/// Who and what an evaluation was about.
#[derive(Debug, Clone)]
pub struct EnforcementTarget {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    /// Roles the author held when the message was seen (for toggle role)
    pub author_role_ids: Vec<u64>,
}

/// Result of carrying out one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Applied(ActionType),
    Failed { action_type: ActionType, error: String },
    /// The action could not run as configured (e.g. a role action without a role)
    Skipped { action_type: ActionType, reason: String },
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied(_))
    }
}

/// Carries out resolved actions against the platform.
#[async_trait]
pub trait EnforcementExecutor: Send + Sync {
    /// Run every resolved action in order. One failure must not stop the rest.
    async fn execute(&self, target: &EnforcementTarget, result: &EvaluationResult)
        -> Vec<ActionOutcome>;
}
