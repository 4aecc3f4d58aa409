// Discord-specific enforcement - turns resolved automod actions into API calls.

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use rust_discord_automod::core::automod::{
    clamp_mute_duration, Action, ActionOutcome, ActionType, EnforcementExecutor,
    EnforcementTarget, EvaluationResult,
};
use std::sync::Arc;

/// Executor backed by serenity's HTTP client.
pub struct SerenityExecutor {
    http: Arc<serenity::Http>,
}

impl SerenityExecutor {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn apply(
        &self,
        target: &EnforcementTarget,
        action: &Action,
        default_reason: &str,
    ) -> anyhow::Result<()> {
        let guild_id = serenity::GuildId::new(target.guild_id);
        let channel_id = serenity::ChannelId::new(target.channel_id);
        let user_id = serenity::UserId::new(target.user_id);
        let reason = action.reason.as_deref().unwrap_or(default_reason);

        match action.action_type {
            ActionType::Warn => {
                let warning_msg = format!("⚠️ <@{}> **Automod Warning**: {}", user_id, reason);
                channel_id.say(&self.http, warning_msg).await?;
            }

            ActionType::Mute => {
                let seconds = clamp_mute_duration(action.duration);
                let until = serenity::Timestamp::from_unix_timestamp(
                    chrono::Utc::now().timestamp() + seconds,
                )
                .map_err(|e| anyhow::anyhow!("invalid timeout of {}s: {}", seconds, e))?;

                guild_id
                    .edit_member(
                        &self.http,
                        user_id,
                        serenity::EditMember::new()
                            .disable_communication_until_datetime(until)
                            .audit_log_reason(reason),
                    )
                    .await?;
            }

            ActionType::Kick => {
                guild_id.kick_with_reason(&self.http, user_id, reason).await?;
            }

            ActionType::Ban => {
                guild_id
                    .ban_with_reason(&self.http, user_id, 0, reason)
                    .await?;
                if let Some(seconds) = action.duration.filter(|s| *s > 0) {
                    // Unbanning is owned by the scheduled punishment task.
                    tracing::info!(
                        guild_id = target.guild_id,
                        user_id = target.user_id,
                        seconds,
                        "Temporary automod ban issued"
                    );
                }
            }

            ActionType::Delete => {
                channel_id
                    .delete_message(&self.http, serenity::MessageId::new(target.message_id))
                    .await?;
            }

            ActionType::SendMessage => {
                channel_id.say(&self.http, reason).await?;
            }

            ActionType::AddRole | ActionType::RemoveRole | ActionType::ToggleRole => {
                // validate_rule guarantees role actions carry a role
                let Some(role) = action.role_id else {
                    return Ok(());
                };

                let add = match action.action_type {
                    ActionType::AddRole => true,
                    ActionType::RemoveRole => false,
                    _ => !target.author_role_ids.contains(&role),
                };

                let role_id = serenity::RoleId::new(role);
                if add {
                    self.http
                        .add_member_role(guild_id, user_id, role_id, Some(reason))
                        .await?;
                } else {
                    self.http
                        .remove_member_role(guild_id, user_id, role_id, Some(reason))
                        .await?;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EnforcementExecutor for SerenityExecutor {
    async fn execute(
        &self,
        target: &EnforcementTarget,
        result: &EvaluationResult,
    ) -> Vec<ActionOutcome> {
        let default_reason = format!("Automod: {}", result.summary());
        let mut outcomes = Vec::with_capacity(result.resolved_actions.len());

        for action in &result.resolved_actions {
            if action.action_type.is_role_action() && action.role_id.is_none() {
                outcomes.push(ActionOutcome::Skipped {
                    action_type: action.action_type,
                    reason: "no role configured".to_string(),
                });
                continue;
            }

            match self.apply(target, action, &default_reason).await {
                Ok(()) => outcomes.push(ActionOutcome::Applied(action.action_type)),
                Err(e) => {
                    tracing::warn!(
                        guild_id = target.guild_id,
                        user_id = target.user_id,
                        "Failed to apply automod {}: {}",
                        action.action_type,
                        e
                    );
                    outcomes.push(ActionOutcome::Failed {
                        action_type: action.action_type,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcomes
    }
}
