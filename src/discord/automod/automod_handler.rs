// Discord-specific automod handling - translates serenity messages into the
// engine's RawMessage and hands results to the executor.
//
// This layer is THIN - no rule logic, just translation.

use crate::discord::automod::serenity_executor::SerenityExecutor;
use crate::discord::{Data, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use rust_discord_automod::core::automod::{
    parse_timestamp, ActionOutcome, EnforcementExecutor, EnforcementTarget, EvaluationResult,
    RawMessage, RuleStore,
};

/// Run automod over a newly sent message.
///
/// Returns `true` if any rule triggered.
pub async fn handle_new_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    // Skip bots
    if msg.author.bot {
        return Ok(false);
    }

    let Some(timestamp) = to_utc(&msg.timestamp, msg.id) else {
        return Ok(false);
    };

    // Only check guild messages
    let Some(raw) = raw_message(msg, timestamp) else {
        return Ok(false);
    };

    let config = data
        .rules
        .get_config(raw.guild_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let result = data.automod.on_new_message(&raw, &config);
    enforce(ctx, &raw, &result).await;

    Ok(result.is_triggered())
}

/// Run automod over an edited message without touching the user's window.
pub async fn handle_message_update(
    ctx: &serenity::Context,
    data: &Data,
    new: Option<&serenity::Message>,
    event: &serenity::MessageUpdateEvent,
) -> Result<bool, Error> {
    // Without the full message in cache we can't see author or attachments
    let Some(msg) = new else {
        tracing::debug!("Edited message {} not cached, skipping automod", event.id);
        return Ok(false);
    };

    if msg.author.bot {
        return Ok(false);
    }

    let edited_at = msg.edited_timestamp.unwrap_or(msg.timestamp);
    let Some(timestamp) = to_utc(&edited_at, msg.id) else {
        return Ok(false);
    };
    let Some(raw) = raw_message(msg, timestamp) else {
        return Ok(false);
    };

    let config = data
        .rules
        .get_config(raw.guild_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let result = data.automod.on_edited_message(&raw, &config);
    enforce(ctx, &raw, &result).await;

    Ok(result.is_triggered())
}

fn raw_message(msg: &serenity::Message, timestamp: DateTime<Utc>) -> Option<RawMessage> {
    let guild_id = msg.guild_id?;

    Some(RawMessage {
        guild_id: guild_id.get(),
        user_id: msg.author.id.get(),
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        content: msg.content.clone(),
        timestamp,
        attachment_count: msg.attachments.len() as u32,
        author_role_ids: msg
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| r.get()).collect())
            .unwrap_or_default(),
    })
}

/// Convert through the RFC 3339 form so sub-second precision survives.
fn to_utc(
    timestamp: &serenity::Timestamp,
    message_id: serenity::MessageId,
) -> Option<DateTime<Utc>> {
    let raw = timestamp.to_string();
    let parsed = parse_timestamp(&raw);
    if parsed.is_none() {
        tracing::error!(
            message_id = message_id.get(),
            "Unparseable message timestamp {:?}, skipping automod",
            raw
        );
    }
    parsed
}

async fn enforce(ctx: &serenity::Context, raw: &RawMessage, result: &EvaluationResult) {
    if !result.is_triggered() {
        return;
    }

    let target = EnforcementTarget {
        guild_id: raw.guild_id,
        channel_id: raw.channel_id,
        message_id: raw.message_id,
        user_id: raw.user_id,
        author_role_ids: raw.author_role_ids.clone(),
    };

    let executor = SerenityExecutor::new(ctx.http.clone());
    let outcomes = executor.execute(&target, result).await;

    let applied = outcomes.iter().filter(|o| o.is_applied()).count();
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, ActionOutcome::Failed { .. }))
        .count();

    tracing::info!(
        guild_id = raw.guild_id,
        user_id = raw.user_id,
        rules = %result.summary(),
        applied,
        failed,
        "Automod enforcement finished"
    );
}
