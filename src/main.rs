// This is the entry point of the automod bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic, in the library)
// - `infra/` = Implementations of core traits (in the library)
// - `discord/` = Discord-specific adapters (events, enforcement)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register event handlers and background tasks

#[path = "discord/discord_layer.rs"]
mod discord;

use crate::discord::automod::automod_handler;
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use rust_discord_automod::core::automod::{
    AutomodService, EngineConfig, RuleStore, ThresholdComparator,
};
use rust_discord_automod::infra::automod::{InMemoryWindowStore, JsonRuleStore};
use std::sync::Arc;

const DEFAULT_RULES_PATH: &str = "data/automod_rules.json";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = automod_handler::handle_new_message(ctx, new_message, data).await {
                tracing::error!("Error running automod on message: {}", e);
            }
        }
        serenity::FullEvent::MessageUpdate {
            old_if_available: _,
            new,
            event,
        } => {
            if let Err(e) =
                automod_handler::handle_message_update(ctx, data, new.as_ref(), event).await
            {
                tracing::error!("Error running automod on edit: {}", e);
            }
        }

        _ => {}
    }

    Ok(())
}

/// Periodically drop windows that no configured rule can still reference.
async fn sweep_idle_windows(
    automod: Arc<AutomodService<InMemoryWindowStore>>,
    rules: Arc<JsonRuleStore>,
    interval: std::time::Duration,
) {
    loop {
        tokio::time::sleep(interval).await;

        let guild_ids = match rules.guild_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Automod sweep could not list guilds: {}", e);
                continue;
            }
        };

        let now = chrono::Utc::now();
        let mut removed = 0;
        for guild_id in guild_ids {
            match rules.get_config(guild_id).await {
                Ok(config) => removed += automod.sweep_idle_windows(guild_id, &config.rules, now),
                Err(e) => tracing::warn!(guild_id, "Automod sweep skipped guild: {}", e),
            }
        }

        tracing::debug!(removed, "Automod idle sweep completed");
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    let rules_path =
        std::env::var("AUTOMOD_RULES_PATH").unwrap_or_else(|_| DEFAULT_RULES_PATH.to_string());
    let sweep_interval_secs = std::env::var("AUTOMOD_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    let legacy_threshold = std::env::var("AUTOMOD_LEGACY_THRESHOLD")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let rule_store =
        Arc::new(JsonRuleStore::load(&rules_path).expect("Failed to load automod rules file"));

    let engine_config = EngineConfig {
        comparator: if legacy_threshold {
            ThresholdComparator::Exceeds
        } else {
            ThresholdComparator::AtLeast
        },
    };
    tracing::info!(?engine_config, "Automod engine configured");

    let automod_service = Arc::new(AutomodService::new(
        InMemoryWindowStore::new(),
        engine_config,
    ));

    let data = Data {
        automod: Arc::clone(&automod_service),
        rules: Arc::clone(&rule_store),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |_ctx, _ready, _framework| {
            Box::pin(async move {
                tracing::info!("Automod bot is ready");

                // Background sweep keeps per-user windows from growing forever.
                tokio::spawn(sweep_idle_windows(
                    Arc::clone(&data.automod),
                    Arc::clone(&data.rules),
                    std::time::Duration::from_secs(sweep_interval_secs),
                ));

                Ok(data)
            })
        })
        .build();

    // Keep edited messages resolvable so edits can be evaluated
    let mut settings = serenity::cache::Settings::default();
    settings.max_messages = 10000;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .cache_settings(settings)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
