// Discord layer - event handlers and enforcement.

#[path = "automod/mod.rs"]
pub mod automod;

use rust_discord_automod::core::automod::AutomodService;
use rust_discord_automod::infra::automod::{InMemoryWindowStore, JsonRuleStore};
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Data that's shared across all event handlers.
/// This is where we store our services.
pub struct Data {
    pub automod: Arc<AutomodService<InMemoryWindowStore>>,
    pub rules: Arc<JsonRuleStore>,
}
