// JSON-file implementation of RuleStore.
//
// The whole file is a map of guild_id -> GuildAutomodConfig. It is read once
// at start-up and rewritten on every save.

use crate::core::automod::{
    sanitize_config, validate_config, GuildAutomodConfig, RuleStore, RuleStoreError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

pub struct JsonRuleStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, GuildAutomodConfig>>,
}

impl JsonRuleStore {
    /// Load the store from `path`. A missing file starts an empty store;
    /// rules that fail validation are dropped with a warning.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let map: HashMap<u64, GuildAutomodConfig> = if path.exists() {
            let file = std::fs::File::open(&path)?;
            serde_json::from_reader(file)?
        } else {
            HashMap::new()
        };

        let map: HashMap<u64, GuildAutomodConfig> = map
            .into_iter()
            .map(|(guild_id, config)| (guild_id, sanitize_config(guild_id, config)))
            .collect();

        tracing::info!(
            path = %path.display(),
            guilds = map.len(),
            "Loaded automod rules"
        );

        Ok(Self {
            path,
            cache: RwLock::new(map),
        })
    }

    async fn persist(&self) -> Result<(), RuleStoreError> {
        let cache = self.cache.read().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(file, &*cache)?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for JsonRuleStore {
    async fn get_config(&self, guild_id: u64) -> Result<GuildAutomodConfig, RuleStoreError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&guild_id).cloned().unwrap_or_default())
    }

    async fn save_config(
        &self,
        guild_id: u64,
        config: GuildAutomodConfig,
    ) -> Result<(), RuleStoreError> {
        let config = validate_config(config)?;

        let mut cache = self.cache.write().await;
        cache.insert(guild_id, config);
        drop(cache); // Release lock before persisting
        self.persist().await
    }

    async fn guild_ids(&self) -> Result<Vec<u64>, RuleStoreError> {
        let cache = self.cache.read().await;
        let mut ids: Vec<u64> = cache.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
