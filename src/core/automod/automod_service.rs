// Automod service - the entry points the Discord layer calls.
//
// This service handles:
// - New messages (extract -> append to window -> evaluate -> resolve)
// - Edited messages (evaluated alone, never stored)
// - Rule exemptions per channel and role
// - Sweeping windows nobody can reference anymore
//
// NO Discord dependencies here - just pure domain logic.

use super::action_resolver::resolve;
use super::automod_models::{
    DetectionRule, EvaluationResult, FeatureRecord, GuildAutomodConfig, RawMessage,
    ThresholdComparator,
};
use super::feature_extractor::extract;
use super::rule_aggregator::evaluate;
use chrono::{DateTime, Duration, Utc};

/// How many records a single user's window keeps.
pub const WINDOW_CAPACITY: usize = 100;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for the per-guild, per-user sliding windows.
///
/// Implementations must make `append` and `snapshot` safe to call
/// concurrently for the same key: an append that returned before a snapshot
/// started is always visible to it.
pub trait WindowStore: Send + Sync {
    /// Append a record, evicting the oldest ones past `WINDOW_CAPACITY`.
    fn append(&self, guild_id: u64, user_id: u64, record: FeatureRecord);

    /// Copy of the user's window, newest first. Empty if the user is unknown.
    fn snapshot(&self, guild_id: u64, user_id: u64) -> Vec<FeatureRecord>;

    /// Drop the guild's windows whose newest record is older than `older_than`.
    /// Returns how many windows were removed.
    fn sweep_idle(&self, guild_id: u64, older_than: DateTime<Utc>) -> usize;

    /// Number of users with a window in this guild.
    fn tracked_users(&self, guild_id: u64) -> usize;
}

// ============================================================================
// CONFIG
// ============================================================================

/// Process-wide engine settings.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub comparator: ThresholdComparator,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Automod service over an injected window store.
pub struct AutomodService<W: WindowStore> {
    windows: W,
    config: EngineConfig,
}

impl<W: WindowStore> AutomodService<W> {
    pub fn new(windows: W, config: EngineConfig) -> Self {
        Self { windows, config }
    }

    /// Evaluate a freshly sent message against the user's window.
    ///
    /// The message is appended to the window before evaluation, so it is
    /// always `snapshot[0]`.
    pub fn on_new_message(
        &self,
        message: &RawMessage,
        guild_config: &GuildAutomodConfig,
    ) -> EvaluationResult {
        // Guilds without rules are not tracked at all, so the idle sweep
        // only has to visit guilds that have a config.
        if !guild_config.enabled || guild_config.rules.is_empty() {
            return EvaluationResult::default();
        }

        let enabled = enabled_rules(&guild_config.rules);
        let record = extract(message, &enabled, &guild_config.blocklists);
        let rules = applicable_rules(enabled, &record);

        self.windows
            .append(message.guild_id, message.user_id, record);
        let window = self.windows.snapshot(message.guild_id, message.user_id);

        self.finish(message, window, &rules)
    }

    /// Evaluate an edited message on its own.
    ///
    /// The edit is never written to the window; it gets a one-record window
    /// for this pass only.
    pub fn on_edited_message(
        &self,
        message: &RawMessage,
        guild_config: &GuildAutomodConfig,
    ) -> EvaluationResult {
        if !guild_config.enabled {
            return EvaluationResult::default();
        }

        let enabled = enabled_rules(&guild_config.rules);
        let record = extract(message, &enabled, &guild_config.blocklists);
        let rules = applicable_rules(enabled, &record);

        self.finish(message, vec![record], &rules)
    }

    fn finish(
        &self,
        message: &RawMessage,
        window: Vec<FeatureRecord>,
        rules: &[DetectionRule],
    ) -> EvaluationResult {
        let triggered = evaluate(&window, rules, self.config.comparator);
        let result = resolve(triggered);

        if result.is_triggered() {
            tracing::info!(
                guild_id = message.guild_id,
                user_id = message.user_id,
                message_id = message.message_id,
                rules = %result.summary(),
                actions = result.resolved_actions.len(),
                "Automod rules triggered"
            );
        } else {
            tracing::trace!(
                guild_id = message.guild_id,
                user_id = message.user_id,
                window_len = window.len(),
                "No automod rules triggered"
            );
        }

        result
    }

    /// Forget windows that no rule in `rules` can still look at.
    ///
    /// A window whose newest record is older than the longest rule duration
    /// can never contribute to a metric again.
    pub fn sweep_idle_windows(
        &self,
        guild_id: u64,
        rules: &[DetectionRule],
        now: DateTime<Utc>,
    ) -> usize {
        let longest = rules.iter().map(|r| r.duration).max().unwrap_or(0);
        let lookback = i64::try_from(longest)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);

        let removed = match now.checked_sub_signed(lookback) {
            Some(cutoff) => self.windows.sweep_idle(guild_id, cutoff),
            None => 0,
        };

        if removed > 0 {
            tracing::debug!(guild_id, removed, "Swept idle automod windows");
        }
        removed
    }

    /// Number of users currently tracked in a guild.
    pub fn tracked_users(&self, guild_id: u64) -> usize {
        self.windows.tracked_users(guild_id)
    }

    /// Newest-first copy of a user's window.
    pub fn window(&self, guild_id: u64, user_id: u64) -> Vec<FeatureRecord> {
        self.windows.snapshot(guild_id, user_id)
    }
}

fn enabled_rules(rules: &[DetectionRule]) -> Vec<DetectionRule> {
    rules.iter().filter(|r| r.enabled).cloned().collect()
}

/// Rules evaluated for the message behind `record`. An exempt message never
/// triggers a rule, and stays out of that rule's sums for later messages.
fn applicable_rules(enabled: Vec<DetectionRule>, record: &FeatureRecord) -> Vec<DetectionRule> {
    enabled
        .into_iter()
        .filter(|r| !record.exempt_rule_ids.contains(&r.id))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::automod::{Action, ActionType, AntispamMetric, Blocklists, RuleCategory};
    use chrono::TimeZone;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Minimal window store for testing
    struct MockWindowStore {
        windows: Mutex<HashMap<(u64, u64), VecDeque<FeatureRecord>>>,
    }

    impl MockWindowStore {
        fn new() -> Self {
            Self {
                windows: Mutex::new(HashMap::new()),
            }
        }
    }

    impl WindowStore for MockWindowStore {
        fn append(&self, guild_id: u64, user_id: u64, record: FeatureRecord) {
            let mut windows = self.windows.lock().unwrap();
            let window = windows.entry((guild_id, user_id)).or_default();
            window.push_back(record);
            while window.len() > WINDOW_CAPACITY {
                window.pop_front();
            }
        }

        fn snapshot(&self, guild_id: u64, user_id: u64) -> Vec<FeatureRecord> {
            let windows = self.windows.lock().unwrap();
            windows
                .get(&(guild_id, user_id))
                .map(|w| w.iter().rev().cloned().collect())
                .unwrap_or_default()
        }

        fn sweep_idle(&self, guild_id: u64, older_than: DateTime<Utc>) -> usize {
            let mut windows = self.windows.lock().unwrap();
            let before = windows.len();
            windows.retain(|(g, _), w| {
                *g != guild_id || w.back().is_some_and(|r| r.timestamp >= older_than)
            });
            before - windows.len()
        }

        fn tracked_users(&self, guild_id: u64) -> usize {
            let windows = self.windows.lock().unwrap();
            windows.keys().filter(|(g, _)| *g == guild_id).count()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn message(id: u64, content: &str, secs: i64) -> RawMessage {
        RawMessage {
            guild_id: 100,
            user_id: 200,
            channel_id: 300,
            message_id: id,
            content: content.to_string(),
            timestamp: at(secs),
            attachment_count: 0,
            author_role_ids: vec![],
        }
    }

    fn spam_word_config() -> GuildAutomodConfig {
        let mut rule = DetectionRule::new(1, RuleCategory::BadWord, 3, 60);
        rule.words = vec!["spam".to_string()];
        rule.actions = vec![Action::new(ActionType::Warn)];
        GuildAutomodConfig {
            rules: vec![rule],
            ..Default::default()
        }
    }

    fn service() -> AutomodService<MockWindowStore> {
        AutomodService::new(MockWindowStore::new(), EngineConfig::default())
    }

    #[test]
    fn test_single_message_triggers_bad_word_rule() {
        let service = service();
        let config = spam_word_config();

        let result = service.on_new_message(&message(1, "spam spam spam", 0), &config);

        assert_eq!(service.window(100, 200)[0].triggered_word_counts[&1], 3);
        assert_eq!(result.triggered_rules.len(), 1);
        assert_eq!(result.resolved_actions, vec![Action::new(ActionType::Warn)]);
    }

    #[test]
    fn test_windowed_bad_word_triggers_on_third_message() {
        let service = service();
        let config = spam_word_config();

        let first = service.on_new_message(&message(1, "this is spam", 0), &config);
        let second = service.on_new_message(&message(2, "more spam", 20), &config);
        let third = service.on_new_message(&message(3, "spam again", 40), &config);

        assert!(!first.is_triggered());
        assert!(!second.is_triggered());
        assert!(third.is_triggered());
        assert_eq!(third.resolved_actions.len(), 1);
    }

    #[test]
    fn test_old_messages_fall_out_of_the_window() {
        let service = service();
        let config = spam_word_config();

        service.on_new_message(&message(1, "spam", 0), &config);
        service.on_new_message(&message(2, "spam", 30), &config);
        // 60s after the first message: the first one no longer counts
        let result = service.on_new_message(&message(3, "spam", 60), &config);

        assert!(!result.is_triggered());
    }

    #[test]
    fn test_edits_do_not_leak_into_history() {
        let service = service();
        let config = spam_word_config();

        service.on_new_message(&message(1, "spam", 0), &config);
        let edit = service.on_edited_message(&message(1, "spam spam", 5), &config);
        assert!(!edit.is_triggered());
        assert_eq!(service.window(100, 200).len(), 1);

        // With the edit in history this would already be 4 occurrences.
        let next = service.on_new_message(&message(2, "hello", 10), &config);
        assert!(!next.is_triggered());
    }

    #[test]
    fn test_edit_is_evaluated_on_its_own() {
        let service = service();
        let config = spam_word_config();

        service.on_new_message(&message(1, "spam spam", 0), &config);
        let edit = service.on_edited_message(&message(2, "spam", 1), &config);
        assert!(!edit.is_triggered());

        let edit = service.on_edited_message(&message(2, "spam spam spam", 2), &config);
        assert!(edit.is_triggered());
    }

    #[test]
    fn test_exempt_channel_and_role() {
        let service = service();
        let mut config = spam_word_config();
        config.rules[0].exempt_channels.insert(300);

        let result = service.on_new_message(&message(1, "spam spam spam", 0), &config);
        assert!(!result.is_triggered());

        let mut config = spam_word_config();
        config.rules[0].exempt_roles.insert(7);
        let mut msg = message(2, "spam spam spam", 1);
        msg.author_role_ids = vec![5, 7];
        assert!(!service.on_new_message(&msg, &config).is_triggered());

        msg.author_role_ids = vec![5];
        assert!(service.on_new_message(&msg, &config).is_triggered());
    }

    #[test]
    fn test_exempt_channel_messages_do_not_count_later() {
        let service = service();
        let mut rule = DetectionRule::new(5, RuleCategory::Spam, 3, 60);
        rule.antispam_metric = AntispamMetric::Message;
        rule.exempt_channels.insert(999);
        rule.actions = vec![Action::new(ActionType::Delete)];
        let config = GuildAutomodConfig {
            rules: vec![rule],
            ..Default::default()
        };

        for (id, secs) in [(1, 0), (2, 1)] {
            let mut msg = message(id, "hello", secs);
            msg.channel_id = 999;
            assert!(!service.on_new_message(&msg, &config).is_triggered());
        }

        let result = service.on_new_message(&message(3, "hello", 2), &config);
        assert!(!result.is_triggered());
        assert_eq!(service.window(100, 200).len(), 3);

        // Two more non-exempt messages reach the threshold on their own
        service.on_new_message(&message(4, "hello", 3), &config);
        let result = service.on_new_message(&message(5, "hello", 4), &config);
        assert!(result.is_triggered());
    }

    #[test]
    fn test_exempt_role_link_hits_do_not_count_later() {
        let service = service();
        let mut rule = DetectionRule::new(6, RuleCategory::PhishingLink, 2, 60);
        rule.exempt_roles.insert(7);
        let config = GuildAutomodConfig {
            rules: vec![rule],
            blocklists: Blocklists {
                phishing_links: ["free-nitro".to_string()].into_iter().collect(),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut moderator = message(1, "https://free-nitro.gift", 0);
        moderator.author_role_ids = vec![7];
        assert!(!service.on_new_message(&moderator, &config).is_triggered());

        let result = service.on_new_message(&message(2, "https://free-nitro.gift", 1), &config);
        assert!(!result.is_triggered());
    }

    #[test]
    fn test_disabled_guild_is_not_tracked() {
        let service = service();
        let mut config = spam_word_config();
        config.enabled = false;

        let result = service.on_new_message(&message(1, "spam spam spam", 0), &config);

        assert!(!result.is_triggered());
        assert_eq!(service.tracked_users(100), 0);
    }

    #[test]
    fn test_guild_without_rules_is_not_tracked() {
        let service = service();

        let result =
            service.on_new_message(&message(1, "hello", 0), &GuildAutomodConfig::default());

        assert!(!result.is_triggered());
        assert_eq!(service.tracked_users(100), 0);
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let service = service();
        let mut config = spam_word_config();
        config.rules[0].enabled = false;

        let result = service.on_new_message(&message(1, "spam spam spam", 0), &config);
        assert!(!result.is_triggered());
    }

    #[test]
    fn test_message_rate_rule_with_legacy_comparator() {
        let mut rule = DetectionRule::new(9, RuleCategory::Spam, 2, 10);
        rule.antispam_metric = AntispamMetric::Message;
        rule.actions = vec![Action::new(ActionType::Mute).with_duration(0)];
        let config = GuildAutomodConfig {
            rules: vec![rule],
            ..Default::default()
        };

        let service = AutomodService::new(
            MockWindowStore::new(),
            EngineConfig {
                comparator: ThresholdComparator::Exceeds,
            },
        );

        assert!(!service.on_new_message(&message(1, "a", 0), &config).is_triggered());
        assert!(!service.on_new_message(&message(2, "b", 1), &config).is_triggered());
        let third = service.on_new_message(&message(3, "c", 2), &config);
        assert!(third.is_triggered());
        assert_eq!(third.resolved_actions[0].duration, Some(2_419_200));
    }

    #[test]
    fn test_sweep_uses_longest_rule_duration() {
        let service = service();
        let config = spam_word_config();

        service.on_new_message(&message(1, "hello", 0), &config);
        let mut other = message(2, "hello", 100);
        other.user_id = 201;
        service.on_new_message(&other, &config);

        // Longest duration is 60s: at t=120 the first user (newest t=0) is idle.
        let removed = service.sweep_idle_windows(100, &config.rules, at(120));

        assert_eq!(removed, 1);
        assert_eq!(service.tracked_users(100), 1);
        assert!(service.window(100, 200).is_empty());
        assert_eq!(service.window(100, 201).len(), 1);
    }
}
