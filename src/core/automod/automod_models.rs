// Automod domain models - data structures for the rule evaluation engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity messages into `RawMessage` and turns
// the resolved `Action`s back into API calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Longest timeout Discord accepts (28 days), in seconds.
pub const MAX_MUTE_SECS: i64 = 2_419_200;

/// Which detector a rule belongs to.
///
/// Triggered rules are reported in `RuleCategory::ORDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    BadWord,
    Spam,
    MaliciousLink,
    PhishingLink,
}

impl RuleCategory {
    pub const ORDER: [RuleCategory; 4] = [
        RuleCategory::BadWord,
        RuleCategory::Spam,
        RuleCategory::MaliciousLink,
        RuleCategory::PhishingLink,
    ];
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleCategory::BadWord => write!(f, "Bad Word"),
            RuleCategory::Spam => write!(f, "Spam"),
            RuleCategory::MaliciousLink => write!(f, "Malicious Link"),
            RuleCategory::PhishingLink => write!(f, "Phishing Link"),
        }
    }
}

/// What a spam rule counts across the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntispamMetric {
    /// Number of messages in the window
    #[default]
    Message,
    Mention,
    Word,
    Newline,
    Link,
    Attachment,
    Emoji,
}

/// Every punitive action the executor knows how to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Warn,
    Mute,
    Kick,
    Ban,
    Delete,
    SendMessage,
    AddRole,
    RemoveRole,
    ToggleRole,
}

impl ActionType {
    pub fn is_role_action(&self) -> bool {
        matches!(
            self,
            ActionType::AddRole | ActionType::RemoveRole | ActionType::ToggleRole
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionType::Warn => "warn",
            ActionType::Mute => "mute",
            ActionType::Kick => "kick",
            ActionType::Ban => "ban",
            ActionType::Delete => "delete",
            ActionType::SendMessage => "send message",
            ActionType::AddRole => "add role",
            ActionType::RemoveRole => "remove role",
            ActionType::ToggleRole => "toggle role",
        };
        write!(f, "{}", name)
    }
}

/// A single punitive step attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    /// Seconds. Only meaningful for mute and ban; zero or negative on a mute
    /// means "as long as possible".
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Target role for add/remove/toggle role actions
    #[serde(default)]
    pub role_id: Option<u64>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            duration: None,
            reason: None,
            role_id: None,
        }
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_role(mut self, role_id: u64) -> Self {
        self.role_id = Some(role_id);
        self
    }
}

/// A server-configured detection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub category: RuleCategory,
    /// Only read for spam rules
    #[serde(default)]
    pub antispam_metric: AntispamMetric,
    pub threshold: u32,
    /// Lookback window in seconds
    pub duration: u64,
    /// Only read for bad-word rules
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub match_whole_word: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub exempt_roles: BTreeSet<u64>,
    #[serde(default)]
    pub exempt_channels: BTreeSet<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl DetectionRule {
    /// Create an enabled rule with no words, actions or exemptions.
    pub fn new(id: u64, category: RuleCategory, threshold: u32, duration: u64) -> Self {
        Self {
            id,
            name: format!("{} rule #{}", category, id),
            category,
            antispam_metric: AntispamMetric::default(),
            threshold,
            duration,
            words: Vec::new(),
            match_whole_word: false,
            case_sensitive: false,
            actions: Vec::new(),
            exempt_roles: BTreeSet::new(),
            exempt_channels: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Whether this rule should be skipped for a message in `channel_id`
    /// from an author holding `role_ids`.
    pub fn is_exempt(&self, channel_id: u64, role_ids: &[u64]) -> bool {
        self.exempt_channels.contains(&channel_id)
            || role_ids.iter().any(|r| self.exempt_roles.contains(r))
    }
}

/// Substring/domain blocklists consulted by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocklists {
    #[serde(default)]
    pub malicious_links: BTreeSet<String>,
    #[serde(default)]
    pub phishing_links: BTreeSet<String>,
}

/// Everything the engine needs to know about one guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildAutomodConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<DetectionRule>,
    #[serde(default)]
    pub blocklists: Blocklists,
}

impl Default for GuildAutomodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
            blocklists: Blocklists::default(),
        }
    }
}

/// The engine's view of an inbound (or edited) message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub content: String,
    /// Creation time for new messages, edit time for edits
    pub timestamp: DateTime<Utc>,
    pub attachment_count: u32,
    pub author_role_ids: Vec<u64>,
}

/// Parse an RFC 3339 timestamp as sent by Discord, keeping sub-second
/// precision so window cutoffs are not shifted by truncation.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Fixed-shape metadata extracted from one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub user_id: u64,
    pub message_id: u64,
    pub channel_id: u64,
    pub timestamp: DateTime<Utc>,
    /// Rule id -> occurrences of that rule's words in this message
    pub triggered_word_counts: BTreeMap<u64, u32>,
    pub malicious_link_count: u32,
    pub phishing_link_count: u32,
    pub mention_count: u32,
    pub word_count: u32,
    pub newline_count: u32,
    pub link_count: u32,
    pub attachment_count: u32,
    pub emoji_count: u32,
    /// Rules this message was exempt from; they skip the record when summing
    #[serde(default)]
    pub exempt_rule_ids: BTreeSet<u64>,
}

impl FeatureRecord {
    /// Value of a per-message counter used by spam rules.
    /// `AntispamMetric::Message` counts each record once.
    pub fn metric(&self, metric: AntispamMetric) -> u32 {
        match metric {
            AntispamMetric::Message => 1,
            AntispamMetric::Mention => self.mention_count,
            AntispamMetric::Word => self.word_count,
            AntispamMetric::Newline => self.newline_count,
            AntispamMetric::Link => self.link_count,
            AntispamMetric::Attachment => self.attachment_count,
            AntispamMetric::Emoji => self.emoji_count,
        }
    }
}

/// How a rule's metric is compared against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdComparator {
    /// `metric >= threshold`
    #[default]
    AtLeast,
    /// `metric > threshold`, the older behaviour some servers were tuned for
    Exceeds,
}

impl ThresholdComparator {
    pub fn is_met(&self, metric: u64, threshold: u32) -> bool {
        match self {
            ThresholdComparator::AtLeast => metric >= u64::from(threshold),
            ThresholdComparator::Exceeds => metric > u64::from(threshold),
        }
    }
}

/// Output of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub triggered_rules: Vec<DetectionRule>,
    pub resolved_actions: Vec<Action>,
}

impl EvaluationResult {
    pub fn is_triggered(&self) -> bool {
        !self.triggered_rules.is_empty()
    }

    /// Names of the triggered rules, joined for audit log reasons.
    pub fn summary(&self) -> String {
        self.triggered_rules
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
