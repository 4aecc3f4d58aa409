// Rule configuration - the settings port and the validator that keeps broken
// rules away from the engine.

use super::automod_models::{DetectionRule, GuildAutomodConfig, RuleCategory};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum AutomodError {
    #[error("Rule {rule_id} has a zero duration")]
    ZeroDuration { rule_id: u64 },

    #[error("Rule {rule_id} has a {action} action without a role")]
    MissingRole { rule_id: u64, action: String },

    #[error("Duplicate rule id {0}")]
    DuplicateRuleId(u64),
}

#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid rule: {0}")]
    InvalidRule(#[from] AutomodError),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Where guild rule sets and blocklists come from.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Get a guild's automod config. Guilds without one get an empty default.
    async fn get_config(&self, guild_id: u64) -> Result<GuildAutomodConfig, RuleStoreError>;

    /// Validate and save a guild's automod config.
    async fn save_config(
        &self,
        guild_id: u64,
        config: GuildAutomodConfig,
    ) -> Result<(), RuleStoreError>;

    /// Every guild that has a stored config.
    async fn guild_ids(&self) -> Result<Vec<u64>, RuleStoreError>;
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Check a single rule and normalize its optional fields.
///
/// Bad-word lists are trimmed and stripped of empty entries; a rule that ends
/// up with no words is kept (it simply never fires).
pub fn validate_rule(mut rule: DetectionRule) -> Result<DetectionRule, AutomodError> {
    if rule.duration == 0 {
        return Err(AutomodError::ZeroDuration { rule_id: rule.id });
    }

    if let Some(action) = rule
        .actions
        .iter()
        .find(|a| a.action_type.is_role_action() && a.role_id.is_none())
    {
        return Err(AutomodError::MissingRole {
            rule_id: rule.id,
            action: action.action_type.to_string(),
        });
    }

    if rule.category == RuleCategory::BadWord {
        rule.words = rule
            .words
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
    } else {
        rule.words.clear();
    }

    Ok(rule)
}

/// Validate every rule in `config`, failing on the first bad one.
pub fn validate_config(config: GuildAutomodConfig) -> Result<GuildAutomodConfig, AutomodError> {
    let mut seen = std::collections::HashSet::new();
    let mut rules = Vec::with_capacity(config.rules.len());

    for rule in config.rules {
        if !seen.insert(rule.id) {
            return Err(AutomodError::DuplicateRuleId(rule.id));
        }
        rules.push(validate_rule(rule)?);
    }

    Ok(GuildAutomodConfig { rules, ..config })
}

/// Like `validate_config`, but drops bad rules with a warning instead of
/// failing. Used when loading configs that were written by hand.
pub fn sanitize_config(guild_id: u64, config: GuildAutomodConfig) -> GuildAutomodConfig {
    let mut seen = std::collections::HashSet::new();
    let mut rules = Vec::with_capacity(config.rules.len());

    for rule in config.rules {
        if !seen.insert(rule.id) {
            tracing::warn!(guild_id, "Dropping automod rule: {}", AutomodError::DuplicateRuleId(rule.id));
            continue;
        }
        match validate_rule(rule) {
            Ok(rule) => rules.push(rule),
            Err(e) => tracing::warn!(guild_id, "Dropping automod rule: {}", e),
        }
    }

    GuildAutomodConfig { rules, ..config }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::automod::{Action, ActionType};

    #[test]
    fn test_zero_duration_is_rejected() {
        let rule = DetectionRule::new(1, RuleCategory::Spam, 5, 0);
        assert_eq!(
            validate_rule(rule),
            Err(AutomodError::ZeroDuration { rule_id: 1 })
        );
    }

    #[test]
    fn test_role_action_needs_role() {
        let mut rule = DetectionRule::new(2, RuleCategory::Spam, 5, 10);
        rule.actions = vec![Action::new(ActionType::AddRole)];
        assert!(matches!(
            validate_rule(rule.clone()),
            Err(AutomodError::MissingRole { rule_id: 2, .. })
        ));

        rule.actions = vec![Action::new(ActionType::AddRole).with_role(99)];
        assert!(validate_rule(rule).is_ok());
    }

    #[test]
    fn test_words_are_normalized() {
        let mut rule = DetectionRule::new(3, RuleCategory::BadWord, 1, 10);
        rule.words = vec!["  foo ".to_string(), "".to_string(), "   ".to_string()];

        let rule = validate_rule(rule).unwrap();
        assert_eq!(rule.words, vec!["foo".to_string()]);
    }

    #[test]
    fn test_validate_config_rejects_duplicate_ids() {
        let config = GuildAutomodConfig {
            rules: vec![
                DetectionRule::new(1, RuleCategory::Spam, 5, 10),
                DetectionRule::new(1, RuleCategory::BadWord, 5, 10),
            ],
            ..Default::default()
        };

        assert_eq!(
            validate_config(config),
            Err(AutomodError::DuplicateRuleId(1))
        );
    }

    #[test]
    fn test_sanitize_drops_only_bad_rules() {
        let config = GuildAutomodConfig {
            rules: vec![
                DetectionRule::new(1, RuleCategory::Spam, 5, 0),
                DetectionRule::new(2, RuleCategory::Spam, 5, 10),
                DetectionRule::new(2, RuleCategory::Spam, 5, 10),
            ],
            ..Default::default()
        };

        let config = sanitize_config(42, config);
        let ids: Vec<u64> = config.rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
