// Rule aggregation - sums a window of feature records per rule and decides
// which rules fire.
//
// Each rule is evaluated independently against the same snapshot; nothing in
// here touches shared state.

use super::automod_models::{DetectionRule, FeatureRecord, RuleCategory, ThresholdComparator};
use chrono::Duration;

/// Evaluate `rules` against a newest-first window snapshot.
///
/// Triggered rules come back grouped by category (bad word, spam, malicious
/// link, phishing link) and in configured order within each category.
///
/// # Panics
/// If a rule has a zero duration. The rule store rejects those, so reaching
/// one here is a caller bug.
pub fn evaluate(
    window: &[FeatureRecord],
    rules: &[DetectionRule],
    comparator: ThresholdComparator,
) -> Vec<DetectionRule> {
    let Some(newest) = window.first() else {
        return Vec::new();
    };

    RuleCategory::ORDER
        .iter()
        .flat_map(|category| rules.iter().filter(move |r| r.category == *category))
        .filter(|rule| {
            let metric = rule_metric(rule, newest, window);
            comparator.is_met(metric, rule.threshold) && can_trigger(rule)
        })
        .cloned()
        .collect()
}

/// Compute a rule's metric over the part of `window` inside its duration.
pub fn rule_metric(rule: &DetectionRule, newest: &FeatureRecord, window: &[FeatureRecord]) -> u64 {
    assert!(
        rule.duration > 0,
        "automod rule {} has a zero duration",
        rule.id
    );

    let lookback = i64::try_from(rule.duration)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    let in_window = window
        .iter()
        .filter(move |record| newest.timestamp - record.timestamp < lookback)
        .filter(|record| !record.exempt_rule_ids.contains(&rule.id));

    match rule.category {
        RuleCategory::BadWord => in_window
            .map(|r| u64::from(r.triggered_word_counts.get(&rule.id).copied().unwrap_or(0)))
            .sum(),
        RuleCategory::MaliciousLink => in_window.map(|r| u64::from(r.malicious_link_count)).sum(),
        RuleCategory::PhishingLink => in_window.map(|r| u64::from(r.phishing_link_count)).sum(),
        RuleCategory::Spam => in_window
            .map(|r| u64::from(r.metric(rule.antispam_metric)))
            .sum(),
    }
}

/// Bad-word rules without words are inert regardless of threshold.
fn can_trigger(rule: &DetectionRule) -> bool {
    match rule.category {
        RuleCategory::BadWord => rule.words.iter().any(|w| !w.is_empty()),
        _ => true,
    }
}

// ============================================================================
// TESTS
// ============================================================================
