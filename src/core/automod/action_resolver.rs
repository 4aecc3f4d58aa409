// Action resolution - merges the actions of every triggered rule into the
// list the enforcement executor carries out.

use super::automod_models::{Action, ActionType, DetectionRule, EvaluationResult, MAX_MUTE_SECS};

/// Merge the actions of `triggered_rules` into an `EvaluationResult`.
///
/// Actions keep rule order and per-rule order. A ban makes every kick
/// redundant, so kicks are dropped when any ban is present. Nothing else is
/// deduplicated: two warns from two rules are two separate cases.
pub fn resolve(triggered_rules: Vec<DetectionRule>) -> EvaluationResult {
    let concatenated: Vec<&Action> = triggered_rules.iter().flat_map(|r| &r.actions).collect();

    let has_ban = concatenated
        .iter()
        .any(|a| a.action_type == ActionType::Ban);

    let resolved_actions = concatenated
        .into_iter()
        .filter(|a| !(has_ban && a.action_type == ActionType::Kick))
        .map(normalize_action)
        .collect();

    EvaluationResult {
        triggered_rules,
        resolved_actions,
    }
}

fn normalize_action(action: &Action) -> Action {
    let mut action = action.clone();
    if action.action_type == ActionType::Mute {
        action.duration = Some(clamp_mute_duration(action.duration));
    }
    action
}

/// Effective mute length in seconds.
///
/// Discord refuses timeouts longer than 28 days, so "permanent" requests
/// (missing, zero or negative) and anything longer become exactly 28 days.
/// Longer mutes have to be re-applied by a scheduler.
pub fn clamp_mute_duration(requested: Option<i64>) -> i64 {
    match requested {
        Some(secs) if secs > 0 && secs <= MAX_MUTE_SECS => secs,
        _ => MAX_MUTE_SECS,
    }
}

// ============================================================================
// TESTS
// ============================================================================
