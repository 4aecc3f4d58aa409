// Feature extraction - turns a raw message into a fixed-shape FeatureRecord.
//
// Everything here is a pure function of the message and the rule set, so the
// same input always produces the same record.

use super::automod_models::{Blocklists, DetectionRule, FeatureRecord, RawMessage, RuleCategory};
use dashmap::DashMap;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[!&]?\d+>|@everyone|@here").expect("valid mention regex"));

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://[^\s<>]+").expect("valid link regex"));

static CUSTOM_EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a?:\w+:\d+>").expect("valid custom emoji regex"));

static UNICODE_EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Extended_Pictographic}").expect("valid emoji regex"));

/// Compiled whole-word matchers, keyed by the (already cased) word.
static WHOLE_WORD_RES: LazyLock<DashMap<String, Regex>> = LazyLock::new(DashMap::new);

/// Build the feature record for `message`.
///
/// Rules the message is exempt from (by channel or author role) are recorded
/// in `exempt_rule_ids` and get no word counts.
pub fn extract(
    message: &RawMessage,
    rules: &[DetectionRule],
    blocklists: &Blocklists,
) -> FeatureRecord {
    let content = message.content.as_str();
    let lowered = content.to_lowercase();

    let exempt_rule_ids: BTreeSet<u64> = rules
        .iter()
        .filter(|rule| rule.is_exempt(message.channel_id, &message.author_role_ids))
        .map(|rule| rule.id)
        .collect();

    let triggered_word_counts: BTreeMap<u64, u32> = rules
        .iter()
        .filter(|rule| rule.category == RuleCategory::BadWord)
        .filter(|rule| !exempt_rule_ids.contains(&rule.id))
        .map(|rule| (rule.id, count_rule_words(rule, content, &lowered)))
        .collect();

    FeatureRecord {
        user_id: message.user_id,
        message_id: message.message_id,
        channel_id: message.channel_id,
        timestamp: message.timestamp,
        triggered_word_counts,
        malicious_link_count: count_blocklist_hits(&lowered, &blocklists.malicious_links),
        phishing_link_count: count_blocklist_hits(&lowered, &blocklists.phishing_links),
        mention_count: to_count(MENTION_RE.find_iter(content).count()),
        word_count: to_count(content.split_whitespace().count()),
        newline_count: to_count(content.matches('\n').count()),
        link_count: to_count(LINK_RE.find_iter(content).count()),
        attachment_count: message.attachment_count,
        emoji_count: to_count(
            UNICODE_EMOJI_RE.find_iter(content).count()
                + CUSTOM_EMOJI_RE.find_iter(content).count(),
        ),
        exempt_rule_ids,
    }
}

/// Count every non-overlapping occurrence of the rule's words.
fn count_rule_words(rule: &DetectionRule, content: &str, lowered: &str) -> u32 {
    let haystack = if rule.case_sensitive { content } else { lowered };

    let total: usize = rule
        .words
        .iter()
        .filter(|word| !word.is_empty())
        .map(|word| {
            let needle = if rule.case_sensitive {
                word.clone()
            } else {
                word.to_lowercase()
            };

            if rule.match_whole_word {
                count_whole_word(haystack, &needle)
            } else {
                haystack.matches(needle.as_str()).count()
            }
        })
        .sum();

    to_count(total)
}

fn count_whole_word(haystack: &str, needle: &str) -> usize {
    whole_word_regex(needle)
        .map(|re| re.find_iter(haystack).count())
        .unwrap_or(0)
}

/// Matcher for `needle` on word boundaries, compiled on first use.
fn whole_word_regex(needle: &str) -> Option<Regex> {
    if let Some(re) = WHOLE_WORD_RES.get(needle) {
        return Some(re.clone());
    }

    let pattern = format!(r"\b{}\b", regex::escape(needle));
    match Regex::new(&pattern) {
        Ok(re) => {
            WHOLE_WORD_RES.insert(needle.to_string(), re.clone());
            Some(re)
        }
        Err(e) => {
            // Only reachable if the escaped word blows the regex size limit.
            tracing::warn!("Skipping unmatchable automod word {:?}: {}", needle, e);
            None
        }
    }
}

fn count_blocklist_hits<'a>(lowered: &str, entries: impl IntoIterator<Item = &'a String>) -> u32 {
    let total: usize = entries
        .into_iter()
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .map(|entry| lowered.matches(entry.as_str()).count())
        .sum();
    to_count(total)
}

fn to_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(content: &str) -> RawMessage {
        RawMessage {
            guild_id: 1,
            user_id: 2,
            channel_id: 3,
            message_id: 4,
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            attachment_count: 0,
            author_role_ids: Vec::new(),
        }
    }

    fn bad_word_rule(id: u64, words: &[&str]) -> DetectionRule {
        let mut rule = DetectionRule::new(id, RuleCategory::BadWord, 1, 60);
        rule.words = words.iter().map(|w| w.to_string()).collect();
        rule
    }

    #[test]
    fn test_counts_every_substring_occurrence() {
        let rule = bad_word_rule(7, &["spam"]);
        let record = extract(&message("spam Spam SPAMspam"), &[rule], &Blocklists::default());

        assert_eq!(record.triggered_word_counts[&7], 4);
    }

    #[test]
    fn test_whole_word_ignores_embedded_matches() {
        let mut rule = bad_word_rule(7, &["ass"]);
        rule.match_whole_word = true;

        let record = extract(
            &message("a class assignment, ass! ASS"),
            &[rule],
            &Blocklists::default(),
        );

        assert_eq!(record.triggered_word_counts[&7], 2);
    }

    #[test]
    fn test_whole_word_matcher_is_reused_across_messages() {
        let mut rule = bad_word_rule(7, &["Quokka"]);
        rule.match_whole_word = true;

        let first = extract(&message("quokka quokkas"), &[rule.clone()], &Blocklists::default());
        assert!(WHOLE_WORD_RES.contains_key("quokka"));

        let second = extract(&message("a QUOKKA, quokka"), &[rule], &Blocklists::default());
        assert_eq!(first.triggered_word_counts[&7], 1);
        assert_eq!(second.triggered_word_counts[&7], 2);
    }

    #[test]
    fn test_case_sensitive_rule() {
        let mut rule = bad_word_rule(7, &["Spam"]);
        rule.case_sensitive = true;

        let record = extract(&message("spam Spam SPAM"), &[rule], &Blocklists::default());

        assert_eq!(record.triggered_word_counts[&7], 1);
    }

    #[test]
    fn test_rule_without_words_counts_zero() {
        let rule = bad_word_rule(9, &[]);
        let record = extract(&message("anything at all"), &[rule], &Blocklists::default());

        assert_eq!(record.triggered_word_counts.get(&9), Some(&0));
    }

    #[test]
    fn test_non_bad_word_rules_have_no_word_counts() {
        let rule = DetectionRule::new(3, RuleCategory::Spam, 5, 10);
        let record = extract(&message("spam"), &[rule], &Blocklists::default());

        assert!(record.triggered_word_counts.is_empty());
    }

    #[test]
    fn test_exempt_rules_are_recorded_without_word_counts() {
        let mut exempt_channel = bad_word_rule(1, &["spam"]);
        exempt_channel.exempt_channels.insert(3);
        let mut exempt_role = DetectionRule::new(2, RuleCategory::Spam, 5, 10);
        exempt_role.exempt_roles.insert(40);
        let applies = bad_word_rule(3, &["spam"]);

        let mut msg = message("spam spam");
        msg.author_role_ids = vec![40, 41];
        let record = extract(
            &msg,
            &[exempt_channel, exempt_role, applies],
            &Blocklists::default(),
        );

        assert_eq!(record.exempt_rule_ids, BTreeSet::from([1, 2]));
        assert_eq!(record.triggered_word_counts.get(&1), None);
        assert_eq!(record.triggered_word_counts[&3], 2);
    }

    #[test]
    fn test_basic_counters() {
        let mut msg = message("hi <@123> <@!456> <@&789>\nlook https://a.com and http://b.org\n@everyone");
        msg.attachment_count = 2;

        let record = extract(&msg, &[], &Blocklists::default());

        assert_eq!(record.mention_count, 4);
        assert_eq!(record.newline_count, 2);
        assert_eq!(record.link_count, 2);
        assert_eq!(record.word_count, 9);
        assert_eq!(record.attachment_count, 2);
    }

    #[test]
    fn test_emoji_counts_glyphs_and_custom_tokens() {
        let record = extract(
            &message("nice 😀🔥 <:pog:1234> <a:dance:5678> :notanemoji:"),
            &[],
            &Blocklists::default(),
        );

        assert_eq!(record.emoji_count, 4);
    }

    #[test]
    fn test_blocklist_hits() {
        let blocklists = Blocklists {
            malicious_links: ["evil.example".to_string()].into_iter().collect(),
            phishing_links: ["free-nitro".to_string(), "steamcommunlty".to_string()]
                .into_iter()
                .collect(),
        };

        let record = extract(
            &message("https://EVIL.example/x and https://free-nitro.gift https://free-nitro.gift"),
            &[],
            &blocklists,
        );

        assert_eq!(record.malicious_link_count, 1);
        assert_eq!(record.phishing_link_count, 2);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let rules = vec![bad_word_rule(1, &["foo", "bar"]), bad_word_rule(2, &["baz"])];
        let msg = message("foo bar baz 😀 https://x.y\nfoo");

        let first = extract(&msg, &rules, &Blocklists::default());
        let second = extract(&msg, &rules, &Blocklists::default());

        assert_eq!(first, second);
    }
}
