//! Rules and the built-in rule library.
//!
//! A [`Rule`] is a predicate over the event and the matcher's per-dispatch
//! [`State`] copy. Rules run in order and the first `false` ends evaluation of
//! that matcher silently. A passing rule may leave captures in the state for
//! later rules and the handler:
//!
//! | Rule | State keys |
//! |------|-----------|
//! | [`prefix_rule`] | `prefix`, `args` |
//! | [`suffix_rule`] | `suffix`, `args` |
//! | [`command_rule`] | `command`, `args` |
//! | [`regex_rule`] | `regex_matched` |
//! | [`keyword_rule`] | `keyword` |
//! | [`full_match_rule`] | `matched` |
//!
//! Text rules look at the first message segment, trimmed, and fail when it is
//! not text. Keyword, full-match and regex rules look at the whole plain text.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use cobalt_core::{Event, EventType, State};

/// A predicate over an event and the matcher's state copy.
pub type Rule = Arc<dyn Fn(&Event, &mut State) -> bool + Send + Sync>;

/// State keys written by the built-in rules.
pub mod keys {
    /// Matched prefix.
    pub const PREFIX: &str = "prefix";
    /// Matched suffix.
    pub const SUFFIX: &str = "suffix";
    /// Matched command name.
    pub const COMMAND: &str = "command";
    /// Text following (or preceding) the matched token.
    pub const ARGS: &str = "args";
    /// Full match followed by capture groups.
    pub const REGEX_MATCHED: &str = "regex_matched";
    /// Matched keyword.
    pub const KEYWORD: &str = "keyword";
    /// Fully matched text.
    pub const MATCHED: &str = "matched";
}

/// Wraps a closure as a [`Rule`].
pub fn rule<F>(f: F) -> Rule
where
    F: Fn(&Event, &mut State) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

fn leading_text(event: &Event) -> Option<&str> {
    event.message.leading_text().map(str::trim)
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Type predicate
// =============================================================================

/// Matches events of the given category.
pub fn type_rule(post_type: EventType) -> Rule {
    rule(move |event, _| event.post_type == post_type)
}

// =============================================================================
// Text rules
// =============================================================================

/// Leading text starts with one of `prefixes`.
pub fn prefix_rule(prefixes: &[&str]) -> Rule {
    let prefixes = owned(prefixes);
    rule(move |event, state| {
        let Some(text) = leading_text(event) else {
            return false;
        };
        for prefix in &prefixes {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                state.insert(keys::PREFIX, prefix.as_str());
                state.insert(keys::ARGS, rest.trim());
                return true;
            }
        }
        false
    })
}

/// Leading text ends with one of `suffixes`.
pub fn suffix_rule(suffixes: &[&str]) -> Rule {
    let suffixes = owned(suffixes);
    rule(move |event, state| {
        let Some(text) = leading_text(event) else {
            return false;
        };
        for suffix in &suffixes {
            if let Some(rest) = text.strip_suffix(suffix.as_str()) {
                state.insert(keys::SUFFIX, suffix.as_str());
                state.insert(keys::ARGS, rest.trim());
                return true;
            }
        }
        false
    })
}

/// Leading text is `command_prefix` followed by one of `commands`.
///
/// The command must be followed by whitespace or the end of the text, so
/// `/echo` does not match `/echoes`.
pub fn command_rule(command_prefix: &str, commands: &[&str]) -> Rule {
    let command_prefix = command_prefix.to_string();
    let commands = owned(commands);
    rule(move |event, state| {
        let Some(text) = leading_text(event) else {
            return false;
        };
        let Some(body) = text.strip_prefix(command_prefix.as_str()) else {
            return false;
        };
        for command in &commands {
            let Some(rest) = body.strip_prefix(command.as_str()) else {
                continue;
            };
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                state.insert(keys::COMMAND, command.as_str());
                state.insert(keys::ARGS, rest.trim_start());
                return true;
            }
        }
        false
    })
}

/// Plain text matches `pattern`.
///
/// # Errors
/// Returns the compile error for an invalid pattern.
pub fn regex_rule(pattern: &str) -> Result<Rule, regex::Error> {
    let regex = Regex::new(pattern)?;
    Ok(rule(move |event, state| {
        let text = event.plain_text();
        let Some(captures) = regex.captures(&text) else {
            return false;
        };
        let groups: Vec<Value> = captures
            .iter()
            .map(|m| Value::from(m.map_or("", |m| m.as_str())))
            .collect();
        state.insert(keys::REGEX_MATCHED, groups);
        true
    }))
}

/// Plain text contains one of `keywords`.
pub fn keyword_rule(keywords: &[&str]) -> Rule {
    let keywords = owned(keywords);
    rule(move |event, state| {
        let text = event.plain_text();
        match keywords.iter().find(|k| text.contains(k.as_str())) {
            Some(keyword) => {
                state.insert(keys::KEYWORD, keyword.as_str());
                true
            }
            None => false,
        }
    })
}

/// Trimmed plain text equals one of `values`.
pub fn full_match_rule(values: &[&str]) -> Rule {
    let values = owned(values);
    rule(move |event, state| {
        let text = event.plain_text();
        let text = text.trim();
        match values.iter().find(|v| v.as_str() == text) {
            Some(value) => {
                state.insert(keys::MATCHED, value.as_str());
                true
            }
            None => false,
        }
    })
}

// =============================================================================
// Session rules
// =============================================================================

/// Event comes from one of `user_ids`.
pub fn check_user(user_ids: &[i64]) -> Rule {
    let user_ids = user_ids.to_vec();
    rule(move |event, _| user_ids.contains(&event.user_id))
}

/// Event comes from one of `group_ids`.
pub fn check_group(group_ids: &[i64]) -> Rule {
    let group_ids = group_ids.to_vec();
    rule(move |event, _| event.group_id != 0 && group_ids.contains(&event.group_id))
}

/// Message is directed at the bot.
pub fn only_to_me() -> Rule {
    rule(|event, _| event.is_to_me)
}

/// Private messages only.
pub fn only_private() -> Rule {
    rule(|event, _| event.is_private())
}

/// Group messages only.
pub fn only_group() -> Rule {
    rule(|event, _| event.is_group())
}

// =============================================================================
// Permission rules
// =============================================================================

fn role_of(event: &Event) -> &str {
    event.sender.as_ref().map_or("", |s| s.role.as_str())
}

/// Sender is a configured super user.
pub fn super_user_permission(super_users: &[i64]) -> Rule {
    check_user(super_users)
}

/// Sender is a group admin, the group owner, or a super user.
pub fn admin_permission(super_users: &[i64]) -> Rule {
    let super_users = super_users.to_vec();
    rule(move |event, _| {
        super_users.contains(&event.user_id) || matches!(role_of(event), "admin" | "owner")
    })
}

/// Sender is the group owner or a super user.
pub fn owner_permission(super_users: &[i64]) -> Rule {
    let super_users = super_users.to_vec();
    rule(move |event, _| super_users.contains(&event.user_id) || role_of(event) == "owner")
}
