//! The registration API.
//!
//! An [`Engine`] owns one [`MatcherStore`] and the bot-wide options the
//! built-in rules need (command prefix, super users). Plugins register
//! matchers through it:
//!
//! ```rust,ignore
//! engine.on_command(&["echo"]).block(true).handle(|ctx: MatcherContext| async move {
//!     let _ = ctx.send(ctx.arg()).await;
//! });
//! ```

use std::sync::Arc;

use tracing::info;

use cobalt_core::EventType;

use crate::dispatcher::Dispatcher;
use crate::matcher::{Matcher, MatcherBuilder};
use crate::plugin::Plugin;
use crate::rule;
use crate::store::MatcherStore;

/// Bot-wide options consulted by rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Names that address the bot at the start of a message.
    pub nickname: Vec<String>,
    /// Prefix of commands, `/` by default.
    pub command_prefix: String,
    /// User ids with super user permission.
    pub super_users: Vec<i64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            nickname: Vec::new(),
            command_prefix: "/".to_string(),
            super_users: Vec::new(),
        }
    }
}

/// Matcher registration entry point.
#[derive(Clone, Default)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

#[derive(Default)]
struct EngineInner {
    store: MatcherStore,
    options: Options,
}

impl Engine {
    /// Creates an engine with the given options and an empty store.
    pub fn new(options: Options) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: MatcherStore::new(),
                options,
            }),
        }
    }

    /// The engine's options.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// The engine's store.
    pub fn store(&self) -> &MatcherStore {
        &self.inner.store
    }

    /// A dispatcher walking this engine's store.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.clone())
    }

    /// The current ordered matcher list.
    pub fn matchers(&self) -> Vec<Matcher> {
        self.inner.store.snapshot()
    }

    /// Removes every matcher.
    pub fn clear(&self) -> usize {
        self.inner.store.clear()
    }

    /// Stores a built matcher.
    pub fn store_matcher(&self, matcher: Matcher) -> Matcher {
        self.inner.store.insert(&matcher);
        matcher
    }

    /// Stores a built matcher as temporary.
    pub fn store_temp_matcher(&self, matcher: Matcher) -> Matcher {
        matcher.set_temp(true);
        self.store_matcher(matcher)
    }

    /// Logs a plugin's info and starts it.
    ///
    /// # Errors
    /// Whatever the plugin's `start` returns.
    pub fn start_plugin(&self, plugin: &dyn Plugin) -> anyhow::Result<()> {
        let info = plugin.info();
        info!(
            name = %info.name,
            author = %info.author,
            version = %info.version,
            details = %info.details,
            "Loading plugin"
        );
        plugin.start(self)
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Matcher for every event category.
    pub fn on_any(&self) -> MatcherBuilder {
        MatcherBuilder::new(Some(self.clone()))
    }

    /// Matcher for one event category.
    pub fn on(&self, post_type: EventType) -> MatcherBuilder {
        self.on_any().on(post_type)
    }

    /// Matcher for message events.
    pub fn on_message(&self) -> MatcherBuilder {
        self.on(EventType::Message)
    }

    /// Matcher for notice events.
    pub fn on_notice(&self) -> MatcherBuilder {
        self.on(EventType::Notice)
    }

    /// Matcher for request events.
    pub fn on_request(&self) -> MatcherBuilder {
        self.on(EventType::Request)
    }

    /// Matcher for meta events.
    pub fn on_meta_event(&self) -> MatcherBuilder {
        self.on(EventType::Meta)
    }

    /// Messages starting with `prefix`.
    pub fn on_prefix(&self, prefix: &str) -> MatcherBuilder {
        self.on_prefix_group(&[prefix])
    }

    /// Messages starting with one of `prefixes`.
    pub fn on_prefix_group(&self, prefixes: &[&str]) -> MatcherBuilder {
        self.on_message().rule(rule::prefix_rule(prefixes))
    }

    /// Messages ending with `suffix`.
    pub fn on_suffix(&self, suffix: &str) -> MatcherBuilder {
        self.on_suffix_group(&[suffix])
    }

    /// Messages ending with one of `suffixes`.
    pub fn on_suffix_group(&self, suffixes: &[&str]) -> MatcherBuilder {
        self.on_message().rule(rule::suffix_rule(suffixes))
    }

    /// `<command_prefix><command>` messages.
    pub fn on_command(&self, command: &str) -> MatcherBuilder {
        self.on_command_group(&[command])
    }

    /// `<command_prefix><command>` messages for any of `commands`.
    pub fn on_command_group(&self, commands: &[&str]) -> MatcherBuilder {
        let prefix = self.inner.options.command_prefix.clone();
        self.on_message().rule(rule::command_rule(&prefix, commands))
    }

    /// Messages matching a regular expression.
    ///
    /// # Errors
    /// The compile error of an invalid pattern.
    pub fn on_regex(&self, pattern: &str) -> Result<MatcherBuilder, regex::Error> {
        Ok(self.on_message().rule(rule::regex_rule(pattern)?))
    }

    /// Messages containing `keyword`.
    pub fn on_keyword(&self, keyword: &str) -> MatcherBuilder {
        self.on_keyword_group(&[keyword])
    }

    /// Messages containing one of `keywords`.
    pub fn on_keyword_group(&self, keywords: &[&str]) -> MatcherBuilder {
        self.on_message().rule(rule::keyword_rule(keywords))
    }

    /// Messages equal to `text`.
    pub fn on_full_match(&self, text: &str) -> MatcherBuilder {
        self.on_full_match_group(&[text])
    }

    /// Messages equal to one of `texts`.
    pub fn on_full_match_group(&self, texts: &[&str]) -> MatcherBuilder {
        self.on_message().rule(rule::full_match_rule(texts))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.inner.options)
            .field("matchers", &self.inner.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobalt_core::{Event, State};

    #[test]
    fn registration_family_sets_type_and_rule() {
        let engine = Engine::default();
        let m = engine.on_command("echo").priority(3).store();

        assert_eq!(m.post_type(), Some(EventType::Message));
        assert_eq!(m.rules().len(), 1);
        assert!(m.is_stored());
        assert_eq!(engine.matchers(), vec![m.clone()]);

        let mut state = State::new();
        let event = Event::message("private", 1, 0, "/echo hi");
        assert!((m.rules()[0])(&event, &mut state));
        assert_eq!(state.get_str("args"), Some("hi"));
    }

    #[test]
    fn command_prefix_comes_from_options() {
        let engine = Engine::new(Options {
            command_prefix: "!".into(),
            ..Default::default()
        });
        let m = engine.on_command("echo").build();
        let event = Event::message("private", 1, 0, "/echo");
        assert!(!(m.rules()[0])(&event, &mut State::new()));
        let event = Event::message("private", 1, 0, "!echo");
        assert!((m.rules()[0])(&event, &mut State::new()));
    }

    #[test]
    fn store_temp_and_delete() {
        let engine = Engine::default();
        let m = engine.store_temp_matcher(Matcher::builder().build());
        assert!(m.is_temp());
        assert_eq!(engine.store().len(), 1);
        assert!(m.delete());
        assert!(engine.store().is_empty());
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let engine = Engine::default();
        assert!(engine.on_regex("[").is_err());
        assert!(engine.on_regex(r"^\d+$").is_ok());
    }
}
