//! Matchers: handler registrations.
//!
//! A [`Matcher`] binds a handler to a type predicate and an ordered rule list,
//! together with its priority, its *blocking* and *temporary* flags, and a
//! per-matcher [`State`].
//!
//! `Matcher` is a cheap handle around shared data. The handle returned at
//! registration time stays valid after the matcher is stored, so a plugin can
//! later change its priority or delete it:
//!
//! ```rust,ignore
//! let m = engine.on_command(&["debug"]).handle(debug_handler);
//! m.set_priority(-1);
//! m.set_block(true);
//! // ...
//! m.delete();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use cobalt_core::{Event, EventType, State};

use crate::engine::Engine;
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::rule::Rule;
use crate::store::{MatcherStore, StoreShared};

/// Default priority of new matchers.
pub const DEFAULT_PRIORITY: i32 = 0;

static NEXT_MATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique matcher identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatcherId(u64);

impl MatcherId {
    fn next() -> Self {
        Self(NEXT_MATCHER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Flags {
    priority: i32,
    block: bool,
    temp: bool,
}

struct MatcherInner {
    id: MatcherId,
    name: Option<String>,
    post_type: Option<EventType>,
    rules: Vec<Rule>,
    handler: Option<BoxedHandler>,
    flags: RwLock<Flags>,
    state: RwLock<State>,
    /// Set once a temporary matcher has been consumed.
    claimed: AtomicBool,
    store: Mutex<Weak<StoreShared>>,
}

/// A handler registration.
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

impl Matcher {
    /// Starts building a matcher that is not bound to an engine.
    pub fn builder() -> MatcherBuilder {
        MatcherBuilder::new(None)
    }

    /// The matcher's identity.
    pub fn id(&self) -> MatcherId {
        self.inner.id
    }

    /// Optional name used in logs.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Name for logs, falling back to the id.
    pub fn label(&self) -> String {
        match &self.inner.name {
            Some(name) => format!("{name}{}", self.inner.id),
            None => self.inner.id.to_string(),
        }
    }

    /// Event category this matcher accepts, `None` for all.
    pub fn post_type(&self) -> Option<EventType> {
        self.inner.post_type
    }

    /// Evaluates the type predicate.
    pub fn matches_type(&self, event: &Event) -> bool {
        self.inner
            .post_type
            .is_none_or(|post_type| post_type == event.post_type)
    }

    /// The ordered rule list.
    pub fn rules(&self) -> &[Rule] {
        &self.inner.rules
    }

    /// The handler, if any.
    pub fn handler(&self) -> Option<&BoxedHandler> {
        self.inner.handler.as_ref()
    }

    /// Priority; lower runs first.
    pub fn priority(&self) -> i32 {
        self.inner.flags.read().priority
    }

    /// Whether a match stops lower-priority matchers.
    pub fn is_blocking(&self) -> bool {
        self.inner.flags.read().block
    }

    /// Whether the matcher is removed after its first match.
    pub fn is_temp(&self) -> bool {
        self.inner.flags.read().temp
    }

    /// Changes the priority, re-sorting the store the matcher lives in.
    pub fn set_priority(&self, priority: i32) {
        match self.store() {
            Some(store) => store.set_priority(self, priority),
            None => self.inner.flags.write().priority = priority,
        }
    }

    /// Changes the blocking flag.
    pub fn set_block(&self, block: bool) {
        self.inner.flags.write().block = block;
    }

    /// Changes the temporary flag.
    pub fn set_temp(&self, temp: bool) {
        self.inner.flags.write().temp = temp;
    }

    /// A copy of the stored state.
    pub fn state(&self) -> State {
        self.inner.state.read().clone()
    }

    /// Replaces the stored state.
    pub fn set_state(&self, state: State) {
        *self.inner.state.write() = state;
    }

    /// Removes the matcher from its store.
    ///
    /// Returns `false` if it was not stored.
    pub fn delete(&self) -> bool {
        match self.store() {
            Some(store) => store.remove(self),
            None => false,
        }
    }

    /// Returns `true` while the matcher is in a store.
    pub fn is_stored(&self) -> bool {
        self.store().is_some_and(|store| store.contains(self.id()))
    }

    fn store(&self) -> Option<MatcherStore> {
        let shared = self.inner.store.lock().upgrade();
        shared.map(MatcherStore::from_shared)
    }

    pub(crate) fn set_priority_unsynced(&self, priority: i32) {
        self.inner.flags.write().priority = priority;
    }

    pub(crate) fn attach(&self, shared: Weak<StoreShared>) {
        *self.inner.store.lock() = shared;
    }

    pub(crate) fn detach(&self) {
        *self.inner.store.lock() = Weak::new();
    }

    /// Marks a temporary matcher as consumed. Returns `false` if another
    /// dispatch got there first.
    pub(crate) fn claim(&self) -> bool {
        self.inner
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Matcher {}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = *self.inner.flags.read();
        f.debug_struct("Matcher")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("post_type", &self.inner.post_type)
            .field("rules", &self.inner.rules.len())
            .field("priority", &flags.priority)
            .field("block", &flags.block)
            .field("temp", &flags.temp)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Matcher`]s.
///
/// Obtained from the `on_*` family on [`Engine`], or from
/// [`Matcher::builder`] for a detached matcher.
#[must_use = "a matcher does nothing until it is stored"]
pub struct MatcherBuilder {
    engine: Option<Engine>,
    name: Option<String>,
    post_type: Option<EventType>,
    rules: Vec<Rule>,
    handler: Option<BoxedHandler>,
    priority: i32,
    block: bool,
    temp: bool,
    state: State,
}

impl MatcherBuilder {
    pub(crate) fn new(engine: Option<Engine>) -> Self {
        Self {
            engine,
            name: None,
            post_type: None,
            rules: Vec::new(),
            handler: None,
            priority: DEFAULT_PRIORITY,
            block: false,
            temp: false,
            state: State::new(),
        }
    }

    /// Names the matcher for logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restricts the matcher to one event category.
    pub fn on(mut self, post_type: EventType) -> Self {
        self.post_type = Some(post_type);
        self
    }

    /// Appends a rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Appends several rules.
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the blocking flag.
    pub fn block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Sets the temporary flag.
    pub fn temp(mut self, temp: bool) -> Self {
        self.temp = temp;
        self
    }

    /// Sets the initial state.
    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Sets the handler.
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(into_handler(handler));
        self
    }

    /// Sets a pre-boxed handler.
    pub fn handler_boxed(mut self, handler: BoxedHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Builds the matcher without storing it.
    pub fn build(self) -> Matcher {
        self.split().1
    }

    /// Sets the handler and stores the matcher in the bound engine.
    pub fn handle<H: Handler>(self, handler: H) -> Matcher {
        self.handler(handler).store()
    }

    /// Stores the matcher in the bound engine.
    ///
    /// A detached builder just builds.
    pub fn store(self) -> Matcher {
        let (engine, matcher) = self.split();
        match engine {
            Some(engine) => engine.store_matcher(matcher),
            None => {
                debug!(matcher = %matcher.label(), "Matcher built without an engine, not stored");
                matcher
            }
        }
    }

    fn split(self) -> (Option<Engine>, Matcher) {
        let matcher = Matcher {
            inner: Arc::new(MatcherInner {
                id: MatcherId::next(),
                name: self.name,
                post_type: self.post_type,
                rules: self.rules,
                handler: self.handler,
                flags: RwLock::new(Flags {
                    priority: self.priority,
                    block: self.block,
                    temp: self.temp,
                }),
                state: RwLock::new(self.state),
                claimed: AtomicBool::new(false),
                store: Mutex::new(Weak::new()),
            }),
        };
        (self.engine, matcher)
    }
}
