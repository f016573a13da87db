//! The context handed to handlers.
//!
//! A [`MatcherContext`] is created once per matched matcher per event. It
//! carries the matcher handle, the event, the dispatch's private copy of the
//! matcher state, the bot and the engine. Cloning it is cheap; every clone
//! sees the same state copy.
//!
//! # Continuations
//!
//! [`MatcherContext::get`] asks the user a question and waits for their next
//! message. It stores a temporary matcher that accepts the next message from
//! the same sender and hands it back through a one-shot channel. The wait is
//! unbounded: it only fails if that temporary matcher is removed before the
//! user answers (for example when the runtime shuts down and clears the
//! store). Dropping the wait, e.g. under `tokio::time::timeout`, removes the
//! temporary matcher again.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use cobalt_core::{ApiResult, Bot, Event, FromState, Message, State, StateResult};

use crate::engine::Engine;
use crate::error::{FrameworkError, FrameworkResult};
use crate::matcher::{Matcher, MatcherId};
use crate::rule::{check_user, keys};
use crate::store::MatcherStore;

/// Per-dispatch handler context.
#[derive(Clone)]
pub struct MatcherContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    matcher: Matcher,
    event: Arc<Event>,
    state: Mutex<State>,
    bot: Bot,
    engine: Engine,
}

impl MatcherContext {
    /// Creates a context.
    pub fn new(matcher: Matcher, event: Arc<Event>, state: State, bot: Bot, engine: Engine) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                matcher,
                event,
                state: Mutex::new(state),
                bot,
                engine,
            }),
        }
    }

    /// The matcher being run.
    pub fn matcher(&self) -> &Matcher {
        &self.inner.matcher
    }

    /// The event being handled.
    pub fn event(&self) -> &Event {
        &self.inner.event
    }

    /// The event being handled, shared.
    pub fn event_arc(&self) -> Arc<Event> {
        self.inner.event.clone()
    }

    /// The bot the event arrived on.
    pub fn bot(&self) -> &Bot {
        &self.inner.bot
    }

    /// The engine the matcher is registered with.
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Locks this dispatch's state copy.
    ///
    /// Do not hold the guard across an `.await`.
    pub fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock()
    }

    /// A copy of this dispatch's state.
    pub fn state_snapshot(&self) -> State {
        self.inner.state.lock().clone()
    }

    /// Sets a value in this dispatch's state.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.state.lock().insert(key, value);
    }

    /// Extracts a typed view of the state.
    pub fn parse<T: FromState>(&self) -> StateResult<T> {
        self.inner.state.lock().parse()
    }

    /// The `args` capture left by a prefix, suffix or command rule, or `""`.
    pub fn arg(&self) -> String {
        self.inner
            .state
            .lock()
            .get_str(keys::ARGS)
            .unwrap_or_default()
            .to_string()
    }

    /// Replies to the conversation the event came from.
    pub async fn send(&self, message: impl Into<Message>) -> ApiResult<i64> {
        self.inner.bot.send(&self.inner.event, message).await
    }

    /// Sends `prompt` (unless empty) and waits for the sender's next message,
    /// returning its raw text.
    pub async fn get(&self, prompt: impl Into<Message>) -> FrameworkResult<String> {
        let event = self.get_event(prompt).await?;
        Ok(event.raw_message.clone())
    }

    /// Like [`get`](Self::get), returning the whole follow-up event.
    ///
    /// # Errors
    /// [`FrameworkError::Api`] if the prompt cannot be sent,
    /// [`FrameworkError::ContinuationClosed`] if the waiting matcher is removed
    /// before a reply arrives.
    pub async fn get_event(&self, prompt: impl Into<Message>) -> FrameworkResult<Arc<Event>> {
        let prompt = prompt.into();
        let (tx, rx) = oneshot::channel::<Arc<Event>>();
        let slot = Mutex::new(Some(tx));

        let id = {
            let waiter = self
                .inner
                .engine
                .on_message()
                .rule(check_user(&[self.inner.event.user_id]))
                .priority(self.inner.matcher.priority())
                .block(self.inner.matcher.is_blocking())
                .temp(true)
                .handle(move |ctx: MatcherContext| {
                    let sender = slot.lock().take();
                    async move {
                        if let Some(tx) = sender {
                            let _ = tx.send(ctx.event_arc());
                        }
                    }
                });
            waiter.id()
        };
        debug!(
            matcher = %self.inner.matcher.label(),
            waiter = %id,
            user_id = self.inner.event.user_id,
            "Waiting for follow-up message"
        );

        let mut guard = WaiterGuard {
            store: self.inner.engine.store().clone(),
            id: Some(id),
        };

        if !prompt.is_empty() {
            self.send(prompt).await?;
        }

        let event = rx.await.map_err(|_| FrameworkError::ContinuationClosed)?;
        guard.id = None;
        Ok(event)
    }
}

/// Removes a continuation's waiter unless it has delivered.
struct WaiterGuard {
    store: MatcherStore,
    id: Option<MatcherId>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if self.store.remove_by_id(id) {
                debug!(waiter = %id, "Dropped continuation waiter");
            }
        }
    }
}

impl std::fmt::Debug for MatcherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatcherContext")
            .field("matcher", &self.inner.matcher.id())
            .field("post_type", &self.inner.event.post_type)
            .field("user_id", &self.inner.event.user_id)
            .finish_non_exhaustive()
    }
}
