//! The dispatch loop.
//!
//! For one event the [`Dispatcher`]:
//!
//! 1. Snapshots the ordered matcher list.
//! 2. For each matcher, in order:
//!    - skips it if the type predicate fails (no state copy is made),
//!    - copies its state under the store's read lock,
//!    - runs its rules against the copy, skipping it at the first `false`,
//!    - runs its handler with no lock held,
//!    - removes it if it is temporary,
//!    - on [`Response::Reject`], stores a temporary retry matcher for the same
//!      sender carrying the handler's state,
//!    - stops if it is blocking.
//!
//! A panic in any rule or handler is caught at the event boundary and
//! reported as [`FrameworkError::HandlerFault`]; the store and other events
//! are unaffected.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, error, trace};

use cobalt_core::{Bot, Event, EventType, State};

use crate::context::MatcherContext;
use crate::engine::Engine;
use crate::error::{FrameworkError, FrameworkResult};
use crate::handler::Response;
use crate::matcher::Matcher;
use crate::rule::check_user;

/// Summary of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of matchers whose handler ran.
    pub matched: usize,
    /// Whether a blocking matcher ended the pass.
    pub blocked: bool,
}

/// The matcher a pass is inside of, and whether the pass consumed it.
struct Current {
    matcher: Matcher,
    claimed: bool,
}

/// Routes events through an engine's matchers.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    engine: Engine,
}

impl Dispatcher {
    /// Creates a dispatcher over `engine`'s store.
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// The engine being dispatched to.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Dispatches one event on its own task.
    ///
    /// Faults are logged inside [`dispatch`](Self::dispatch).
    pub fn spawn(&self, event: Event, bot: Bot) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.dispatch(Arc::new(event), bot).await;
        })
    }

    /// Runs one dispatch pass.
    ///
    /// # Errors
    /// [`FrameworkError::HandlerFault`] if a rule or handler panicked.
    pub async fn dispatch(&self, event: Arc<Event>, bot: Bot) -> FrameworkResult<DispatchReport> {
        let span = debug_span!(
            "dispatch",
            post_type = %event.post_type,
            detail_type = %event.detail_type,
        );
        let current = Mutex::new(None::<Current>);

        let pass = AssertUnwindSafe(self.run(&event, &bot, &current)).catch_unwind();
        match pass.instrument(span).await {
            Ok(report) => Ok(report),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let Some(Current { matcher, claimed }) = current.lock().take() else {
                    // nothing user-provided runs outside a matcher
                    error!(panic = %message, "Dispatch faulted outside a matcher");
                    return Ok(DispatchReport::default());
                };
                error!(
                    matcher = %matcher.label(),
                    post_type = %event.post_type,
                    user_id = event.user_id,
                    panic = %message,
                    "Handler fault, event abandoned"
                );
                // a temporary is only gone once this pass claimed it
                if claimed {
                    matcher.delete();
                }
                Err(FrameworkError::HandlerFault {
                    matcher: matcher.id(),
                    message,
                })
            }
        }
    }

    async fn run(
        &self,
        event: &Arc<Event>,
        bot: &Bot,
        current: &Mutex<Option<Current>>,
    ) -> DispatchReport {
        let store = self.engine.store();
        let ev: &Event = event;
        let mut report = DispatchReport::default();

        for matcher in store.snapshot() {
            if !matcher.matches_type(ev) {
                continue;
            }
            let Some(mut state) = store.checkout(&matcher) else {
                continue;
            };
            *current.lock() = Some(Current {
                matcher: matcher.clone(),
                claimed: false,
            });

            if !matcher.rules().iter().all(|rule| rule(ev, &mut state)) {
                trace!(matcher = %matcher.label(), "Rules rejected event");
                continue;
            }
            if matcher.is_temp() {
                if !matcher.claim() {
                    continue;
                }
                if let Some(current) = current.lock().as_mut() {
                    current.claimed = true;
                }
            }
            debug!(matcher = %matcher.label(), "Matcher matched");

            let (response, state) = match matcher.handler() {
                Some(handler) => {
                    let ctx = MatcherContext::new(
                        matcher.clone(),
                        event.clone(),
                        state,
                        bot.clone(),
                        self.engine.clone(),
                    );
                    let response = handler.call(ctx.clone()).await;
                    (response, ctx.state_snapshot())
                }
                None => (Response::Success, state),
            };
            report.matched += 1;

            if matcher.is_temp() {
                matcher.delete();
            }
            if response == Response::Reject {
                let retry = self.engine.store_temp_matcher(retry_matcher(&matcher, ev, state));
                debug!(matcher = %matcher.label(), retry = %retry.id(), "Rejected, waiting for retry");
            }
            if matcher.is_blocking() {
                report.blocked = true;
                break;
            }
        }

        *current.lock() = None;
        report
    }
}

/// A temporary matcher re-entering `original`'s handler on the sender's next
/// message.
fn retry_matcher(original: &Matcher, event: &Event, state: State) -> Matcher {
    let mut builder = Matcher::builder()
        .on(EventType::Message)
        .rule(check_user(&[event.user_id]))
        .priority(original.priority())
        .block(original.is_blocking())
        .temp(true)
        .state(state);
    if let Some(name) = original.name() {
        builder = builder.name(name);
    }
    if let Some(handler) = original.handler() {
        builder = builder.handler_boxed(handler.clone());
    }
    builder.build()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{full_match_rule, rule};
    use async_trait::async_trait;
    use cobalt_core::{ApiCaller, ApiResponse, ApiResult};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullCaller;

    #[async_trait]
    impl ApiCaller for NullCaller {
        async fn call(&self, _action: &str, _params: Value) -> ApiResult<ApiResponse> {
            Ok(ApiResponse::ok(0, json!({"message_id": 1})))
        }
    }

    fn bot() -> Bot {
        Bot::new(Arc::new(NullCaller))
    }

    fn msg(user_id: i64, text: &str) -> Arc<Event> {
        Arc::new(Event::message("private", user_id, 0, text))
    }

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> impl Fn(MatcherContext) -> futures::future::Ready<()> + Send + Sync + 'static {
        let log = log.clone();
        move |_ctx| {
            log.lock().push(tag);
            futures::future::ready(())
        }
    }

    #[tokio::test]
    async fn visits_in_priority_order_and_respects_blocking() {
        let engine = Engine::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        engine.on_message().priority(10).block(true).handle(recorder(&log, "b10"));
        engine.on_message().priority(1).handle(recorder(&log, "a1"));
        engine.on_message().priority(10).handle(recorder(&log, "c10"));
        engine.on_message().priority(1).handle(recorder(&log, "d1"));

        let report = engine.dispatcher().dispatch(msg(1, "x"), bot()).await.unwrap();

        assert_eq!(*log.lock(), vec!["a1", "d1", "b10"]);
        assert_eq!(report, DispatchReport { matched: 3, blocked: true });
    }

    #[tokio::test]
    async fn blocking_match_skips_later_rules() {
        let engine = Engine::default();
        let evaluated = Arc::new(AtomicUsize::new(0));

        engine.on_message().priority(0).block(true).store();
        let counter = evaluated.clone();
        engine
            .on_message()
            .priority(1)
            .rule(rule(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }))
            .store();

        engine.dispatcher().dispatch(msg(1, "x"), bot()).await.unwrap();
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ping_scenario_fires_both_in_order() {
        let engine = Engine::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        engine
            .on_message()
            .priority(5)
            .rule(full_match_rule(&["ping"]))
            .handle(recorder(&log, "H"));
        engine
            .on_message()
            .priority(10)
            .block(true)
            .rule(rule(|_, _| true))
            .handle(recorder(&log, "L"));

        engine.dispatcher().dispatch(msg(1, "ping"), bot()).await.unwrap();
        assert_eq!(*log.lock(), vec!["H", "L"]);

        log.lock().clear();
        engine.dispatcher().dispatch(msg(1, "pong"), bot()).await.unwrap();
        assert_eq!(*log.lock(), vec!["L"]);
    }

    #[tokio::test]
    async fn rule_side_effects_reach_the_handler_only() {
        let engine = Engine::default();
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        let m = engine
            .on_message()
            .rule(rule(|_, state| {
                state.insert("found", "yes");
                true
            }))
            .handle(move |ctx: MatcherContext| {
                *sink.lock() = ctx.state().get_str("found").map(str::to_string);
                ctx.set("handler", 1);
                async {}
            });

        engine.dispatcher().dispatch(msg(1, "x"), bot()).await.unwrap();
        assert_eq!(seen.lock().as_deref(), Some("yes"));
        assert!(m.state().is_empty());
    }

    #[tokio::test]
    async fn temp_matcher_is_removed_after_first_match() {
        let engine = Engine::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let m = engine
            .on_message()
            .temp(true)
            .handle(move |_ctx: MatcherContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Response::Finish }
            });

        assert!(m.is_stored());
        engine.dispatcher().dispatch(msg(1, "a"), bot()).await.unwrap();
        assert!(!m.is_stored());
        engine.dispatcher().dispatch(msg(1, "b"), bot()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn temp_matcher_with_failing_rule_stays() {
        let engine = Engine::default();
        let m = engine
            .on_message()
            .temp(true)
            .rule(full_match_rule(&["yes"]))
            .store();

        engine.dispatcher().dispatch(msg(1, "no"), bot()).await.unwrap();
        assert!(m.is_stored());
        engine.dispatcher().dispatch(msg(1, "yes"), bot()).await.unwrap();
        assert!(!m.is_stored());
    }

    #[tokio::test]
    async fn reject_retries_same_user_with_state() {
        let engine = Engine::default();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let log = calls.clone();
        engine
            .on_message()
            .temp(true)
            .rule(rule(|event, _| event.user_id == 1 || event.user_id == 2))
            .handle(move |ctx: MatcherContext| {
                let attempt = ctx.state().extract_or_default::<u32>("attempt").unwrap_or_default() + 1;
                ctx.set("attempt", attempt);
                log.lock().push((ctx.event().user_id, ctx.event().raw_message.clone(), attempt));
                let response = if ctx.event().raw_message == "42" {
                    Response::Success
                } else {
                    Response::Reject
                };
                async move { response }
            });

        let dispatcher = engine.dispatcher();
        dispatcher.dispatch(msg(1, "abc"), bot()).await.unwrap();
        // the original was temporary; only the retry remains
        assert_eq!(engine.store().len(), 1);

        // another user does not trigger the retry
        dispatcher.dispatch(msg(2, "zzz"), bot()).await.unwrap();
        assert_eq!(calls.lock().len(), 1);

        dispatcher.dispatch(msg(1, "xyz"), bot()).await.unwrap();
        dispatcher.dispatch(msg(1, "42"), bot()).await.unwrap();

        assert_eq!(
            *calls.lock(),
            vec![
                (1, "abc".to_string(), 1),
                (1, "xyz".to_string(), 2),
                (1, "42".to_string(), 3),
            ]
        );
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn panicking_rule_is_contained() {
        let engine = Engine::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let bad = engine
            .on_message()
            .rule(rule(|event, _| {
                if event.raw_message == "boom" {
                    panic!("rule exploded");
                }
                false
            }))
            .store();
        let counter = hits.clone();
        engine
            .on_message()
            .priority(1)
            .rule(full_match_rule(&["ok"]))
            .handle(move |_ctx: MatcherContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {}
            });

        let dispatcher = engine.dispatcher();
        let (e1, e2) = tokio::join!(
            dispatcher.dispatch(msg(1, "boom"), bot()),
            dispatcher.dispatch(msg(2, "ok"), bot()),
        );

        match e1 {
            Err(FrameworkError::HandlerFault { matcher, message }) => {
                assert_eq!(matcher, bad.id());
                assert_eq!(message, "rule exploded");
            }
            other => panic!("expected a fault, got {other:?}"),
        }
        assert_eq!(e2.unwrap().matched, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(engine.store().len(), 2);
    }

    #[tokio::test]
    async fn panicking_temp_handler_is_removed() {
        let engine = Engine::default();
        let m = engine
            .on_message()
            .temp(true)
            .handle(|ctx: MatcherContext| async move {
                assert!(ctx.event().raw_message.is_empty(), "handler exploded");
            });

        let result = engine.dispatcher().dispatch(msg(1, "x"), bot()).await;
        assert!(matches!(result, Err(FrameworkError::HandlerFault { .. })));
        assert!(!m.is_stored());
    }

    #[tokio::test]
    async fn rule_fault_keeps_unclaimed_temp_matcher() {
        let engine = Engine::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let m = engine
            .on_message()
            .temp(true)
            .rule(rule(|event, _| {
                if event.raw_message == "boom" {
                    panic!("rule exploded");
                }
                event.raw_message == "yes"
            }))
            .handle(move |_ctx: MatcherContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {}
            });

        let result = engine.dispatcher().dispatch(msg(1, "boom"), bot()).await;
        assert!(matches!(result, Err(FrameworkError::HandlerFault { .. })));
        assert!(m.is_stored());

        engine.dispatcher().dispatch(msg(1, "yes"), bot()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!m.is_stored());
    }

    #[tokio::test]
    async fn handler_may_mutate_the_store() {
        let engine = Engine::default();

        let m = engine.on_message().handle(|ctx: MatcherContext| {
            ctx.engine().on_notice().store();
            ctx.matcher().delete();
            async {}
        });

        let report = engine.dispatcher().dispatch(msg(1, "x"), bot()).await.unwrap();
        assert_eq!(report.matched, 1);
        assert!(!m.is_stored());
        assert_eq!(engine.store().len(), 1);
        assert_eq!(engine.matchers()[0].post_type(), Some(EventType::Notice));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawned_dispatches_run_concurrently() {
        let engine = Engine::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        engine.on_message().handle(move |_ctx: MatcherContext| {
            let counter = counter.clone();
            async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let dispatcher = engine.dispatcher();
        let handles: Vec<_> = (0..16)
            .map(|i| dispatcher.spawn(Event::message("private", i, 0, "x"), bot()))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 16);
    }
}
