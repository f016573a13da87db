//! Handlers and their dispositions.
//!
//! Any `Fn(MatcherContext) -> impl Future` whose output implements
//! [`IntoResponse`] is a [`Handler`]:
//!
//! ```rust,ignore
//! async fn ping(ctx: MatcherContext) {
//!     let _ = ctx.send("pong").await;
//! }
//!
//! async fn age(ctx: MatcherContext) -> Response {
//!     match ctx.arg().parse::<u8>() {
//!         Ok(_) => Response::Success,
//!         Err(_) => Response::Reject,
//!     }
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::warn;

use crate::context::MatcherContext;

/// What the dispatch loop should do once a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Response {
    /// Done.
    #[default]
    Success,
    /// Malformed input: the next message from the same user re-enters the
    /// same handler with the same state.
    Reject,
    /// Stop the current conversation without re-prompting.
    Finish,
}

/// Conversion of handler return values into a [`Response`].
pub trait IntoResponse {
    /// Performs the conversion.
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::Success
    }
}

/// `Err` finishes the conversation and is logged.
impl<T: IntoResponse, E: Display> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(e) => {
                warn!(error = %e, "Handler returned an error");
                Response::Finish
            }
        }
    }
}

/// An event handler.
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler.
    fn call(&self, ctx: MatcherContext) -> BoxFuture<'static, Response>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(MatcherContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, ctx: MatcherContext) -> BoxFuture<'static, Response> {
        let fut = (self)(ctx);
        async move { fut.await.into_response() }.boxed()
    }
}

/// A type-erased, shareable handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Boxes a handler.
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}
