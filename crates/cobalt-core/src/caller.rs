//! The call/response gateway.
//!
//! # Overview
//!
//! Outbound calls are written to the connection's single outbound queue and
//! their replies come back interleaved with events on the inbound stream. The
//! [`EchoApiCaller`] tags each request with a fresh echo id, parks the caller on
//! a one-shot channel in its [`CorrelationTable`], and is fed replies by the
//! inbound reader through [`ApiCaller::on_incoming_response`].
//!
//! | Outcome | Result |
//! |---------|--------|
//! | Reply with matching echo | `Ok(ApiResponse)` |
//! | No reply within the bound | [`ApiError::Timeout`], entry removed, late reply dropped |
//! | Connection closed first | [`ApiError::ConnectionClosed`] |
//! | Caller dropped mid-call | entry removed |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::api::{ApiRequest, ApiResponse};
use crate::correlation::CorrelationTable;
use crate::error::{ApiError, ApiResult};

/// Default bound on a single call.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ApiCaller trait
// =============================================================================

/// Transport-facing API call mechanism.
///
/// [`Bot`](crate::Bot) holds an `Arc<dyn ApiCaller>` and never sees the
/// connection directly.
#[async_trait]
pub trait ApiCaller: Send + Sync {
    /// Makes a call and waits for its reply.
    ///
    /// # Errors
    /// [`ApiError::Timeout`] if no reply arrives in time,
    /// [`ApiError::ConnectionClosed`] if the connection goes away first.
    async fn call(&self, action: &str, params: Value) -> ApiResult<ApiResponse>;

    /// Routes an inbound reply to its waiting caller.
    ///
    /// Returns `true` if a waiter was registered for the reply's echo.
    fn on_incoming_response(&self, _response: ApiResponse) -> bool {
        false
    }

    /// Called once when the connection is closed. Pending calls must fail
    /// with [`ApiError::ConnectionClosed`].
    fn on_disconnect(&self) {}
}

// =============================================================================
// EchoApiCaller
// =============================================================================

/// [`ApiCaller`] for full-duplex frame transports.
///
/// Each [`call`](ApiCaller::call):
/// 1. Allocates an echo id and encodes `{action, params, echo}`.
/// 2. Registers a one-shot channel for that id before sending, so a reply
///    that beats the caller to the await point is never lost.
/// 3. Pushes the frame onto the outbound queue.
/// 4. Waits on the channel for at most the configured timeout.
pub struct EchoApiCaller {
    outbound: mpsc::Sender<Vec<u8>>,
    table: Arc<CorrelationTable>,
    api_timeout: Duration,
}

impl EchoApiCaller {
    /// Creates a caller writing to `outbound`, with the default 30 s bound.
    pub fn new(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            outbound,
            table: Arc::new(CorrelationTable::new()),
            api_timeout: DEFAULT_API_TIMEOUT,
        }
    }

    /// Overrides the call bound.
    pub fn with_timeout(mut self, api_timeout: Duration) -> Self {
        self.api_timeout = api_timeout;
        self
    }

    /// The configured call bound.
    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    /// The underlying correlation table.
    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }
}

#[async_trait]
impl ApiCaller for EchoApiCaller {
    async fn call(&self, action: &str, params: Value) -> ApiResult<ApiResponse> {
        let echo = self.table.allocate();
        let frame = ApiRequest::new(action, params, echo).encode()?;

        let (tx, mut rx) = oneshot::channel();
        self.table.register(echo, tx);
        let _pending = PendingCall {
            table: &self.table,
            echo,
        };

        debug!(action = %action, echo = %echo, "Calling API");

        if self.outbound.send(frame).await.is_err() {
            warn!(action = %action, echo = %echo, "Outbound queue closed");
            return Err(ApiError::ConnectionClosed);
        }

        match timeout(self.api_timeout, &mut rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ApiError::ConnectionClosed),
            Err(_) => {
                let result = settle_timed_out(&self.table, echo, &mut rx);
                if result.is_err() {
                    debug!(action = %action, echo = %echo, "API call timed out");
                }
                result
            }
        }
    }

    fn on_incoming_response(&self, response: ApiResponse) -> bool {
        let echo = response.echo;
        self.table.resolve(echo, response)
    }

    fn on_disconnect(&self) {
        self.table.close_all();
    }
}

/// Abandons a call's entry when the call ends, however it ends.
struct PendingCall<'a> {
    table: &'a CorrelationTable,
    echo: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.table.abandon(self.echo);
    }
}

/// Removes a timed-out entry, keeping a reply resolved as the timer fired.
fn settle_timed_out(
    table: &CorrelationTable,
    echo: u64,
    rx: &mut oneshot::Receiver<ApiResponse>,
) -> ApiResult<ApiResponse> {
    if !table.abandon(echo) {
        if let Ok(response) = rx.try_recv() {
            return Ok(response);
        }
    }
    Err(ApiError::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller() -> (Arc<EchoApiCaller>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(EchoApiCaller::new(tx)), rx)
    }

    async fn next_request(rx: &mut mpsc::Receiver<Vec<u8>>) -> ApiRequest {
        let bytes = rx.recv().await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn reply_with_matching_echo_completes_call() {
        let (caller, mut rx) = caller();

        let task = {
            let caller = caller.clone();
            tokio::spawn(async move { caller.call("get_login_info", json!({})).await })
        };

        let request = next_request(&mut rx).await;
        assert_eq!(request.action, "get_login_info");
        assert!(caller.on_incoming_response(ApiResponse::ok(request.echo, json!({"user_id": 10}))));

        let response = task.await.unwrap().unwrap();
        assert_eq!(response.data, json!({"user_id": 10}));
        assert!(caller.table().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_reply_times_out_and_late_reply_is_dropped() {
        let (caller, mut rx) = caller();

        let task = {
            let caller = caller.clone();
            tokio::spawn(async move { caller.call("send_msg", json!({"message": "hi"})).await })
        };
        let request = next_request(&mut rx).await;

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ApiError::Timeout)));
        assert!(!caller.table().contains(request.echo));
        assert!(!caller.on_incoming_response(ApiResponse::ok(request.echo, Value::Null)));
    }

    #[tokio::test]
    async fn disconnect_fails_pending_calls() {
        let (caller, mut rx) = caller();

        let task = {
            let caller = caller.clone();
            tokio::spawn(async move { caller.call("get_status", Value::Null).await })
        };
        next_request(&mut rx).await;
        caller.on_disconnect();

        assert!(matches!(task.await.unwrap(), Err(ApiError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn cancelled_call_removes_its_entry() {
        let (caller, mut rx) = caller();

        let task = {
            let caller = caller.clone();
            tokio::spawn(async move { caller.call("get_status", Value::Null).await })
        };
        let request = next_request(&mut rx).await;
        assert!(caller.table().contains(request.echo));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(caller.table().is_empty());
    }

    #[test]
    fn reply_racing_the_timer_is_kept() {
        let table = CorrelationTable::new();
        let (echo, mut rx) = table.open();
        assert!(table.resolve(echo, ApiResponse::ok(echo, json!({"ok": true}))));

        let response = settle_timed_out(&table, echo, &mut rx).unwrap();
        assert_eq!(response.data, json!({"ok": true}));

        let (echo, mut rx) = table.open();
        assert!(matches!(
            settle_timed_out(&table, echo, &mut rx),
            Err(ApiError::Timeout)
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn closed_outbound_queue_fails_fast() {
        let (caller, rx) = caller();
        drop(rx);

        let result = caller.call("get_status", Value::Null).await;
        assert!(matches!(result, Err(ApiError::ConnectionClosed)));
        assert!(caller.table().is_empty());
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_independently() {
        let (caller, mut rx) = caller();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let caller = caller.clone();
                tokio::spawn(async move { caller.call("echo", json!({"n": i})).await })
            })
            .collect();

        let mut requests = Vec::new();
        for _ in 0..8 {
            requests.push(next_request(&mut rx).await);
        }
        // answer in reverse order
        for req in requests.iter().rev() {
            caller.on_incoming_response(ApiResponse::ok(req.echo, req.params.clone()));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let response = task.await.unwrap().unwrap();
            assert_eq!(response.data, json!({"n": i}));
        }
    }
}
