//! The connection driver.
//!
//! One reader task owns the inbound side of a [`Connection`] and is the only
//! place frames are demultiplexed: replies go to the bot's [`ApiCaller`](cobalt_core::ApiCaller),
//! events are preprocessed and handed to the [`Dispatcher`] on their own
//! tasks. The reader never waits on a dispatch, so a handler blocked on a
//! call or a continuation cannot stall the frames that would unblock it.
//!
//! ```text
//! inbound ─▶ Frame::decode ─┬─ Response ─▶ caller.on_incoming_response
//!                           ├─ Event ────▶ preprocess ─▶ dispatcher.spawn
//!                           └─ Err ──────▶ warn, skip
//! Closed / end / cancel ─▶ caller.on_disconnect
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use cobalt_core::{Bot, Connection, EchoApiCaller, Event, EventType, Frame, Incoming};
use cobalt_framework::Dispatcher;

/// Reads one connection until it closes.
pub struct Driver {
    dispatcher: Dispatcher,
    bot: Bot,
}

impl Driver {
    /// Creates a driver dispatching to `dispatcher` on behalf of `bot`.
    pub fn new(dispatcher: Dispatcher, bot: Bot) -> Self {
        Self { dispatcher, bot }
    }

    /// The bot replies are routed to.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Runs the reader loop until the connection closes or `cancel` fires,
    /// returning the close reason.
    ///
    /// Pending calls are failed with `ConnectionClosed` before returning.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<Incoming>,
        cancel: CancellationToken,
    ) -> Option<String> {
        let reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                incoming = inbound.recv() => match incoming {
                    Some(Incoming::Frame(bytes)) => self.handle_frame(&bytes),
                    Some(Incoming::Closed(reason)) => break reason,
                    None => break None,
                },
            }
        };

        debug!(reason = ?reason, "Connection closed, failing pending calls");
        self.bot.caller().on_disconnect();
        reason
    }

    fn handle_frame(&self, bytes: &[u8]) {
        match Frame::decode(bytes) {
            Ok(Frame::Response(response)) => {
                trace!(echo = response.echo, status = %response.status, "API response");
                self.bot.caller().on_incoming_response(response);
            }
            Ok(Frame::Event(event)) => self.handle_event(*event),
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Dropping undecodable frame");
            }
        }
    }

    fn handle_event(&self, mut event: Event) {
        let self_id = match event.self_id {
            0 => self.bot.self_id(),
            id => id,
        };
        event.preprocess(self_id, &self.dispatcher.engine().options().nickname);
        log_event(&event);
        self.dispatcher.spawn(event, self.bot.clone());
    }
}

fn log_event(event: &Event) {
    match event.post_type {
        EventType::Message if event.is_group() => info!(
            group_id = event.group_id,
            user_id = event.user_id,
            sender = %event.sender.as_ref().map(|s| s.name()).unwrap_or_default(),
            message = %event.raw_message,
            "Received group message"
        ),
        EventType::Message => info!(
            user_id = event.user_id,
            sender = %event.sender.as_ref().map(|s| s.name()).unwrap_or_default(),
            message = %event.raw_message,
            "Received private message"
        ),
        EventType::Meta if event.is_heartbeat() => trace!("Heartbeat"),
        _ => debug!(
            post_type = %event.post_type,
            detail_type = %event.detail_type,
            sub_type = %event.sub_type,
            "Received event"
        ),
    }
}

// =============================================================================
// Session
// =============================================================================

/// A running connection: the bot handle plus its reader task.
pub struct Session {
    bot: Bot,
    reader: JoinHandle<Option<String>>,
    cancel: CancellationToken,
}

impl Session {
    /// Wires a connection to `dispatcher` and spawns its reader.
    ///
    /// The outbound queue of `connection` becomes the bot's only writer path.
    pub fn start(connection: Connection, dispatcher: Dispatcher, api_timeout: Duration) -> Self {
        let Connection { outbound, inbound } = connection;
        let caller = Arc::new(EchoApiCaller::new(outbound).with_timeout(api_timeout));
        let bot = Bot::new(caller);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(Driver::new(dispatcher, bot.clone()).run(inbound, cancel.clone()));
        Self {
            bot,
            reader,
            cancel,
        }
    }

    /// The session's bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Waits for the connection to close, returning the reason.
    ///
    /// Resolves once; do not poll it again after it has returned.
    pub async fn closed(&mut self) -> Option<String> {
        match (&mut self.reader).await {
            Ok(reason) => reason,
            Err(e) => Some(format!("reader task failed: {e}")),
        }
    }

    /// Stops reading and fails pending calls.
    ///
    /// Dispatches already spawned keep running.
    pub fn abort(&self) {
        self.cancel.cancel();
        self.bot.caller().on_disconnect();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("bot", &self.bot)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.reader.is_finished())
            .finish()
    }
}
