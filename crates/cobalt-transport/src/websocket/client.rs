//! WebSocket client transport.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use cobalt_core::{
    Connection, DEFAULT_BUFFER, Incoming, Transport, TransportError, TransportResult,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connects to a OneBot forward WebSocket endpoint.
///
/// There is no reconnection: when the socket closes, the connection's inbound
/// stream yields [`Incoming::Closed`] and ends.
#[derive(Debug, Clone)]
pub struct WsClientTransport {
    url: String,
    access_token: Option<String>,
    buffer: usize,
}

impl WsClientTransport {
    /// Creates a transport for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Sends `Authorization: Bearer <token>` during the handshake.
    pub fn access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Capacity of the frame queues.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self) -> TransportResult<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidConfig(format!("{}: {e}", self.url)))?;

        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                TransportError::InvalidConfig(format!("access token is not a valid header: {e}"))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl Transport for WsClientTransport {
    fn name(&self) -> &'static str {
        "ws-client"
    }

    async fn connect(&self) -> TransportResult<Connection> {
        let request = self.request()?;
        info!(url = %self.url, "Connecting to WebSocket server");

        let (ws_stream, _response) =
            connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;
        let (ws_tx, ws_rx) = ws_stream.split();
        info!(url = %self.url, "WebSocket client connected");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.buffer);
        tokio::spawn(run_connection(
            ws_tx,
            ws_rx,
            outbound_rx,
            inbound_tx,
            self.url.clone(),
        ));

        Ok(Connection::new(outbound_tx, inbound_rx))
    }
}

/// Owns the socket: the only writer of outbound frames and the only reader
/// of inbound ones. Sends `Incoming::Closed` exactly once before returning.
async fn run_connection(
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    inbound_tx: mpsc::Sender<Incoming>,
    url: String,
) {
    let reason = loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(data) => {
                    let text = String::from_utf8(data)
                        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
                    trace!(url = %url, len = text.len(), "Sending text");
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(url = %url, error = %e, "Failed to send frame");
                        break Some(e.to_string());
                    }
                }
                None => {
                    debug!(url = %url, "Outbound queue closed, closing socket");
                    let _ = ws_tx.close().await;
                    break None;
                }
            },

            msg = ws_rx.next() => {
                let bytes = match msg {
                    Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Ping(data))) => {
                        trace!(url = %url, "Received ping, sending pong");
                        let _ = ws_tx.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        info!(url = %url, "Server closed connection");
                        break frame.map(|f| f.reason.as_str().to_owned());
                    }
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "WebSocket error");
                        break Some(e.to_string());
                    }
                    None => {
                        info!(url = %url, "WebSocket stream ended");
                        break None;
                    }
                };
                trace!(url = %url, len = bytes.len(), "Received frame");
                if inbound_tx.send(Incoming::Frame(bytes)).await.is_err() {
                    debug!(url = %url, "Reader gone, closing socket");
                    let _ = ws_tx.close().await;
                    break None;
                }
            }
        }
    };

    let _ = inbound_tx.send(Incoming::Closed(reason)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn request_carries_bearer_token() {
        let transport =
            WsClientTransport::new("ws://127.0.0.1:6700").access_token(Some("s3cret".into()));
        let request = transport.request().unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer s3cret");

        let anonymous = WsClientTransport::new("ws://127.0.0.1:6700").access_token(Some(String::new()));
        assert!(anonymous.request().unwrap().headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let transport = WsClientTransport::new("not a url");
        assert!(matches!(transport.request(), Err(TransportError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn frames_flow_both_ways_and_close_is_signalled_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"post_type":"meta_event"}"#.into()))
                .await
                .unwrap();
            let request = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.as_str().to_owned(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected {other:?}"),
                }
            };
            ws.close(None).await.unwrap();
            request
        });

        let transport = WsClientTransport::new(format!("ws://{addr}")).buffer(4);
        let mut connection = transport.connect().await.unwrap();

        assert_eq!(
            connection.inbound.recv().await,
            Some(Incoming::Frame(br#"{"post_type":"meta_event"}"#.to_vec()))
        );
        connection
            .outbound
            .send(br#"{"action":"get_login_info","echo":1}"#.to_vec())
            .await
            .unwrap();

        assert!(matches!(connection.inbound.recv().await, Some(Incoming::Closed(_))));
        assert_eq!(connection.inbound.recv().await, None);
        assert_eq!(
            server.await.unwrap(),
            r#"{"action":"get_login_info","echo":1}"#
        );
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsClientTransport::new(format!("ws://{addr}")).connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed { .. })));
    }
}
