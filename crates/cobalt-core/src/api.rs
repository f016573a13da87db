//! Wire frames exchanged with the gateway.
//!
//! Outbound, the bot only ever writes [`ApiRequest`]s. Inbound, a frame is
//! either a reply to one of those requests (it carries the request's `echo`)
//! or an event. [`Frame::decode`] is the single place that tells them apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult, DecodeError, DecodeResult};
use crate::event::Event;

// =============================================================================
// Outbound
// =============================================================================

/// A request to invoke a gateway action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Action name, e.g. `send_group_msg`.
    pub action: String,
    /// Action parameters.
    pub params: Value,
    /// Correlation id, echoed back by the gateway in the reply.
    pub echo: u64,
}

impl ApiRequest {
    /// Creates a request.
    pub fn new(action: impl Into<String>, params: Value, echo: u64) -> Self {
        Self {
            action: action.into(),
            params,
            echo,
        }
    }

    /// Serializes the request into a text frame.
    pub fn encode(&self) -> ApiResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// A reply to an [`ApiRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    /// `ok`, `async` or `failed`.
    pub status: String,
    /// Return code, `0` on success.
    pub retcode: i64,
    /// Response payload.
    pub data: Value,
    /// Error message.
    pub msg: String,
    /// Human readable error description.
    pub wording: String,
    /// Correlation id copied from the request.
    #[serde(skip)]
    pub echo: u64,
}

impl ApiResponse {
    /// Creates a successful reply, mostly useful in tests.
    pub fn ok(echo: u64, data: Value) -> Self {
        Self {
            status: "ok".into(),
            retcode: 0,
            data,
            echo,
            ..Default::default()
        }
    }

    /// Returns `true` if the gateway reports success.
    pub fn is_ok(&self) -> bool {
        self.status != "failed" && (self.retcode == 0 || self.retcode == 1)
    }

    /// Converts the reply into its payload, or [`ApiError::Failed`].
    pub fn into_result(self) -> ApiResult<Value> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            let message = if self.wording.is_empty() {
                self.msg
            } else {
                self.wording
            };
            Err(ApiError::Failed {
                retcode: self.retcode,
                message,
            })
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A reply to an outstanding call.
    Response(ApiResponse),
    /// An event.
    Event(Box<Event>),
}

impl Frame {
    /// Decodes one text frame.
    ///
    /// Any frame carrying a non-null `echo` is a reply. Everything else must be
    /// an event with a known `post_type`.
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Utf8(e.to_string()))?;
        let value: Value = serde_json::from_str(text)?;

        if !value.is_object() {
            return Err(DecodeError::Json("frame is not a JSON object".into()));
        }

        match value.get("echo") {
            Some(echo) if !echo.is_null() => {
                let echo = parse_echo(echo)
                    .ok_or_else(|| DecodeError::Json(format!("unrecognized echo {echo}")))?;
                let mut response: ApiResponse = serde_json::from_value(value)?;
                response.echo = echo;
                Ok(Self::Response(response))
            }
            _ => Ok(Self::Event(Box::new(Event::from_value(value)?))),
        }
    }
}

fn parse_echo(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use serde_json::json;

    #[test]
    fn request_encodes_action_params_and_echo() {
        let req = ApiRequest::new("send_private_msg", json!({"user_id": 1}), 7);
        let value: Value = serde_json::from_slice(&req.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"action": "send_private_msg", "params": {"user_id": 1}, "echo": 7})
        );
    }

    #[test]
    fn frames_with_echo_are_replies() {
        let frame = Frame::decode(br#"{"status":"ok","retcode":0,"data":{"message_id":5},"echo":"12"}"#)
            .unwrap();
        let Frame::Response(resp) = frame else {
            panic!("expected a response");
        };
        assert_eq!(resp.echo, 12);
        assert_eq!(resp.into_result().unwrap(), json!({"message_id": 5}));
    }

    #[test]
    fn frames_without_echo_are_events() {
        let frame = Frame::decode(
            br#"{"post_type":"meta_event","meta_event_type":"heartbeat","echo":null}"#,
        )
        .unwrap();
        let Frame::Event(ev) = frame else {
            panic!("expected an event");
        };
        assert_eq!(ev.post_type, EventType::Meta);
        assert!(ev.is_heartbeat());
    }

    #[test]
    fn failed_reply_maps_to_api_error() {
        let resp = ApiResponse {
            status: "failed".into(),
            retcode: 100,
            msg: "bad".into(),
            wording: "group not found".into(),
            ..Default::default()
        };
        assert!(matches!(
            resp.into_result(),
            Err(ApiError::Failed { retcode: 100, message }) if message == "group not found"
        ));
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        assert!(matches!(Frame::decode(&[0xff, 0xfe]), Err(DecodeError::Utf8(_))));
        assert!(matches!(Frame::decode(b"{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(Frame::decode(b"[1,2]"), Err(DecodeError::Json(_))));
        assert!(matches!(
            Frame::decode(br#"{"post_type":"weird"}"#),
            Err(DecodeError::UnknownPostType(_))
        ));
    }
}
