//! Event model for the Cobalt framework.
//!
//! An [`Event`] is one inbound occurrence pushed by the gateway. It is built
//! once by the codec, preprocessed once by the driver, and is immutable for the
//! rest of its dispatch pass: handlers receive it behind an `Arc`.
//!
//! # Categories
//!
//! ```text
//! post_type      detail_type source
//! ─────────────  ──────────────────
//! message     →  message_type     (private, group)
//! notice      →  notice_type      (group_increase, friend_recall, ...)
//! request     →  request_type     (friend, group)
//! meta_event  →  meta_event_type  (lifecycle, heartbeat)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, DecodeResult};
use crate::message::Message;

// ============================================================================
// Event Type Classification
// ============================================================================

/// Classification of event types.
///
/// This is the category used by type predicates such as `on_message()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Message events (private messages, group messages).
    Message,
    /// Notice events (group changes, recalls, friend adds, ...).
    Notice,
    /// Request events (friend requests, group join requests).
    Request,
    /// Meta events (lifecycle, heartbeat).
    #[serde(rename = "meta_event")]
    Meta,
}

impl EventType {
    /// Returns the wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Notice => "notice",
            Self::Request => "request",
            Self::Meta => "meta_event",
        }
    }
}

impl FromStr for EventType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" | "message_sent" => Ok(Self::Message),
            "notice" => Ok(Self::Notice),
            "request" => Ok(Self::Request),
            "meta_event" | "meta" => Ok(Self::Meta),
            other => Err(DecodeError::UnknownPostType(other.to_string())),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Message sender information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
    /// User ID.
    pub user_id: i64,
    /// Nickname.
    pub nickname: String,
    /// Gender ("male", "female", "unknown").
    pub sex: String,
    /// Age.
    pub age: i32,
    /// Area.
    pub area: String,
    /// Group card (group nickname).
    pub card: String,
    /// Group title.
    pub title: String,
    /// Membership level.
    pub level: String,
    /// Group role ("owner", "admin", "member").
    pub role: String,
    /// Anonymous identity in a group, filled from the event's `anonymous`.
    pub anonymous_id: i64,
    /// Anonymous display name.
    pub anonymous_name: String,
    /// Anonymous flag, needed to mute an anonymous member.
    pub anonymous_flag: String,
}

impl Sender {
    /// Returns the best display name: anonymous name, card, nickname, then
    /// the id.
    pub fn name(&self) -> String {
        if !self.anonymous_name.is_empty() {
            self.anonymous_name.clone()
        } else if !self.card.is_empty() {
            self.card.clone()
        } else if !self.nickname.is_empty() {
            self.nickname.clone()
        } else {
            self.user_id.to_string()
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.title.is_empty() {
            write!(f, "[{}]", self.title)?;
        }
        f.write_str(&self.name())
    }
}

// ============================================================================
// Wire envelope
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventEnvelope {
    time: i64,
    self_id: i64,
    post_type: String,
    message_type: String,
    notice_type: String,
    request_type: String,
    meta_event_type: String,
    sub_type: String,
    message_id: i64,
    group_id: i64,
    user_id: i64,
    operator_id: i64,
    raw_message: String,
    message: Value,
    sender: Option<Sender>,
    anonymous: Option<Anonymous>,
    flag: String,
    comment: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Anonymous {
    id: i64,
    name: String,
    flag: String,
}

// ============================================================================
// Event
// ============================================================================

/// One decoded inbound event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unix timestamp reported by the gateway.
    pub time: i64,
    /// The bot account the event was delivered to.
    pub self_id: i64,
    /// Event category.
    pub post_type: EventType,
    /// Category-specific detail (`private`, `group`, `group_increase`, ...).
    pub detail_type: String,
    /// Sub-type within the detail type.
    pub sub_type: String,
    /// Message ID (message events only).
    pub message_id: i64,
    /// Originating group, `0` when absent.
    pub group_id: i64,
    /// Originating user, `0` when absent.
    pub user_id: i64,
    /// Operator (notice events only).
    pub operator_id: i64,
    /// Raw message text.
    pub raw_message: String,
    /// Parsed message segments.
    pub message: Message,
    /// Sender information, when the gateway provides it.
    pub sender: Option<Sender>,
    /// Request flag (request events only).
    pub flag: String,
    /// Request comment (request events only).
    pub comment: String,
    /// Whether the message is directed at the bot.
    pub is_to_me: bool,
    /// The full decoded JSON of the frame.
    pub raw: Arc<Value>,
}

impl Event {
    /// Builds an event from a decoded frame.
    pub fn from_value(value: Value) -> DecodeResult<Self> {
        let envelope: EventEnvelope = serde_json::from_value(value.clone())?;
        let post_type: EventType = envelope.post_type.parse()?;

        let detail_type = match post_type {
            EventType::Message => envelope.message_type,
            EventType::Notice => envelope.notice_type,
            EventType::Request => envelope.request_type,
            EventType::Meta => envelope.meta_event_type,
        };

        let message = if post_type == EventType::Message {
            Message::from_value(&envelope.message)
        } else {
            Message::default()
        };

        let mut sender = envelope.sender;
        if let Some(anonymous) = envelope.anonymous {
            let sender = sender.get_or_insert_with(|| Sender {
                user_id: envelope.user_id,
                ..Default::default()
            });
            sender.anonymous_id = anonymous.id;
            sender.anonymous_name = anonymous.name;
            sender.anonymous_flag = anonymous.flag;
        }

        Ok(Self {
            time: envelope.time,
            self_id: envelope.self_id,
            post_type,
            detail_type,
            sub_type: envelope.sub_type,
            message_id: envelope.message_id,
            group_id: envelope.group_id,
            user_id: envelope.user_id,
            operator_id: envelope.operator_id,
            raw_message: envelope.raw_message,
            message,
            sender,
            flag: envelope.flag,
            comment: envelope.comment,
            is_to_me: false,
            raw: Arc::new(value),
        })
    }

    /// Creates a minimal message event, mostly useful in tests and demos.
    pub fn message(detail_type: &str, user_id: i64, group_id: i64, text: &str) -> Self {
        Self {
            time: 0,
            self_id: 0,
            post_type: EventType::Message,
            detail_type: detail_type.to_string(),
            sub_type: String::new(),
            message_id: 0,
            group_id,
            user_id,
            operator_id: 0,
            raw_message: text.to_string(),
            message: Message::from(text),
            sender: Some(Sender {
                user_id,
                ..Default::default()
            }),
            flag: String::new(),
            comment: String::new(),
            is_to_me: false,
            raw: Arc::new(Value::Null),
        }
    }

    /// Returns `true` for group messages.
    pub fn is_group(&self) -> bool {
        self.post_type == EventType::Message && self.detail_type == "group"
    }

    /// Returns `true` for private messages.
    pub fn is_private(&self) -> bool {
        self.post_type == EventType::Message && self.detail_type == "private"
    }

    /// Returns `true` for heartbeat meta events.
    pub fn is_heartbeat(&self) -> bool {
        self.post_type == EventType::Meta && self.detail_type == "heartbeat"
    }

    /// Concatenated text of the parsed message.
    pub fn plain_text(&self) -> String {
        self.message.plain_text()
    }

    /// Derives `is_to_me` and normalizes the leading text segment.
    ///
    /// A message is directed at the bot when it is private, when an `at`
    /// segment targets `self_id` (that segment is removed), or when the leading
    /// text starts with one of `nicknames` (the nickname is stripped). The
    /// leading text is left-trimmed in every case.
    ///
    /// Private messages are treated as directed at the bot outright; a
    /// mention or nickname is what marks a group message, and in upstream
    /// OneBot frameworks those two are the only signals, private or not.
    pub fn preprocess(&mut self, self_id: i64, nicknames: &[String]) {
        if self.post_type != EventType::Message {
            return;
        }
        self.is_to_me = self.detail_type == "private";

        let target = self_id.to_string();
        let at_me = self
            .message
            .0
            .iter()
            .position(|seg| seg.kind == "at" && seg.data.get("qq") == Some(&target));

        if let Some(index) = at_me {
            self.is_to_me = true;
            self.message.0.remove(index);
        } else if let Some(text) = self.message.leading_text_mut() {
            let trimmed = text.trim_start();
            if let Some(nickname) = nicknames
                .iter()
                .find(|n| !n.is_empty() && trimmed.starts_with(n.as_str()))
            {
                self.is_to_me = true;
                *text = trimmed[nickname.len()..].to_string();
            }
        }

        if let Some(text) = self.message.leading_text_mut() {
            *text = text.trim_start().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Segment;
    use serde_json::json;

    fn group_frame(message: Value) -> Value {
        json!({
            "time": 1,
            "self_id": 10,
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": 7,
            "group_id": 99,
            "user_id": 42,
            "raw_message": "raw",
            "message": message,
            "sender": {"user_id": 42, "nickname": "alice", "role": "admin"}
        })
    }

    #[test]
    fn detail_type_follows_post_type() {
        let ev = Event::from_value(json!({
            "post_type": "notice",
            "notice_type": "group_increase",
            "user_id": 5
        }))
        .unwrap();
        assert_eq!(ev.post_type, EventType::Notice);
        assert_eq!(ev.detail_type, "group_increase");
        assert!(ev.message.is_empty());
    }

    #[test]
    fn unknown_post_type_is_rejected() {
        let err = Event::from_value(json!({"post_type": "bogus"})).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownPostType(t) if t == "bogus"));
    }

    #[test]
    fn at_self_marks_to_me_and_is_removed() {
        let mut ev = Event::from_value(group_frame(json!([
            {"type": "at", "data": {"qq": "10"}},
            {"type": "text", "data": {"text": "  ping"}}
        ])))
        .unwrap();
        ev.preprocess(10, &[]);
        assert!(ev.is_to_me);
        assert_eq!(ev.message.segments(), &[Segment::text("ping")]);
        assert_eq!(ev.sender.as_ref().map(|s| s.role.as_str()), Some("admin"));
    }

    #[test]
    fn nickname_prefix_marks_to_me() {
        let mut ev = Event::from_value(group_frame(json!("  cobalt  hello"))).unwrap();
        ev.preprocess(10, &["cobalt".to_string()]);
        assert!(ev.is_to_me);
        assert_eq!(ev.plain_text(), "hello");
    }

    #[test]
    fn unrelated_group_message_is_not_to_me() {
        let mut ev = Event::from_value(group_frame(json!("[CQ:at,qq=11] hey"))).unwrap();
        ev.preprocess(10, &["cobalt".to_string()]);
        assert!(!ev.is_to_me);
        assert_eq!(ev.message.segments().len(), 2);
    }

    #[test]
    fn anonymous_name_wins() {
        let mut frame = group_frame(json!("hi"));
        frame["sender"]["card"] = json!("Al");
        frame["anonymous"] = json!({"id": 3, "name": "masked", "flag": "f|3"});
        let ev = Event::from_value(frame).unwrap();

        let sender = ev.sender.unwrap();
        assert_eq!(sender.name(), "masked");
        assert_eq!(sender.anonymous_flag, "f|3");

        let plain = Event::from_value(group_frame(json!("hi"))).unwrap();
        assert_eq!(plain.sender.unwrap().name(), "alice");
    }

    #[test]
    fn private_message_is_to_me() {
        let mut ev = Event::message("private", 1, 0, "hi");
        ev.preprocess(10, &[]);
        assert!(ev.is_to_me);
        assert!(ev.is_private());
    }
}
