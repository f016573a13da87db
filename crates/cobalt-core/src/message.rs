//! Message segments in the gateway's array form.
//!
//! Only the parts of the segment vocabulary the dispatch core needs are modelled
//! here: a generic `{type, data}` segment, a handful of constructors, and CQ
//! code parsing for gateways that report messages in string form.
//!
//! ```text
//! [{"type":"at","data":{"qq":"10001"}}, {"type":"text","data":{"text":" hi"}}]
//!     <=>  "[CQ:at,qq=10001] hi"
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment type (`text`, `at`, `image`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Segment parameters.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Segment {
    /// Creates a segment with the given type and no data.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: BTreeMap::new(),
        }
    }

    /// Adds a data entry (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text").with("text", text)
    }

    /// Mention a user.
    pub fn at(user_id: impl ToString) -> Self {
        Self::new("at").with("qq", user_id.to_string())
    }

    /// Emoji face.
    pub fn face(id: impl ToString) -> Self {
        Self::new("face").with("id", id.to_string())
    }

    /// Image by file name or URL.
    pub fn image(file: impl Into<String>) -> Self {
        Self::new("image").with("file", file)
    }

    /// Reply to a message.
    pub fn reply(message_id: impl ToString) -> Self {
        Self::new("reply").with("id", message_id.to_string())
    }

    /// Returns `true` if this is a text segment.
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// Returns the text of a text segment.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            self.data.get("text").map(String::as_str)
        } else {
            None
        }
    }

    /// Renders this segment as a CQ code (text segments are escaped text).
    pub fn to_cq_code(&self) -> String {
        if let Some(text) = self.as_text() {
            return escape_cq_text(text);
        }
        let mut out = format!("[CQ:{}", self.kind);
        for (key, value) in &self.data {
            let _ = write!(out, ",{key}={}", escape_cq_value(value));
        }
        out.push(']');
        out
    }
}

/// An ordered list of segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub Vec<Segment>);

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a segment (builder style).
    pub fn push(mut self, segment: Segment) -> Self {
        self.0.push(segment);
        self
    }

    /// Parses the `message` field of an event, which may be in array or
    /// string (CQ code) form.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(raw) => parse_cq_string(raw),
            Value::Array(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
            Value::Object(_) => serde_json::from_value::<Segment>(value.clone())
                .map(|seg| Self(vec![seg]))
                .unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Returns `true` if there are no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenates all text segments.
    pub fn plain_text(&self) -> String {
        self.0.iter().filter_map(Segment::as_text).collect()
    }

    /// Returns the text of the first segment, if that segment is text.
    pub fn leading_text(&self) -> Option<&str> {
        self.0.first().and_then(Segment::as_text)
    }

    /// Mutable access to the first segment's text, if that segment is text.
    pub fn leading_text_mut(&mut self) -> Option<&mut String> {
        match self.0.first_mut() {
            Some(seg) if seg.is_text() => seg.data.get_mut("text"),
            _ => None,
        }
    }
}

impl From<Segment> for Message {
    fn from(segment: Segment) -> Self {
        Self(vec![segment])
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Segment::text(text).into()
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Segment::text(text).into()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            f.write_str(&seg.to_cq_code())?;
        }
        Ok(())
    }
}

// =============================================================================
// CQ code helpers
// =============================================================================

/// Escapes special characters in plain message text.
pub fn escape_cq_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

/// Reverses [`escape_cq_text`].
pub fn unescape_cq_text(s: &str) -> String {
    s.replace("&#93;", "]")
        .replace("&#91;", "[")
        .replace("&amp;", "&")
}

/// Escapes special characters inside a CQ code parameter value.
pub fn escape_cq_value(s: &str) -> String {
    escape_cq_text(s).replace(',', "&#44;")
}

/// Reverses [`escape_cq_value`].
pub fn unescape_cq_value(s: &str) -> String {
    unescape_cq_text(&s.replace("&#44;", ","))
}

/// Parses a CQ code string into segments.
///
/// Malformed codes (an unterminated `[CQ:`) are kept as text.
pub fn parse_cq_string(raw: &str) -> Message {
    let mut segments = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.find("[CQ:") {
        let Some(len) = rest[start..].find(']') else {
            break;
        };
        if start > 0 {
            segments.push(Segment::text(unescape_cq_text(&rest[..start])));
        }

        let body = &rest[start + 4..start + len];
        let mut parts = body.split(',');
        let mut segment = Segment::new(parts.next().unwrap_or_default());
        for part in parts {
            if let Some((key, value)) = part.split_once('=') {
                segment.data.insert(key.to_string(), unescape_cq_value(value));
            }
        }
        segments.push(segment);
        rest = &rest[start + len + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::text(unescape_cq_text(rest)));
    }
    Message(segments)
}
