//! Core domain types for conversation-to-article runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Who wrote a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Other,
}

impl Role {
    /// Map an author role string from the page data (`"user"`, `"assistant"`, ...).
    pub fn from_author(author: &str) -> Self {
        if author == "user" { Self::User } else { Self::Other }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Everything extracted from a shared conversation page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Conversation title, when the page carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Turns in conversation order.
    pub messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Pipeline values
// ---------------------------------------------------------------------------

/// A contiguous span of normalized conversation text sized for one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
}

impl Chunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Digest of the whole article written so far. Replaced, never appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningSummary {
    pub digest: String,
}

impl RunningSummary {
    pub fn is_empty(&self) -> bool {
        self.digest.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// Status text of a successful terminal event.
pub const SUCCESS_STATUS: &str = "Blog generated successfully!";

/// One step of a run's progress stream.
///
/// On the wire `percent` is named `progress`, the name browser clients read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "progress")]
    pub percent: u8,
    pub status: String,
    #[serde(default)]
    pub chunk: Option<String>,
}

impl ProgressEvent {
    /// A non-terminal status update.
    pub fn status(percent: u8, status: impl Into<String>) -> Self {
        debug_assert!(percent < 100, "status events must not look terminal");
        Self {
            percent,
            status: status.into(),
            chunk: None,
        }
    }

    /// A streamed piece of article text.
    pub fn text(percent: u8, status: impl Into<String>, chunk: impl Into<String>) -> Self {
        Self {
            percent: percent.min(99),
            status: status.into(),
            chunk: Some(chunk.into()),
        }
    }

    /// The successful terminal event.
    pub fn completed() -> Self {
        Self {
            percent: 100,
            status: SUCCESS_STATUS.into(),
            chunk: None,
        }
    }

    /// A failed terminal event.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self {
            percent: 100,
            status: format!("Error: {message}"),
            chunk: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.percent >= 100
    }

    pub fn is_error(&self) -> bool {
        self.is_terminal() && self.status.starts_with("Error:")
    }

    /// Encode as one server-sent-events frame (`data: <json>\n\n`).
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| {
            // Only reachable if serde_json rejects plain strings and integers.
            r#"{"progress":100,"status":"Error: unserializable event","chunk":null}"#.into()
        });
        format!("data: {json}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping() {
        assert_eq!(Role::from_author("user"), Role::User);
        assert_eq!(Role::from_author("assistant"), Role::Other);
        assert_eq!(Role::from_author("tool"), Role::Other);
    }

    #[test]
    fn progress_event_wire_format() {
        let event = ProgressEvent::text(80, "Generating...", "Hello");
        let json = serde_json::to_string(&event).expect("serialize");
        assert_eq!(json, r#"{"progress":80,"status":"Generating...","chunk":"Hello"}"#);

        let done = serde_json::to_string(&ProgressEvent::completed()).expect("serialize");
        assert!(done.contains(r#""progress":100"#));
        assert!(done.contains(r#""chunk":null"#));
    }

    #[test]
    fn sse_frame_is_terminated_by_blank_line() {
        let frame = ProgressEvent::status(10, "Fetching content...").to_sse_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert_eq!(frame.matches("\n\n").count(), 1);
    }

    #[test]
    fn failed_events_are_terminal_errors() {
        let event = ProgressEvent::failed("Failed to fetch HTML content");
        assert!(event.is_terminal());
        assert!(event.is_error());
        assert!(event.chunk.is_none());
        assert!(!ProgressEvent::completed().is_error());
    }

    #[test]
    fn text_events_never_reach_terminal_percent() {
        let event = ProgressEvent::text(120, "Generating...", "x");
        assert_eq!(event.percent, 99);
        assert!(!event.is_terminal());
    }

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
