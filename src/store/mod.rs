//! Backing event-store interface.
//!
//! The gateway never owns event, attendee, or call-record persistence; it
//! consumes this interface, implemented over the surrounding system's HTTP
//! API. The trait exists so sessions can be driven against an in-memory
//! store in tests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod http;
pub mod testing;

pub use self::http::HttpEventStore;

/// Errors from backing-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} from store: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode store response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Request(e.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Attendance status of an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendeeStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl AttendeeStatus {
    /// Parse the wire form (`PENDING`, `CONFIRMED`, `CANCELLED`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AttendeeStatus::Pending),
            "CONFIRMED" => Some(AttendeeStatus::Confirmed),
            "CANCELLED" => Some(AttendeeStatus::Cancelled),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            AttendeeStatus::Pending => "PENDING",
            AttendeeStatus::Confirmed => "CONFIRMED",
            AttendeeStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static facts about an event, used to ground the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A person record resolved for a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendeeIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub status: AttendeeStatus,
}

/// One pre-indexed text snippet returned by content search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSnippet {
    pub text: String,
    pub source: String,
}

/// Parameters persisted when a call starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStartRecord {
    pub call_sid: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub attendee_id: Option<String>,
    pub direction: String,
}

/// Final state persisted when a call ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndRecord {
    pub status: String,
    pub transcript: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Interface to the backing event store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch event facts by id.
    async fn resolve_context(&self, event_id: &str) -> StoreResult<EventContext>;

    /// Find an attendee by phone number, optionally scoped to an event.
    /// Returns `Ok(None)` when nobody matches.
    async fn resolve_identity(
        &self,
        phone: &str,
        event_id: Option<&str>,
    ) -> StoreResult<Option<AttendeeIdentity>>;

    /// Set an attendee's attendance status.
    async fn update_status(&self, attendee_id: &str, status: AttendeeStatus) -> StoreResult<()>;

    /// Search indexed event content for the top-`limit` relevant snippets.
    async fn search_content(
        &self,
        event_id: &str,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<ContentSnippet>>;

    /// Persist a call-start record; returns the call record id.
    async fn record_call_start(&self, record: CallStartRecord) -> StoreResult<String>;

    /// Persist the final state of a call.
    async fn record_call_end(&self, record_id: &str, record: CallEndRecord) -> StoreResult<()>;
}
