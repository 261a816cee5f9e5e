//! In-memory `EventStore` used by unit and integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    AttendeeIdentity, AttendeeStatus, CallEndRecord, CallStartRecord, ContentSnippet,
    EventContext, EventStore, StoreError, StoreResult,
};

/// A scriptable in-memory store that records every mutation it receives.
#[derive(Default)]
pub struct MemoryStore {
    fail: bool,
    pub events: Mutex<HashMap<String, EventContext>>,
    pub attendees_by_phone: Mutex<HashMap<String, AttendeeIdentity>>,
    pub content: Mutex<Vec<(String, ContentSnippet)>>,
    pub status_updates: Mutex<Vec<(String, AttendeeStatus)>>,
    pub call_starts: Mutex<Vec<CallStartRecord>>,
    pub call_ends: Mutex<Vec<(String, CallEndRecord)>>,
}

impl MemoryStore {
    /// A store whose every operation fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn add_event(&self, context: EventContext) {
        self.events
            .lock()
            .unwrap()
            .insert(context.id.clone(), context);
    }

    pub fn add_attendee(&self, phone: &str, identity: AttendeeIdentity) {
        self.attendees_by_phone
            .lock()
            .unwrap()
            .insert(phone.to_string(), identity);
    }

    pub fn add_content(&self, event_id: &str, text: &str, source: &str) {
        self.content.lock().unwrap().push((
            event_id.to_string(),
            ContentSnippet {
                text: text.to_string(),
                source: source.to_string(),
            },
        ));
    }

    fn gate(&self) -> StoreResult<()> {
        if self.fail {
            Err(StoreError::Request("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn resolve_context(&self, event_id: &str) -> StoreResult<EventContext> {
        self.gate()?;
        self.events
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))
    }

    async fn resolve_identity(
        &self,
        phone: &str,
        _event_id: Option<&str>,
    ) -> StoreResult<Option<AttendeeIdentity>> {
        self.gate()?;
        Ok(self.attendees_by_phone.lock().unwrap().get(phone).cloned())
    }

    async fn update_status(&self, attendee_id: &str, status: AttendeeStatus) -> StoreResult<()> {
        self.gate()?;
        self.status_updates
            .lock()
            .unwrap()
            .push((attendee_id.to_string(), status));
        Ok(())
    }

    async fn search_content(
        &self,
        event_id: &str,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<ContentSnippet>> {
        self.gate()?;
        let query = query.to_lowercase();
        Ok(self
            .content
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, snippet)| {
                id == event_id && snippet.text.to_lowercase().contains(&query)
            })
            .map(|(_, snippet)| snippet.clone())
            .take(limit)
            .collect())
    }

    async fn record_call_start(&self, record: CallStartRecord) -> StoreResult<String> {
        self.gate()?;
        let mut starts = self.call_starts.lock().unwrap();
        starts.push(record);
        Ok(format!("rec-{}", starts.len()))
    }

    async fn record_call_end(&self, record_id: &str, record: CallEndRecord) -> StoreResult<()> {
        self.gate()?;
        self.call_ends
            .lock()
            .unwrap()
            .push((record_id.to_string(), record));
        Ok(())
    }
}
