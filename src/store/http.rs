//! HTTP implementation of the backing event store.
//!
//! Talks to the surrounding system's HTTP API with a bearer deploy key.
//! Read failures that mean "no such record" map to `Ok(None)`/`NotFound`
//! rather than errors, so callers can degrade gracefully.

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    AttendeeIdentity, AttendeeStatus, CallEndRecord, CallStartRecord, ContentSnippet,
    EventContext, EventStore, StoreError, StoreResult,
};

/// Timeout for individual store requests.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// HTTP client for the backing event store.
pub struct HttpEventStore {
    base_url: String,
    deploy_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CreatedCallRecord {
    id: String,
}

impl HttpEventStore {
    pub fn new(base_url: &str, deploy_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            deploy_key,
            client,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.deploy_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EventStore for HttpEventStore {
    async fn resolve_context(&self, event_id: &str) -> StoreResult<EventContext> {
        let response = self
            .request(reqwest::Method::GET, &format!("/events/{event_id}"))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(format!("event {event_id}")));
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn resolve_identity(
        &self,
        phone: &str,
        event_id: Option<&str>,
    ) -> StoreResult<Option<AttendeeIdentity>> {
        let mut query = vec![("phone", phone.to_string())];
        if let Some(event_id) = event_id {
            query.push(("eventId", event_id.to_string()));
        }

        let response = self
            .request(reqwest::Method::GET, "/attendees/by-phone")
            .query(&query)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn update_status(&self, attendee_id: &str, status: AttendeeStatus) -> StoreResult<()> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/attendees/{attendee_id}/status"),
            )
            .json(&serde_json::json!({"status": status}))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn search_content(
        &self,
        event_id: &str,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<ContentSnippet>> {
        let response = self
            .request(reqwest::Method::GET, "/content/search")
            .query(&[
                ("eventId", event_id),
                ("query", query),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn record_call_start(&self, record: CallStartRecord) -> StoreResult<String> {
        let response = self
            .request(reqwest::Method::POST, "/calls")
            .json(&record)
            .send()
            .await?;

        let created: CreatedCallRecord = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    async fn record_call_end(&self, record_id: &str, record: CallEndRecord) -> StoreResult<()> {
        let response = self
            .request(reqwest::Method::POST, &format!("/calls/{record_id}/end"))
            .json(&record)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
