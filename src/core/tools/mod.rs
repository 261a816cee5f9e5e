//! Structured tool-call dispatch.
//!
//! The model can request two functions during a call: updating an attendee's
//! attendance status and searching indexed event content. The set is closed:
//! adding a tool means adding a `ToolKind` variant, and the compiler points
//! at every match that needs extending.
//!
//! Execution is idempotent by call id. The upstream backend may redeliver a
//! call id; the second delivery returns the cached result without touching
//! the backing store again.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::core::live::base::{FunctionCall, FunctionResponse, ToolDeclaration};
use crate::store::{AttendeeStatus, EventStore};

/// How many content snippets a lookup returns.
pub const CONTENT_LOOKUP_LIMIT: usize = 3;

/// The closed set of tools the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Set an attendee's attendance status
    UpdateAttendeeStatus,
    /// Search indexed event content
    LookupEventContent,
}

impl ToolKind {
    /// The wire name of this tool.
    pub const fn name(&self) -> &'static str {
        match self {
            ToolKind::UpdateAttendeeStatus => "update_attendee_status",
            ToolKind::LookupEventContent => "lookup_event_content",
        }
    }

    /// Resolve a wire name to a tool kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "update_attendee_status" => Some(ToolKind::UpdateAttendeeStatus),
            "lookup_event_content" => Some(ToolKind::LookupEventContent),
            _ => None,
        }
    }
}

/// Declarations for every supported tool, in the form the live session
/// advertises to the model.
pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: ToolKind::UpdateAttendeeStatus.name().to_string(),
            description: "Update the attendance status of an attendee. Use this when the user \
                          confirms or cancels their attendance."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "attendeeId": {
                        "type": "string",
                        "description": "The ID of the attendee to update"
                    },
                    "status": {
                        "type": "string",
                        "enum": ["PENDING", "CONFIRMED", "CANCELLED"],
                        "description": "The new attendance status"
                    }
                },
                "required": ["status"]
            }),
        },
        ToolDeclaration {
            name: ToolKind::LookupEventContent.name().to_string(),
            description: "Search for information about the event. Use this when the user asks \
                          questions about event details, schedule, speakers, topics, etc."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "eventId": {
                        "type": "string",
                        "description": "The ID of the event"
                    },
                    "query": {
                        "type": "string",
                        "description": "The search query to find relevant event information"
                    }
                },
                "required": ["query"]
            }),
        },
    ]
}

/// Session-scoped defaults filled in when the model omits an argument.
#[derive(Debug, Clone, Default)]
pub struct ToolDefaults {
    /// Attendee resolved for this call, if any
    pub attendee_id: Option<String>,
    /// Event this call belongs to, if any
    pub event_id: Option<String>,
}

/// Executes tool calls against the backing store.
///
/// One dispatcher exists per call session; the result cache lives and dies
/// with the session.
pub struct ToolDispatcher {
    store: Arc<dyn EventStore>,
    defaults: ToolDefaults,
    /// Results already produced, keyed by call id
    completed: Mutex<HashMap<String, Value>>,
}

impl ToolDispatcher {
    pub fn new(store: Arc<dyn EventStore>, defaults: ToolDefaults) -> Self {
        Self {
            store,
            defaults,
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Execute one tool call, returning a structured result.
    ///
    /// Never fails: internal errors become `{success: false, error}` so the
    /// model always receives an answer it can speak about. A redelivered
    /// call id short-circuits to the previously computed result.
    pub async fn execute(&self, call: &FunctionCall) -> FunctionResponse {
        {
            let completed = self.completed.lock().await;
            if let Some(cached) = completed.get(&call.id) {
                tracing::warn!(
                    call_id = %call.id,
                    tool = %call.name,
                    "Duplicate tool call id, returning cached result"
                );
                return FunctionResponse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    response: cached.clone(),
                };
            }
        }

        let response = match ToolKind::from_name(&call.name) {
            Some(ToolKind::UpdateAttendeeStatus) => self.update_attendee_status(&call.args).await,
            Some(ToolKind::LookupEventContent) => self.lookup_event_content(&call.args).await,
            None => {
                tracing::warn!(tool = %call.name, "Unknown tool requested");
                json!({"success": false, "error": format!("unknown tool: {}", call.name)})
            }
        };

        self.completed
            .lock()
            .await
            .insert(call.id.clone(), response.clone());

        FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    async fn update_attendee_status(&self, args: &Value) -> Value {
        let attendee_id = args["attendeeId"]
            .as_str()
            .map(str::to_string)
            .or_else(|| self.defaults.attendee_id.clone());

        let Some(attendee_id) = attendee_id else {
            return json!({"success": false, "error": "no attendee id available"});
        };

        let Some(status) = args["status"].as_str().and_then(AttendeeStatus::parse) else {
            return json!({
                "success": false,
                "error": format!("invalid status: {}", args["status"])
            });
        };

        match self.store.update_status(&attendee_id, status).await {
            Ok(()) => {
                tracing::info!(attendee_id = %attendee_id, status = %status, "Attendee status updated");
                json!({
                    "success": true,
                    "message": format!("attendee status set to {status}")
                })
            }
            Err(e) => {
                tracing::error!("Attendee status update failed: {}", e);
                json!({"success": false, "error": e.to_string()})
            }
        }
    }

    async fn lookup_event_content(&self, args: &Value) -> Value {
        let event_id = args["eventId"]
            .as_str()
            .map(str::to_string)
            .or_else(|| self.defaults.event_id.clone());

        let Some(event_id) = event_id else {
            return json!({"success": false, "error": "no event id available"});
        };

        let query = args["query"].as_str().unwrap_or_default();
        if query.is_empty() {
            return json!({"success": false, "error": "query is required"});
        }

        match self
            .store
            .search_content(&event_id, query, CONTENT_LOOKUP_LIMIT)
            .await
        {
            Ok(snippets) => {
                tracing::debug!(count = snippets.len(), "Content lookup results");
                json!({
                    "success": true,
                    "snippets": snippets
                        .iter()
                        .map(|s| json!({"text": s.text, "source": s.source}))
                        .collect::<Vec<_>>()
                })
            }
            Err(e) => {
                tracing::error!("Content lookup failed: {}", e);
                json!({"success": false, "error": e.to_string()})
            }
        }
    }
}
