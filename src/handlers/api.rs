//! Plain HTTP handlers.

use axum::Json;
use serde_json::{Value, json};

/// Health check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "voicebridge-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "voicebridge-gateway");
    }
}
