//! Session-level error taxonomy.
//!
//! Every failure inside a bridged call maps onto one of these variants, which
//! decide how far the damage is allowed to spread: a transcode fault drops a
//! frame, a protocol violation drops an event, a setup error or connection
//! loss tears the session down. Nothing here ever crosses the session
//! boundary into another call.

use thiserror::Error;

/// Errors raised while running one bridged call session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Context/identity resolution or live-session open failed before
    /// bridging began.
    #[error("setup failed: {0}")]
    Setup(String),

    /// Malformed audio reached a transcoding boundary.
    #[error("transcode fault: {0}")]
    Transcode(String),

    /// A control message or tool-call event violated the wire protocol
    /// (unmatched tool result, duplicate call id, message in a bad state).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// One of the two transports disconnected unexpectedly.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl SessionError {
    /// Whether this error must collapse the session to FINALIZING.
    ///
    /// Transcode faults and protocol violations are logged and survived;
    /// setup errors and lost connections are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Setup(_) | SessionError::ConnectionLost(_)
        )
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(SessionError::Setup("no event".into()).is_fatal());
        assert!(SessionError::ConnectionLost("ws closed".into()).is_fatal());
        assert!(!SessionError::Transcode("odd byte count".into()).is_fatal());
        assert!(!SessionError::Protocol("duplicate call id".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = SessionError::Protocol("unmatched tool result x".into());
        assert_eq!(err.to_string(), "protocol violation: unmatched tool result x");
    }
}
