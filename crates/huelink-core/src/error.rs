// ── Core error types ──
//
// What callers of huelink-core see. Wire-level detail (status codes, raw
// bodies) stays in huelink-api; the `From<huelink_api::Error>` impl sorts
// transport failures into the categories the link state machine routes on.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup ────────────────────────────────────────────────────────
    /// No saved bridge, or only part of one. Routes to discovery.
    #[error("Bridge is not configured: {message}")]
    Configuration { message: String },

    /// Neither discovery method found a bridge.
    #[error("No bridge found: {message}")]
    Discovery { message: String },

    /// The bridge refused to pair. `link_button` is set when the only
    /// problem is that the button has not been pressed yet.
    #[error("Pairing failed: {message}")]
    Pairing { message: String, link_button: bool },

    // ── Connection ───────────────────────────────────────────────────
    /// The peer's certificate names a different bridge.
    #[error("Bridge identity check failed: {message}")]
    Identity { message: String },

    /// The saved application key was rejected.
    #[error("Bridge rejected the saved credential")]
    Credential,

    /// No active session.
    #[error("Not connected to a bridge")]
    Disconnected,

    // ── Operations ───────────────────────────────────────────────────
    /// A single request failed; nothing else is affected.
    #[error("Request failed: {message}")]
    Request {
        message: String,
        status: Option<u16>,
    },

    /// A command queue is full and refused the request.
    #[error("Too many pending commands for {queue}; try again shortly")]
    Backpressure { queue: String },

    #[error("{kind} not found: {identifier}")]
    NotFound { kind: String, identifier: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Errors that send the link state machine back to pairing.
    pub fn requires_relink(&self) -> bool {
        matches!(self, Self::Credential)
    }

    pub fn not_found(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<huelink_api::Error> for CoreError {
    fn from(err: huelink_api::Error) -> Self {
        use huelink_api::Error as Api;

        match err {
            Api::Identity {
                expected,
                subject,
                issuer,
            } => CoreError::Identity {
                message: format!(
                    "expected {expected}, got subject {} issued by {}",
                    subject.as_deref().unwrap_or("<none>"),
                    issuer.as_deref().unwrap_or("<none>"),
                ),
            },
            Api::CredentialRejected => CoreError::Credential,
            Api::Pairing {
                error_type,
                description,
            } => CoreError::Pairing {
                link_button: error_type == huelink_api::error::LINK_BUTTON_NOT_PRESSED,
                message: description,
            },
            Api::Discovery(message) => CoreError::Discovery { message },
            Api::Backpressure { queue, .. } => CoreError::Backpressure { queue: queue.into() },
            Api::Bridge { status, message } => CoreError::Request {
                message,
                status: Some(status),
            },
            Api::Transport(ref e) => CoreError::Request {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            Api::Timeout { timeout_secs } => CoreError::Request {
                message: format!("timed out after {timeout_secs}s"),
                status: None,
            },
            Api::Api { message } | Api::EventStream(message) => CoreError::Request { message, status: None },
            Api::QueueClosed { queue } => CoreError::Internal(format!("command queue '{queue}' stopped")),
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::Tls(message) => CoreError::Configuration {
                message: format!("saved certificate is unusable: {message}"),
            },
            Api::InvalidUrl(e) => CoreError::Configuration {
                message: format!("invalid bridge address: {e}"),
            },
        }
    }
}
