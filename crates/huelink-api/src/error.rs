use thiserror::Error;

/// Top-level error type for the `huelink-api` crate.
///
/// Covers every failure mode across the wire surfaces: transport and TLS,
/// peer identity, the CLIP v2 resource API, the push event stream, the
/// command queues, discovery, and pairing. `huelink-core` maps these into
/// its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Connection or request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS configuration could not be built (bad PEM, unsupported key, ...).
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Identity ────────────────────────────────────────────────────
    /// The peer presented a certificate whose names do not match the bridge.
    #[error("Bridge identity mismatch: expected {expected}, peer presented subject {subject:?} issued by {issuer:?}")]
    Identity {
        expected: String,
        subject: Option<String>,
        issuer: Option<String>,
    },

    // ── Bridge API ──────────────────────────────────────────────────
    /// The application key was rejected (HTTP 403 on verification).
    #[error("Bridge rejected the application key")]
    CredentialRejected,

    /// Non-success HTTP status from the bridge.
    #[error("Bridge request failed (HTTP {status}): {message}")]
    Bridge { status: u16, message: String },

    /// The response body carried a non-empty `errors` array.
    #[error("Bridge reported errors: {message}")]
    Api { message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Event stream ────────────────────────────────────────────────
    /// The push event stream failed or delivered malformed data.
    #[error("Event stream error: {0}")]
    EventStream(String),

    // ── Queue ───────────────────────────────────────────────────────
    /// A rate-limited queue refused the task because its backlog is full.
    #[error("Queue '{queue}' is full ({capacity} pending) -- request dropped")]
    Backpressure { queue: &'static str, capacity: usize },

    /// The queue worker stopped before the task settled.
    #[error("Queue '{queue}' closed before the request completed")]
    QueueClosed { queue: &'static str },

    // ── Discovery & pairing ─────────────────────────────────────────
    /// A discovery mechanism failed outright (network error, daemon error).
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The bridge refused to issue an application key.
    ///
    /// `error_type` 101 means the link button has not been pressed.
    #[error("Pairing failed ({error_type}): {description}")]
    Pairing { error_type: u16, description: String },
}

/// Bridge error type for "link button not pressed".
pub const LINK_BUTTON_NOT_PRESSED: u16 = 101;

impl Error {
    /// Returns `true` if the bridge rejected the stored credential.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, Self::CredentialRejected)
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Backpressure { .. } | Self::EventStream(_) => true,
            Self::Bridge { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if a queue refused the request.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::Backpressure { .. })
    }

    /// Returns `true` if pairing failed only because the link button was not pressed.
    pub fn is_link_button_not_pressed(&self) -> bool {
        matches!(
            self,
            Self::Pairing {
                error_type: LINK_BUTTON_NOT_PRESSED,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejection_is_not_transient() {
        let err = Error::CredentialRejected;
        assert!(err.is_credential_rejected());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Bridge {
            status: 503,
            message: "busy".into(),
        };
        assert!(err.is_transient());

        let err = Error::Bridge {
            status: 404,
            message: "not found".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn link_button_detection() {
        let err = Error::Pairing {
            error_type: 101,
            description: "link button not pressed".into(),
        };
        assert!(err.is_link_button_not_pressed());

        let err = Error::Pairing {
            error_type: 7,
            description: "invalid value".into(),
        };
        assert!(!err.is_link_button_not_pressed());
    }
}
