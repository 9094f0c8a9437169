//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use huelink_config::ConfigError;
use huelink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const BUSY: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Linking ──────────────────────────────────────────────────────
    #[error("No bridge is linked")]
    #[diagnostic(code(huelink::not_linked), help("Run: huelink link"))]
    NotLinked,

    #[error("No bridge found: {reason}")]
    #[diagnostic(
        code(huelink::no_bridge),
        help(
            "Check that the bridge is powered and on the same network.\n\
             Try: huelink discover --method mdns"
        )
    )]
    NoBridgeFound { reason: String },

    #[error("Pairing failed: {message}")]
    #[diagnostic(
        code(huelink::pairing_failed),
        help("Press the round link button on the bridge, then run: huelink link")
    )]
    PairingFailed { message: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach bridge {bridge}")]
    #[diagnostic(
        code(huelink::connection_failed),
        help("Check that the bridge is on and reachable, then retry. The saved pairing is kept.")
    )]
    ConnectionFailed { bridge: String, reason: String },

    #[error("Bridge identity check failed: {message}")]
    #[diagnostic(
        code(huelink::identity),
        help(
            "The device answering is not the bridge that was paired.\n\
             If the bridge was replaced, run: huelink link --relink"
        )
    )]
    IdentityMismatch { message: String },

    #[error("The bridge rejected the saved application key")]
    #[diagnostic(code(huelink::credential_rejected), help("Pair again with: huelink link --relink"))]
    CredentialRejected,

    // ── Operations ───────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(huelink::not_found),
        help("Run: huelink {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Bridge request failed: {message}")]
    #[diagnostic(code(huelink::request_failed))]
    RequestFailed { message: String },

    #[error("Too many pending {queue} commands")]
    #[diagnostic(code(huelink::busy), help("Wait a moment and try again."))]
    Busy { queue: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(huelink::validation))]
    Validation { field: String, reason: String },

    #[error("'{action}' needs confirmation")]
    #[diagnostic(
        code(huelink::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    #[error("Cancelled")]
    #[diagnostic(code(huelink::cancelled))]
    Cancelled,

    // ── Configuration / IO ───────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(huelink::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON output: {0}")]
    #[diagnostic(code(huelink::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(huelink::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::IdentityMismatch { .. } => exit_code::CONNECTION,
            Self::NotLinked | Self::CredentialRejected | Self::PairingFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NoBridgeFound { .. } => exit_code::NOT_FOUND,
            Self::Busy { .. } => exit_code::BUSY,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },
            CoreError::Discovery { message } => CliError::NoBridgeFound { reason: message },
            CoreError::Pairing { message, .. } => CliError::PairingFailed { message },
            CoreError::Identity { message } => CliError::IdentityMismatch { message },
            CoreError::Credential => CliError::CredentialRejected,
            CoreError::Disconnected => CliError::NotLinked,
            CoreError::Request { message, status: _ } => CliError::RequestFailed { message },
            CoreError::Backpressure { queue } => CliError::Busy { queue },
            CoreError::NotFound { kind, identifier } => CliError::NotFound {
                list_command: format!("{kind}s"),
                resource_type: kind,
                identifier,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
