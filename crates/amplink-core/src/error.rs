// ── Core error types ──
//
// Caller-facing errors from amplink-core. Consumers see the six-way
// taxonomy (`ErrorKind`) plus a stable key, never raw HTTP statuses or
// JSON parse failures. The `From<amplink_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use amplink_api::Error as ApiError;
use thiserror::Error;

pub use amplink_api::ErrorKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Credentials ──────────────────────────────────────────────────
    #[error("Credentials rejected by {device}: {message}")]
    InvalidCredentials { device: String, message: String },

    // ── I/O ──────────────────────────────────────────────────────────
    #[error("Connection to {device} timed out after {deadline_ms}ms")]
    Timeout { device: String, deadline_ms: u64 },

    #[error("Cannot reach {device}: {reason}")]
    ConnectionFailed { device: String, reason: String },

    // ── Device-side failures ─────────────────────────────────────────
    #[error("Device rejected {operation}: {message}")]
    DeviceExecution {
        operation: String,
        message: String,
        /// Device-specific failure code, when the device reports one.
        code: Option<String>,
    },

    #[error("{what} not found: {name}")]
    NotFound { what: String, name: String },

    #[error("{what} already deleted: {name}")]
    AlreadyDeleted { what: String, name: String },

    // ── Protocol ─────────────────────────────────────────────────────
    #[error("Unexpected response: {message}")]
    Protocol { message: String },

    #[error("Operation {operation} is not supported by provider {provider}")]
    Unsupported { operation: String, provider: String },

    // ── Local ────────────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown provider id: {id}")]
    UnknownProvider { id: String },
}

impl CoreError {
    /// Map the error onto the caller-facing taxonomy.
    ///
    /// Local failures (validation, configuration, unknown providers) never
    /// reach a device and are reported as protocol failures: retrying them
    /// unchanged cannot succeed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::Timeout { .. } | Self::ConnectionFailed { .. } => ErrorKind::IoFailure,
            Self::DeviceExecution { .. } => ErrorKind::DeviceExecutionFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyDeleted { .. } => ErrorKind::AlreadyDeleted,
            Self::Protocol { .. }
            | Self::Unsupported { .. }
            | Self::ValidationFailed { .. }
            | Self::Config { .. }
            | Self::UnknownProvider { .. } => ErrorKind::ProtocolFailure,
        }
    }

    /// Stable machine-readable key, suitable as a localization lookup.
    pub fn key(&self) -> &'static str {
        match self {
            Self::InvalidCredentials { .. } => "amp.auth.rejected",
            Self::Timeout { .. } => "amp.io.timeout",
            Self::ConnectionFailed { .. } => "amp.io.connect",
            Self::DeviceExecution { .. } => "amp.device.execution",
            Self::NotFound { .. } => "amp.device.not_found",
            Self::AlreadyDeleted { .. } => "amp.device.already_deleted",
            Self::Protocol { .. } => "amp.protocol.decode",
            Self::Unsupported { .. } => "amp.protocol.unsupported",
            Self::ValidationFailed { .. } => "amp.request.invalid",
            Self::Config { .. } => "amp.config.invalid",
            Self::UnknownProvider { .. } => "amp.config.unknown_provider",
        }
    }

    /// Returns `true` if a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub(crate) fn from_api(device: &str, err: ApiError) -> Self {
        match err {
            ApiError::Authentication { message } => Self::InvalidCredentials {
                device: device.to_owned(),
                message,
            },
            other => {
                let mut core = Self::from(other);
                if let Self::ConnectionFailed { device: d, .. } = &mut core {
                    if d.is_empty() {
                        device.clone_into(d);
                    }
                }
                core
            }
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication { message } => CoreError::InvalidCredentials {
                device: String::new(),
                message,
            },
            ApiError::Timeout {
                target,
                deadline_ms,
            } => CoreError::Timeout {
                device: target,
                deadline_ms,
            },
            ApiError::WorkerLost { target } => CoreError::ConnectionFailed {
                device: target,
                reason: "connection worker exited without a result".into(),
            },
            ApiError::Transport(ref e) if e.is_decode() => CoreError::Protocol {
                message: e.to_string(),
            },
            ApiError::Transport(e) => CoreError::ConnectionFailed {
                device: e
                    .url()
                    .and_then(|u| u.host_str().map(String::from))
                    .unwrap_or_default(),
                reason: e.to_string(),
            },
            ApiError::Io(e) => CoreError::ConnectionFailed {
                device: String::new(),
                reason: e.to_string(),
            },
            ApiError::Tls(reason) => CoreError::ConnectionFailed {
                device: String::new(),
                reason,
            },
            ApiError::DeviceExecution {
                call,
                message,
                code,
            } => CoreError::DeviceExecution {
                operation: call,
                message,
                code,
            },
            ApiError::HttpStatus { call, status, body } if status >= 500 => {
                CoreError::DeviceExecution {
                    operation: call,
                    message: format!("HTTP {status}: {body}"),
                    code: None,
                }
            }
            ApiError::HttpStatus { call, status, body } => CoreError::Protocol {
                message: format!("{call} answered HTTP {status}: {body}"),
            },
            ApiError::NotFound { what, name } => CoreError::NotFound { what, name },
            ApiError::AlreadyDeleted { what, name } => CoreError::AlreadyDeleted { what, name },
            ApiError::Deserialization { call, message, .. } => CoreError::Protocol {
                message: format!("{call}: {message}"),
            },
            ApiError::UnsupportedOperation { operation, version } => CoreError::Unsupported {
                operation: operation.to_string(),
                provider: format!("amp {version}"),
            },
            ApiError::InvalidUrl(e) => CoreError::ValidationFailed {
                message: format!("invalid device URL: {e}"),
            },
            ApiError::Listener(message) => CoreError::Config { message },
        }
    }
}
