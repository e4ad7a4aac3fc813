use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::amp::dispatch::{AmpVersion, Operation};

/// Coarse classification of every failure the protocol layer can surface.
///
/// Callers branch on the kind to decide retry policy; the layer itself
/// never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected. Fatal until new credentials are supplied.
    InvalidCredentials,
    /// Transient transport failure, including connect deadlines.
    IoFailure,
    /// The device understood the request and refused or failed it.
    DeviceExecutionFailure,
    /// The response could not be understood (usually a version mismatch).
    ProtocolFailure,
    /// The target domain, subscription, or object does not exist.
    NotFound,
    /// The target was removed by a concurrent delete.
    AlreadyDeleted,
    /// The request was rejected locally before reaching a device.
    InvalidRequest,
}

impl ErrorKind {
    /// Whether a caller may retry blindly (with backoff).
    ///
    /// `DeviceExecutionFailure` is only retryable when the caller knows
    /// the operation is idempotent, so it reports `false` here.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::IoFailure)
    }
}

/// Top-level error type for the `amplink-api` crate.
///
/// Covers every failure mode of the AMP client and the notification
/// listener. `amplink-core` maps these into caller-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The device rejected the supplied credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Socket or file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bounded connector gave up waiting.
    #[error("Connection to {target} timed out after {deadline_ms}ms")]
    Timeout { target: String, deadline_ms: u64 },

    /// The connection worker exited without recording an outcome.
    #[error("Connection worker for {target} exited without a result")]
    WorkerLost { target: String },

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Device responses ────────────────────────────────────────────
    /// The device reported a logical failure for a call.
    #[error("Device rejected {call}: {message}")]
    DeviceExecution {
        call: String,
        message: String,
        code: Option<String>,
    },

    /// The device reported that the target does not exist.
    #[error("{what} not found: {name}")]
    NotFound { what: String, name: String },

    /// The device reported that the target was already removed.
    #[error("{what} already deleted: {name}")]
    AlreadyDeleted { what: String, name: String },

    /// Unexpected HTTP status from the management endpoint.
    #[error("HTTP {status} from {call}: {body}")]
    HttpStatus {
        call: String,
        status: u16,
        body: String,
    },

    // ── Protocol ────────────────────────────────────────────────────
    /// Response body did not match the expected shape.
    #[error("Unexpected response to {call}: {message}")]
    Deserialization {
        call: String,
        message: String,
        body: String,
    },

    /// The negotiated protocol version has no binding for the operation.
    #[error("Operation {operation} is not available in AMP {version}")]
    UnsupportedOperation {
        operation: Operation,
        version: AmpVersion,
    },

    // ── Listener ────────────────────────────────────────────────────
    /// Notification listener lifecycle error (bind, double start, etc.)
    #[error("Notification listener error: {0}")]
    Listener(String),
}

impl Error {
    /// Map the error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::InvalidCredentials,
            Self::Transport(e) if e.is_decode() => ErrorKind::ProtocolFailure,
            Self::Transport(_)
            | Self::Io(_)
            | Self::Timeout { .. }
            | Self::WorkerLost { .. }
            | Self::Tls(_) => ErrorKind::IoFailure,
            Self::InvalidUrl(_) | Self::Listener(_) => ErrorKind::InvalidRequest,
            Self::DeviceExecution { .. } => ErrorKind::DeviceExecutionFailure,
            Self::HttpStatus { status, .. } if *status >= 500 => ErrorKind::DeviceExecutionFailure,
            Self::HttpStatus { .. }
            | Self::Deserialization { .. }
            | Self::UnsupportedOperation { .. } => ErrorKind::ProtocolFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyDeleted { .. } => ErrorKind::AlreadyDeleted,
        }
    }

    /// Stable machine-readable key for presentation layers.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "amp.auth.rejected",
            Self::Transport(_) => "amp.io.transport",
            Self::InvalidUrl(_) => "amp.request.invalid_url",
            Self::Io(_) => "amp.io.socket",
            Self::Timeout { .. } => "amp.io.timeout",
            Self::WorkerLost { .. } => "amp.io.worker_lost",
            Self::Tls(_) => "amp.io.tls",
            Self::DeviceExecution { .. } => "amp.device.execution",
            Self::NotFound { .. } => "amp.device.not_found",
            Self::AlreadyDeleted { .. } => "amp.device.already_deleted",
            Self::HttpStatus { .. } => "amp.protocol.http_status",
            Self::Deserialization { .. } => "amp.protocol.decode",
            Self::UnsupportedOperation { .. } => "amp.protocol.unsupported",
            Self::Listener(_) => "amp.listener",
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable_io_failure() {
        let err = Error::Timeout {
            target: "10.0.0.1:5550".into(),
            deadline_ms: 200,
        };
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(err.key(), "amp.io.timeout");
        assert!(err.is_transient());
    }

    #[test]
    fn device_failures_are_not_blindly_retryable() {
        let err = Error::DeviceExecution {
            call: "SetDomain".into(),
            message: "import failed".into(),
            code: None,
        };
        assert_eq!(err.kind(), ErrorKind::DeviceExecutionFailure);
        assert!(!err.is_transient());
    }

    #[test]
    fn unsupported_operation_is_protocol_failure() {
        let err = Error::UnsupportedOperation {
            operation: Operation::GetServiceList,
            version: AmpVersion::V1,
        };
        assert_eq!(err.kind(), ErrorKind::ProtocolFailure);
        assert_eq!(
            err.to_string(),
            "Operation get-service-list is not available in AMP 1.0"
        );
    }

    #[test]
    fn kind_keys_are_snake_case() {
        let key: &'static str = ErrorKind::AlreadyDeleted.into();
        assert_eq!(key, "already_deleted");
        assert_eq!(ErrorKind::InvalidCredentials.to_string(), "invalid_credentials");
    }
}
