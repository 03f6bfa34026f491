//! Error types for the volume driver.
//!
//! Every failure a caller can observe is one [`BlockError`] variant. The
//! variants map one-to-one onto the error kinds the plugin transport reports
//! back to the container host, so callers match on the kind rather than on
//! message text.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type BlockResult<T> = Result<T, BlockError>;

/// Unified error type for driver operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Operation on a volume name the state store does not know.
    #[error("volume {0} not found")]
    NotFound(String),

    /// Create with options that differ from the existing volume.
    #[error("volume {name} already exists with different options: {reason}")]
    Conflict { name: String, reason: String },

    /// Remove while the volume still has outstanding mounts.
    #[error("volume {name} is in use ({mount_count} active mounts)")]
    InUse { name: String, mount_count: u32 },

    /// The requested transition is not valid for the current volume state.
    #[error("volume {name}: {reason}")]
    InvalidState { name: String, reason: String },

    /// No free loop device was available.
    #[error("no free loop device: {0}")]
    ResourceExhausted(String),

    /// File or mount operation failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Unsupported filesystem or a failed formatting run.
    #[error("format failed: {0}")]
    Format(String),

    /// The GlusterFS volume could not be mounted.
    #[error("gluster connection failed: {0}")]
    Connection(String),

    /// The persisted state file is unreadable. Fatal at startup.
    #[error("state file {path} is corrupt: {reason}")]
    StateCorrupt { path: String, reason: String },

    /// Caller supplied a malformed name or option.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Process configuration is invalid.
    #[error("config: {0}")]
    Config(String),

    /// Unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BlockError {
    /// Wrap an [`io::Error`] with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Build an [`BlockError::Io`] from a failed command that did not produce
    /// an OS error of its own.
    pub fn command(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Io {
            context: context.into(),
            source: io::Error::other(detail.into()),
        }
    }

    /// Whether the process should stop serving after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StateCorrupt { .. })
    }

    /// Stable short name of the error kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::InUse { .. } => "in_use",
            Self::InvalidState { .. } => "invalid_state",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Io { .. } => "io",
            Self::Format(_) => "format",
            Self::Connection(_) => "connection",
            Self::StateCorrupt { .. } => "state_corrupt",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BlockError::NotFound("db".into());
        assert_eq!(err.to_string(), "volume db not found");

        let err = BlockError::InUse {
            name: "db".into(),
            mount_count: 2,
        };
        assert_eq!(err.to_string(), "volume db is in use (2 active mounts)");
    }

    #[test]
    fn only_state_corruption_is_fatal() {
        let corrupt = BlockError::StateCorrupt {
            path: "/data/state.json".into(),
            reason: "expected value".into(),
        };
        assert!(corrupt.is_fatal());
        assert!(!BlockError::Connection("unreachable".into()).is_fatal());
        assert!(!BlockError::NotFound("x".into()).is_fatal());
    }

    #[test]
    fn io_keeps_source() {
        let err = BlockError::io(
            "failed to allocate /data/x.img",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), "io");
        assert!(std::error::Error::source(&err).is_some());
    }
}
