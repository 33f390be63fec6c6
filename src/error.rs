//! Error taxonomy for topology loading, planning and fabric construction.

use std::io;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, FabricError>;

/// Errors that can occur while loading a topology or building the fabric.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    /// Malformed line or token in a topology file. Raised before any
    /// namespace side effects.
    #[error("topology line {line}: {reason}")]
    GraphFormat { line: usize, reason: String },

    /// Failed to open, enter, create or delete a network namespace.
    #[error("namespace operation failed: {what}")]
    Namespace {
        what: String,
        #[source]
        source: anyhow::Error,
    },

    /// Bridge, veth or VXLAN creation failed after any applicable retry.
    #[error("failed to create device {device}")]
    DeviceCreation {
        device: String,
        #[source]
        source: anyhow::Error,
    },

    /// Error reported by a node or link manager implementation, passed
    /// through unchanged.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),

    /// Writing the link-construction log failed.
    #[error("link log write failed")]
    LinkLog(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A pooled task panicked instead of returning.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("task pool has no running workers")]
    PoolClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FabricError {
    pub(crate) fn graph_format(line: usize, reason: impl Into<String>) -> Self {
        FabricError::GraphFormat {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn namespace(what: impl Into<String>, source: anyhow::Error) -> Self {
        FabricError::Namespace {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn device(device: impl Into<String>, source: anyhow::Error) -> Self {
        FabricError::DeviceCreation {
            device: device.into(),
            source,
        }
    }
}
