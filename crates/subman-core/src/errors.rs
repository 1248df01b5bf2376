use std::path::PathBuf;

/// Process status for a rejected invocation (the `-1` sentinel as seen by a shell).
pub const VALIDATION_EXIT: u8 = 255;

/// Process status for every other failure.
pub const FAILURE_EXIT: u8 = 1;

/// Local pre-flight failure, raised before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure reported by or on the way to the entitlement service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("unable to reach entitlement service: {0}")]
    Transport(String),
    #[error("entitlement service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected response from entitlement service: {0}")]
    Decode(String),
}

/// Local certificate store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: invalid record: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why the refresh following a remote mutation failed.
#[derive(Debug, thiserror::Error)]
pub enum RefreshFailure {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a synchronization operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "Error: You need to register this system by running `register` command before using this option."
    )]
    NotRegistered,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The remote mutation already happened; only the local copy is behind.
    #[error(
        "Warning: {operation} succeeded on the server but refreshing local certificates failed: {source}. Local state may be stale until the next refresh."
    )]
    Reconciliation {
        operation: String,
        source: RefreshFailure,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Validation(_) => VALIDATION_EXIT,
            _ => FAILURE_EXIT,
        }
    }
}
