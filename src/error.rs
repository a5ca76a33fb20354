//! Error types for canopy

use thiserror::Error;

/// Result type for canopy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for canopy
#[derive(Debug, Error)]
pub enum Error {
    /// No Chromium-family browser binary was found
    #[error("No Chromium-family browser found")]
    NoBrowser,

    /// The browser child exited or misbehaved before handing out a DevTools URL
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// The WebSocket closed or errored with requests in flight
    #[error("Transport lost: {0}")]
    TransportLost(String),

    /// The remote returned an error object for a request
    #[error("Protocol error in {method}: {message} (code {code})")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    /// A deadline-bounded await expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Page.navigate failed before the load event
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// An interaction used a reference not present in the current snapshot
    #[error("Unknown reference {0}; take a new snapshot first")]
    ReferenceUnknown(u64),

    /// press() received a key name outside the fixed table
    #[error("Unknown key '{key}', valid keys: {valid}")]
    UnknownKey { key: String, valid: String },

    /// goBack/goForward with no neighboring history entry
    #[error("No history entry in that direction")]
    NoHistory,

    /// Storage state document could not be parsed
    #[error("Invalid storage state: {0}")]
    StorageStateInvalid(String),

    /// switch_tab index out of range
    #[error("No tab at index {0}")]
    TabIndex(usize),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decode error (e.g., base64)
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a protocol error with full context
    pub fn protocol(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a transport-lost error
    pub fn transport(context: impl Into<String>) -> Self {
        Self::TransportLost(context.into())
    }

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::Timeout(context.into())
    }

    /// True for errors that invalidate the page handle as a whole
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TransportLost(_) | Error::LaunchFailed(_) | Error::NoBrowser
        )
    }
}
