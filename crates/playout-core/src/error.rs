//! Error types for Playout Core

use crate::client::ClientError;
use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Session error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Negotiation errors
    #[error("No valid protocol / DRM combination available")]
    NoValidCombination,

    #[error("Unable to find offering from '{requested}'")]
    OfferingNotFound { requested: String },

    // Backend errors
    #[error("Backend unsupported: {0}")]
    BackendUnsupported(String),

    #[error("No backend attached")]
    NoBackend,

    // Playback errors
    #[error("Insufficient permissions (HTTP {status})")]
    Permission {
        status: u16,
        /// Content-provided message explaining the restriction
        message: Option<String>,
    },

    #[error("Server error (HTTP {status}): {details}")]
    Server { status: u16, details: String },

    #[error("Recoverable media error: {0}")]
    RecoverableMedia(String),

    #[error("Fatal playback error: {0}")]
    FatalPlayback(String),

    // Collection errors
    #[error("{0}")]
    CollectionConfig(String),

    // Access code errors
    #[error("Ticket redemption failed: {0}")]
    TicketRedemption(String),

    #[error("Ticket code required")]
    TicketRequired,

    // Collaborator errors
    #[error("Content client error: {0}")]
    Client(#[from] ClientError),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid session state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Session destroyed")]
    Destroyed,

    #[error("Invalid playout URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl Error {
    /// Create a collection configuration error
    pub fn collection(msg: impl Into<String>) -> Self {
        Error::CollectionConfig(msg.into())
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Permission { status, .. } | Error::Server { status, .. } => Some(*status),
            Error::Client(e) => e.status,
            _ => None,
        }
    }

    /// Returns true for 401/403 failures, which are never retried
    pub fn is_permission(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Returns true for 5xx failures
    pub fn is_server(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }

    /// Returns true if the session may recover from this error by reloading
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Server { .. } | Error::RecoverableMedia(_) | Error::FatalPlayback(_) => true,
            Error::Client(_) => self.is_server(),
            _ => false,
        }
    }

    /// Message suitable for showing to the viewer
    pub fn display_message(&self) -> String {
        match self {
            Error::Permission { message: Some(message), .. } => message.clone(),
            Error::Permission { message: None, .. } => "Insufficient permissions".to_string(),
            Error::CollectionConfig(msg) => msg.clone(),
            Error::OfferingNotFound { .. } | Error::NoValidCombination => self.to_string(),
            Error::TicketRedemption(_) => "Invalid Code".to_string(),
            Error::TicketRequired => "Ticket code required".to_string(),
            Error::Client(e) => e
                .display_message
                .clone()
                .unwrap_or_else(|| "Something went wrong".to_string()),
            _ => "Something went wrong".to_string(),
        }
    }

    /// Returns the error code for logs and hooks
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoValidCombination => "NO_VALID_COMBINATION",
            Error::OfferingNotFound { .. } => "OFFERING_NOT_FOUND",
            Error::BackendUnsupported(_) => "BACKEND_UNSUPPORTED",
            Error::NoBackend => "NO_BACKEND",
            Error::Permission { .. } => "PERMISSION",
            Error::Server { .. } => "SERVER",
            Error::RecoverableMedia(_) => "RECOVERABLE_MEDIA",
            Error::FatalPlayback(_) => "FATAL_PLAYBACK",
            Error::CollectionConfig(_) => "COLLECTION_CONFIG",
            Error::TicketRedemption(_) => "TICKET_REDEMPTION",
            Error::TicketRequired => "TICKET_REQUIRED",
            Error::Client(_) => "CLIENT",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Destroyed => "DESTROYED",
            Error::Url(_) => "URL",
            Error::Json(_) => "JSON",
        }
    }
}
