//! Error types for statuscast.
//!
//! Every failure mode is strongly typed using thiserror. Most of them are
//! absorbed inside a poll cycle (feed, delivery, single subscription) and only
//! surface in logs and the cycle report; persistence failures are the one
//! kind that escapes `run_cycle`.

use thiserror::Error;

/// Validation errors raised at the subscription-write and configuration boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Blank or whitespace-only subscriber id.
    #[error("Subscriber id cannot be empty")]
    EmptySubscriberId,

    /// Impact level outside `none|minor|major|critical`.
    #[error("Unknown impact level '{value}' (expected none, minor, major or critical)")]
    UnknownImpactLevel {
        /// The rejected input.
        value: String,
    },

    /// Event-type filter in none of the accepted encodings.
    #[error("Unknown event type filter '{value}' (expected all, incidents or maintenance)")]
    UnknownEventTypeFilter {
        /// The rejected input.
        value: String,
    },

    /// A filter entry or id is longer than allowed.
    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        /// Offending field name.
        field: String,
        /// Limit in characters.
        max_length: usize,
    },

    /// A filter set holds more entries than allowed.
    #[error("Too many entries in '{field}' (max: {max})")]
    TooManyEntries {
        /// Offending field name.
        field: String,
        /// Entry limit.
        max: usize,
    },

    /// Out-of-bounds or unreadable configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong, including the file path when loaded from disk.
        reason: String,
    },
}

/// Transient failures fetching one category of the upstream feed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The category could not be fetched at all.
    #[error("Feed category '{category}' unavailable: {message}")]
    Unavailable {
        /// Category that failed.
        category: String,
        /// Transport or I/O detail.
        message: String,
    },

    /// The category's document was fetched but is not usable.
    #[error("Feed document for '{category}' is malformed: {message}")]
    Malformed {
        /// Category that failed.
        category: String,
        /// Parse detail.
        message: String,
    },
}

/// Failure delivering one notification to one subscriber.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The messaging platform refused the message (blocked bot, bad chat).
    #[error("Delivery rejected for subscriber {subscriber}: {reason}")]
    Rejected {
        /// Recipient.
        subscriber: String,
        /// Platform-supplied reason.
        reason: String,
    },

    /// The messaging platform could not be reached.
    #[error("Subscriber {subscriber} unreachable: {message}")]
    Unreachable {
        /// Recipient.
        subscriber: String,
        /// Transport detail.
        message: String,
    },

    /// The delivery did not settle in time.
    #[error("Delivery to subscriber {subscriber} timed out after {duration_ms}ms")]
    Timeout {
        /// Recipient.
        subscriber: String,
        /// Elapsed time before giving up.
        duration_ms: u64,
    },
}

/// Errors raised by the change-state persistence layer.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the state failed.
    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another store holds the state directory.
    #[error("State is locked by another process: {path}")]
    Locked {
        /// Locked directory.
        path: String,
    },

    /// The state could not be encoded.
    #[error("State serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure (poisoned lock, injected failure).
    #[error("State backend error: {0}")]
    Backend(String),
}

/// Errors raised by a subscriber directory backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No subscription for this subscriber.
    #[error("Subscriber not found: {0}")]
    NotFound(String),

    /// The directory's storage failed.
    #[error("Directory backend error: {0}")]
    Backend(String),

    /// A stored record or a command failed validation.
    #[error("Malformed subscription record: {0}")]
    Malformed(String),
}

/// Top-level error type for statuscast.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Rejected input or configuration.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Upstream feed failure.
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Outbound delivery failure.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Change-state persistence failure.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Subscriber directory failure.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Invariant broken inside the crate.
    #[error("Internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl WatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a persistence error.
    #[must_use]
    pub const fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if re-invoking the cycle sooner could succeed.
    ///
    /// The core never retries on its own; this is advice for the scheduler.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Feed(_) | Self::Delivery(_) => true,
            Self::State(e) => matches!(e, StateError::Io(_) | StateError::Locked { .. }),
            Self::Directory(e) => matches!(e, DirectoryError::Backend(_)),
        }
    }
}

/// Result type alias for statuscast operations.
pub type WatchResult<T> = Result<T, WatchError>;
