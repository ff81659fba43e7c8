//! Error Taxonomy
//!
//! Every fallible operation in the sync core resolves to one of these
//! kinds. `InvalidArgument` and `Conflict` are rejected before any store
//! round-trip; `StoreUnavailable` is transient and retried for
//! subscriptions but surfaced to the caller for writes.

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the sync core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The operation requires a resolved identity.
    #[error("operation requires an authenticated user")]
    Unauthenticated,

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller supplied an argument the operation rejects outright.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation would duplicate or contradict existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Either user has blocked the other.
    #[error("either user has blocked the other")]
    Blocked,

    /// The underlying store failed transiently.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Error {
    /// Shorthand for an `InvalidArgument` with a formatted message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for a `Conflict` with a formatted message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether the error is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
