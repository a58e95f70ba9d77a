//! Error types for the allocation engine.

use crate::domain::entities::EntityId;
use crate::ports::outbound::StoreError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AllocationError>;

/// Errors that can occur while fulfilling requests or processing donations.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The backing store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A fulfillment attempt exhausted its commit retries.
    #[error("blood request {request_id} abandoned after {attempts} conflicting commits")]
    RetriesExhausted {
        /// The request that was left unfulfilled.
        request_id: EntityId,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl AllocationError {
    /// True when the failing item can simply be retried on the next sweep.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::RetriesExhausted { .. } => true,
        }
    }

    /// True when the error indicates a broken invariant rather than an
    /// operational failure.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Store(StoreError::Underflow { .. }))
    }
}
