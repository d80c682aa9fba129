//! Error types for the Order Management System

use thiserror::Error;

/// OMS-specific error types.
#[derive(Error, Debug)]
pub enum OmsError {
    /// Order failed validation before it was accepted for submission.
    #[error("invalid order: {reason}")]
    InvalidOrder {
        /// Why the order was rejected.
        reason: String,
    },

    /// The OMS has not been started, or has been stopped.
    #[error("order management system is not running")]
    NotRunning,
}

/// Type alias for OMS results.
pub type OmsResult<T> = Result<T, OmsError>;
