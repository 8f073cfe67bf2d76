//! Core error types for heapreplay.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Address text could not be read as a hexadecimal address
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress {
        /// Text as it appeared in the log
        input: String,
        /// Why it was rejected
        reason: String,
    },
}
