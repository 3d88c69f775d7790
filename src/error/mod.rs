// Error types for the shared engine host
//
// This module defines the error types surfaced by the engine registry and the
// host lifecycle delegate, with stable numeric codes for the embedding layer.

mod delegate;
mod registry;

pub use delegate::{log_delegate_error, DelegateError, DelegateErrorCodes};
pub use registry::{RegistryError, RegistryErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the JNI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Broad classes of failure a host adapter has to tell apart.
///
/// Both classes are fatal for the caller: a configuration error means the host
/// asked for something the process never set up, a precondition error means
/// the host drove the delegate out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Precondition,
}
