// Delegate error types and constants

use crate::delegate::DelegateState;
use crate::error::{ErrorCategory, ErrorCode, RegistryError};
use log::error;
use std::fmt;

/// Delegate error code constants
///
/// Error code range: 3001-3005
pub struct DelegateErrorCodes {}

impl DelegateErrorCodes {
    /// Host asked for a cached engine id that was never registered
    pub const MISSING_CACHED_ENGINE: i32 = 3001;

    /// Operation invoked after `release()`
    pub const RELEASED: i32 = 3002;

    /// Operation invoked in a state that does not allow it
    pub const INVALID_STATE: i32 = 3003;

    /// Operation needs an engine but none is bound
    pub const ENGINE_NOT_BOUND: i32 = 3004;

    /// `attach()` invoked on a delegate that already resolved an engine
    pub const ALREADY_ATTACHED: i32 = 3005;
}

/// Log a delegate error with structured context
///
/// Mirrors the other `log_*_error` helpers: error code, component and message
/// in one line so host logcat output stays greppable.
pub fn log_delegate_error(err: &DelegateError, context: &str) {
    error!(
        "Delegate error in {}: code={}, component=HostDelegate, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors returned by [`crate::delegate::HostDelegate`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateError {
    /// The host's cached engine id is not present in the engine cache
    MissingCachedEngine { engine_id: String },

    /// The delegate was released; nothing may be called on it any more
    Released { operation: &'static str },

    /// The operation is not valid in the delegate's current state
    InvalidState {
        operation: &'static str,
        state: DelegateState,
    },

    /// The operation needs a bound engine
    EngineNotBound { operation: &'static str },

    /// `attach()` was already run for this delegate
    AlreadyAttached,
}

impl DelegateError {
    /// Which side of the taxonomy this error falls on.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DelegateError::MissingCachedEngine { .. } => ErrorCategory::Configuration,
            DelegateError::Released { .. }
            | DelegateError::InvalidState { .. }
            | DelegateError::EngineNotBound { .. }
            | DelegateError::AlreadyAttached => ErrorCategory::Precondition,
        }
    }
}

impl ErrorCode for DelegateError {
    fn code(&self) -> i32 {
        match self {
            DelegateError::MissingCachedEngine { .. } => DelegateErrorCodes::MISSING_CACHED_ENGINE,
            DelegateError::Released { .. } => DelegateErrorCodes::RELEASED,
            DelegateError::InvalidState { .. } => DelegateErrorCodes::INVALID_STATE,
            DelegateError::EngineNotBound { .. } => DelegateErrorCodes::ENGINE_NOT_BOUND,
            DelegateError::AlreadyAttached => DelegateErrorCodes::ALREADY_ATTACHED,
        }
    }

    fn message(&self) -> String {
        match self {
            DelegateError::MissingCachedEngine { engine_id } => format!(
                "The requested cached engine did not exist in the engine cache: '{}'",
                engine_id
            ),
            DelegateError::Released { operation } => format!(
                "Cannot execute {}() on a released delegate",
                operation
            ),
            DelegateError::InvalidState { operation, state } => {
                format!("{}() is not allowed while the delegate is {}", operation, state)
            }
            DelegateError::EngineNotBound { operation } => {
                format!("{}() requires an engine but none is bound", operation)
            }
            DelegateError::AlreadyAttached => {
                "Delegate already attached. Create a new delegate per host instance.".to_string()
            }
        }
    }
}

impl fmt::Display for DelegateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DelegateError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DelegateError {}

/// A missing registry entry at attach time is the host's configuration error.
impl From<RegistryError> for DelegateError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::MissingEntry { engine_id } => {
                DelegateError::MissingCachedEngine { engine_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegate_error_codes() {
        assert_eq!(
            DelegateError::MissingCachedEngine {
                engine_id: "x".to_string()
            }
            .code(),
            DelegateErrorCodes::MISSING_CACHED_ENGINE
        );
        assert_eq!(
            DelegateError::Released { operation: "start" }.code(),
            DelegateErrorCodes::RELEASED
        );
        assert_eq!(
            DelegateError::InvalidState {
                operation: "reattach",
                state: DelegateState::Attached,
            }
            .code(),
            DelegateErrorCodes::INVALID_STATE
        );
        assert_eq!(
            DelegateError::EngineNotBound { operation: "resume" }.code(),
            DelegateErrorCodes::ENGINE_NOT_BOUND
        );
        assert_eq!(
            DelegateError::AlreadyAttached.code(),
            DelegateErrorCodes::ALREADY_ATTACHED
        );
    }

    #[test]
    fn test_categories() {
        let missing = DelegateError::MissingCachedEngine {
            engine_id: "x".to_string(),
        };
        assert_eq!(missing.category(), ErrorCategory::Configuration);
        assert_eq!(
            DelegateError::Released { operation: "stop" }.category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            DelegateError::AlreadyAttached.category(),
            ErrorCategory::Precondition
        );
    }

    #[test]
    fn test_messages() {
        let err = DelegateError::Released {
            operation: "back_pressed",
        };
        assert_eq!(
            err.message(),
            "Cannot execute back_pressed() on a released delegate"
        );

        let err = DelegateError::InvalidState {
            operation: "reattach",
            state: DelegateState::Attached,
        };
        assert!(err.message().contains("ATTACHED"));

        let display = format!("{}", DelegateError::AlreadyAttached);
        assert!(display.contains("DelegateError"));
        assert!(display.contains("3005"));
    }

    #[test]
    fn test_from_registry_error() {
        let err: DelegateError = RegistryError::MissingEntry {
            engine_id: "shared".to_string(),
        }
        .into();
        assert_eq!(
            err,
            DelegateError::MissingCachedEngine {
                engine_id: "shared".to_string()
            }
        );
    }

    #[test]
    fn test_error_propagation() {
        fn lookup() -> Result<(), RegistryError> {
            Err(RegistryError::MissingEntry {
                engine_id: "gone".to_string(),
            })
        }

        fn attach() -> Result<(), DelegateError> {
            lookup()?;
            Ok(())
        }

        let err = attach().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
