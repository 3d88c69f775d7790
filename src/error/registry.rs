// Engine registry error types and constants

use crate::error::ErrorCode;
use std::fmt;

/// Registry error code constants
///
/// Error code range: 4001
pub struct RegistryErrorCodes {}

impl RegistryErrorCodes {
    /// No engine was registered under the requested id
    pub const MISSING_ENTRY: i32 = 4001;
}

/// Errors raised by [`crate::engine::EngineCache`] lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No engine was registered under the requested id
    MissingEntry { engine_id: String },
}

impl ErrorCode for RegistryError {
    fn code(&self) -> i32 {
        match self {
            RegistryError::MissingEntry { .. } => RegistryErrorCodes::MISSING_ENTRY,
        }
    }

    fn message(&self) -> String {
        match self {
            RegistryError::MissingEntry { engine_id } => {
                format!("No engine registered in the engine cache under '{}'", engine_id)
            }
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegistryError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_code_and_message() {
        let err = RegistryError::MissingEntry {
            engine_id: "shared".to_string(),
        };
        assert_eq!(err.code(), RegistryErrorCodes::MISSING_ENTRY);
        assert!(err.message().contains("'shared'"));
        assert!(format!("{}", err).contains("4001"));
    }
}
