use thiserror::Error;

use crate::memory::Address;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid address {address:#x}")]
    InvalidAddress { address: Address },

    #[error("Failed to change page protection at {address:#x}: {message}")]
    ProtectionChangeFailed { address: Address, message: String },

    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Target {address:#x} is already hooked")]
    AlreadyHooked { address: Address },

    #[error("Failed to create hook at {address:#x}: {reason}")]
    HookCreateFailed { address: Address, reason: String },

    #[error("Failed to enable hook at {address:#x}: {reason}")]
    HookEnableFailed { address: Address, reason: String },

    #[error("Hook backend error: {0}")]
    HookBackend(String),

    #[error("Offset registry is not valid")]
    RegistryInvalid,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.is_not_found());

        let other_io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err2 = Error::Io(other_io_err);
        assert!(!err2.is_not_found());
    }

    #[test]
    fn test_address_formatting() {
        let err = Error::InvalidAddress { address: 0x7FF6_0000_1234 };
        assert_eq!(err.to_string(), "Invalid address 0x7ff600001234");
    }
}
