use std::io;
use thiserror::Error;
use std::str::Utf8Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Invalid duration for {field}: {source}")]
    InvalidDuration { field: &'static str, source: humantime::DurationError },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter found at index {index} ({available} available)")]
    NoAdapter { index: usize, available: usize },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Bluetooth operation took too long: {operation}")]
    DeadlineExceeded { operation: &'static str },
}

impl DeviceError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, DeviceError::Btle { source: btleplug::Error::PermissionDenied })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("The dispatcher has stopped")]
    Stopped,
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to start application (dispatcher): {source}")]
    DispatchError { #[from] source: DispatchError },

    #[error("Failed to start application (runtime): {source}")]
    Runtime { source: io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_not_found_is_recognized() {
        let err = ConfigError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is_file_not_found_error());

        let err = ConfigError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!err.is_file_not_found_error());
    }

    #[test]
    fn permission_denied_is_recognized() {
        assert!(DeviceError::from(btleplug::Error::PermissionDenied).is_permission_denied());
        assert!(!DeviceError::MissingCharacteristic.is_permission_denied());
    }
}
