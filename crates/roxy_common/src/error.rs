//! Error types for Roxy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoxyError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid quiet hours {start}-{end}: hours must be in 0..=23")]
    InvalidQuietHours { start: u32, end: u32 },

    #[error("Invalid threshold {name}={value}")]
    InvalidThreshold { name: String, value: f64 },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RoxyError {
    /// Short machine-friendly tag, used in log fields and CLI exit messages
    pub fn kind(&self) -> &'static str {
        match self {
            RoxyError::Store(_) => "store",
            RoxyError::Config(_) => "config",
            RoxyError::InvalidQuietHours { .. } => "quiet_hours",
            RoxyError::InvalidThreshold { .. } => "threshold",
            RoxyError::Toml(_) => "toml",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_hours_message() {
        let err = RoxyError::InvalidQuietHours { start: 25, end: 7 };
        assert!(err.to_string().contains("25-7"));
        assert_eq!(err.kind(), "quiet_hours");
    }

    #[test]
    fn test_toml_error_converts() {
        let parse = toml::from_str::<toml::Value>("key = ").unwrap_err();
        let err: RoxyError = parse.into();
        assert_eq!(err.kind(), "toml");
        assert!(err.to_string().starts_with("TOML error"));
    }

    #[test]
    fn test_store_message() {
        let err = RoxyError::Store("Failed to write /tmp/x: denied".to_string());
        assert_eq!(err.to_string(), "Store error: Failed to write /tmp/x: denied");
        assert_eq!(err.kind(), "store");
    }
}
