//! Error types for key handling and artifact parsing.

use thiserror::Error;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, WireGuardError>;

/// Errors that can occur while handling keys or configuration artifacts.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid CIDR notation.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Invalid endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// An artifact line could not be understood.
    #[error("parse error at line {line}: {message}")]
    ParseError {
        /// 1-based line number (0 when the problem is not tied to a line).
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A NAT rule names a public IPv4 address that is not a dotted quad.
    #[error("invalid public address in NAT rule: {0}")]
    InvalidPublicAddress(String),
}

impl From<base64::DecodeError> for WireGuardError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidBase64(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_names_line() {
        let err = WireGuardError::ParseError {
            line: 7,
            message: "invalid ListenPort".to_string(),
        };
        assert_eq!(err.to_string(), "parse error at line 7: invalid ListenPort");
    }

    #[test]
    fn key_length_display() {
        let err = WireGuardError::InvalidKeyLength(16);
        assert_eq!(err.to_string(), "invalid key length: expected 32, got 16");
    }
}
