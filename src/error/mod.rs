//! Error handling for the CeroCoin node
//!
//! This module provides the error types used across all node operations.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error types for CeroCoin node operations
#[derive(Debug, Clone)]
pub enum NodeError {
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Malformed wire record (cannot be parsed)
    Wire(String),
    /// A parsed record failed signature or structural validation
    Validation(String),
    /// Mining errors (debug-mode iteration cap exceeded)
    Mining(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            NodeError::Network(msg) => write!(f, "Network error: {msg}"),
            NodeError::Wire(msg) => write!(f, "Malformed wire record: {msg}"),
            NodeError::Validation(msg) => write!(f, "Validation failure: {msg}"),
            NodeError::Mining(msg) => write!(f, "Mining error: {msg}"),
            NodeError::Config(msg) => write!(f, "Configuration error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(err: toml::de::Error) -> Self {
        NodeError::Config(err.to_string())
    }
}
