//! Error types for the PyPI MCP Server
//!
//! This module defines the error hierarchy for all operations in the server,
//! and the stable error codes reported to MCP clients.

use serde::Serialize;
use thiserror::Error;

/// Main error type for the PyPI MCP Server
#[derive(Error, Debug)]
pub enum PypiMcpError {
    /// Upstream API errors (PyPI, pypistats, OSV)
    #[error("{0}")]
    Pypi(#[from] PypiError),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Upstream API errors
#[derive(Error, Debug)]
pub enum PypiError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Package '{name}' not found")]
    PackageNotFound { name: String },

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Failed to fetch {url} after {attempts} attempts: {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Unexpected response from {url}: {message}")]
    BadResponse { url: String, message: String },
}

/// Cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid invalidation pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to write cache entry {path}: {message}")]
    WriteFailed { path: String, message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to create cache directory: {path}")]
    DirCreationFailed { path: String },

    #[error("Unknown eviction strategy: {name} (expected lru, lfu or ttl)")]
    UnknownEvictionStrategy { name: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid package name: {name}")]
    InvalidPackageName { name: String },

    #[error("Invalid version: {version}")]
    InvalidVersion { version: String },

    #[error("Invalid requirement '{requirement}': {message}")]
    InvalidRequirement { requirement: String, message: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("File must be a .txt or .pip file: {path}")]
    UnsupportedFile { path: String },

    #[error("Permission denied when reading file: {path}")]
    PermissionDenied { path: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown resource: {uri}")]
    UnknownResource { uri: String },

    #[error("Unknown prompt: {name}")]
    UnknownPrompt { name: String },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },
}

/// Stable error codes reported in tool output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidInput,
    NetworkError,
    ParseError,
    FileError,
    PermissionError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::ParseError => "parse_error",
            ErrorCode::FileError => "file_error",
            ErrorCode::PermissionError => "permission_error",
            ErrorCode::UnknownError => "unknown_error",
        }
    }
}

impl PypiMcpError {
    /// Map the error to the code reported to MCP clients
    pub fn code(&self) -> ErrorCode {
        match self {
            PypiMcpError::Pypi(e) => match e {
                PypiError::NotFound { .. } | PypiError::PackageNotFound { .. } => {
                    ErrorCode::NotFound
                }
                PypiError::BadResponse { .. } => ErrorCode::ParseError,
                _ => ErrorCode::NetworkError,
            },
            PypiMcpError::Validation(e) => match e {
                ValidationError::FileNotFound { .. } => ErrorCode::FileError,
                ValidationError::PermissionDenied { .. } => ErrorCode::PermissionError,
                _ => ErrorCode::InvalidInput,
            },
            PypiMcpError::Mcp(_) | PypiMcpError::Config(_) => ErrorCode::InvalidInput,
            PypiMcpError::Json(_) => ErrorCode::ParseError,
            PypiMcpError::Http(_) => ErrorCode::NetworkError,
            PypiMcpError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCode::PermissionError
            }
            PypiMcpError::Io(_) => ErrorCode::FileError,
            PypiMcpError::Cache(_) => ErrorCode::UnknownError,
        }
    }

    /// True when the upstream resource does not exist
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }

    /// Render as the `{"error": {"code", "message"}}` object used in tool output
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code().as_str(),
                "message": self.to_string(),
            }
        })
    }
}

/// Result type alias for PyPI MCP operations
pub type Result<T> = std::result::Result<T, PypiMcpError>;
