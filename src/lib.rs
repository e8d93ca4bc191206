//! PyPI MCP Server Library
//!
//! A Model Context Protocol (MCP) server for the Python Package Index.
//! Provides tools for package metadata, dependency analysis, version
//! comparison and vulnerability scanning, backed by a hybrid response cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod mcp;
pub mod pypi;
pub mod security;

pub use config::Config;
pub use error::{PypiMcpError, Result};
