//! PyPI integration
//!
//! HTTP plumbing, the high-level client, and the Python packaging standards
//! (PEP 440 versions, PEP 508 requirements) the client relies on.

pub mod client;
pub mod feeds;
pub mod http;
pub mod requirements;
pub mod search;
pub mod types;
pub mod utils;
pub mod version;

pub use client::PypiClient;
pub use http::HttpClient;
pub use version::Version;
