//! MCP resources
//!
//! Read-only JSON views addressed by `pypi://` URIs.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{McpError, Result};
use crate::mcp::types::{ReadResourceResult, Resource, ResourceContent, ResourceTemplate};
use crate::pypi::utils::sanitize_package_name;
use crate::pypi::PypiClient;
use crate::security::SecurityScanner;

const SCHEME: &str = "pypi://";
const JSON_MIME: &str = "application/json";

/// URI of the cache statistics resource
pub const CACHE_STATS_URI: &str = "pypi://cache/stats";

/// Resource handler
pub struct ResourceHandler {
    pypi: Arc<PypiClient>,
    scanner: Arc<SecurityScanner>,
}

impl ResourceHandler {
    pub fn new(pypi: Arc<PypiClient>, scanner: Arc<SecurityScanner>) -> Self {
        Self { pypi, scanner }
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        vec![Resource {
            uri: CACHE_STATS_URI.to_string(),
            name: "cache_stats".to_string(),
            description: Some("Response cache statistics".to_string()),
            mime_type: Some(JSON_MIME.to_string()),
        }]
    }

    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        vec![
            template("package", "Package information"),
            template("stats", "Package download statistics"),
            template("dependencies", "Package dependencies"),
            template("vulnerabilities", "Known vulnerabilities of the latest release"),
        ]
    }

    /// Read a resource by URI
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        tracing::debug!("Reading resource {}", uri);

        if uri == CACHE_STATS_URI {
            return contents(uri, &self.pypi.cache().stats());
        }

        let (kind, name) = parse_uri(uri)?;
        let name = sanitize_package_name(name)?;
        match kind {
            "package" => contents(uri, &self.pypi.get_package_info(&name).await?),
            "stats" => contents(uri, &self.pypi.get_package_stats(&name).await?),
            "dependencies" => contents(uri, &self.pypi.get_dependencies(&name, None).await?),
            "vulnerabilities" => contents(uri, &self.scanner.scan_package(&name, None).await?),
            _ => Err(unknown(uri)),
        }
    }
}

fn template(kind: &str, description: &str) -> ResourceTemplate {
    ResourceTemplate {
        uri_template: format!("{}{}/{{name}}", SCHEME, kind),
        name: format!("package_{}", kind),
        description: Some(description.to_string()),
        mime_type: Some(JSON_MIME.to_string()),
    }
}

/// Split `pypi://{kind}/{name}`
fn parse_uri(uri: &str) -> Result<(&str, &str)> {
    let rest = uri.strip_prefix(SCHEME).ok_or_else(|| unknown(uri))?;
    match rest.split_once('/') {
        Some((kind, name)) if !name.is_empty() && !name.contains('/') => Ok((kind, name)),
        _ => Err(unknown(uri)),
    }
}

fn unknown(uri: &str) -> crate::error::PypiMcpError {
    McpError::UnknownResource {
        uri: uri.to_string(),
    }
    .into()
}

fn contents<T: Serialize>(uri: &str, value: &T) -> Result<ReadResourceResult> {
    Ok(ReadResourceResult {
        contents: vec![ResourceContent {
            uri: uri.to_string(),
            mime_type: Some(JSON_MIME.to_string()),
            text: serde_json::to_string_pretty(value)?,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        assert_eq!(parse_uri("pypi://package/requests").unwrap(), ("package", "requests"));
        assert_eq!(parse_uri("pypi://stats/flask").unwrap(), ("stats", "flask"));
        assert!(parse_uri("http://package/requests").is_err());
        assert!(parse_uri("pypi://package/").is_err());
        assert!(parse_uri("pypi://package").is_err());
        assert!(parse_uri("pypi://package/a/b").is_err());
    }

    #[test]
    fn test_template_uris() {
        let t = template("dependencies", "deps");
        assert_eq!(t.uri_template, "pypi://dependencies/{name}");
        assert_eq!(t.mime_type.as_deref(), Some("application/json"));
    }
}
