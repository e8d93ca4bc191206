//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations. Input schemas are
//! generated from the argument structs, which are validated before dispatch.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::error::{McpError, PypiMcpError, Result};
use crate::pypi::client::DEFAULT_TREE_DEPTH;
use crate::pypi::utils::{sanitize_package_name, sanitize_version};
use crate::pypi::PypiClient;
use crate::security::{format_report, SecurityScanner};
use crate::mcp::types::{CallToolResult, Tool};

// ==================== Argument Types ====================

fn valid_package_name(name: &str) -> std::result::Result<(), validator::ValidationError> {
    sanitize_package_name(name)
        .map(|_| ())
        .map_err(|_| validator::ValidationError::new("invalid_package_name"))
}

fn valid_version(version: &str) -> std::result::Result<(), validator::ValidationError> {
    sanitize_version(version)
        .map(|_| ())
        .map_err(|_| validator::ValidationError::new("invalid_version"))
}

fn valid_report_format(format: &str) -> std::result::Result<(), validator::ValidationError> {
    match format {
        "json" | "markdown" => Ok(()),
        _ => Err(validator::ValidationError::new("expected json or markdown")),
    }
}

/// No arguments
#[derive(Debug, Default, Deserialize, JsonSchema, Validate)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct PackageArgs {
    /// Name of the package on PyPI
    #[validate(custom = "valid_package_name")]
    pub package_name: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct PackageVersionArgs {
    /// Name of the package on PyPI
    #[validate(custom = "valid_package_name")]
    pub package_name: String,
    /// Release version
    #[validate(custom = "valid_version")]
    pub version: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct OptionalVersionArgs {
    /// Name of the package on PyPI
    #[validate(custom = "valid_package_name")]
    pub package_name: String,
    /// Release version; the latest release when omitted
    #[validate(custom = "valid_version")]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct WheelUrlArgs {
    /// Name of the package on PyPI
    #[validate(custom = "valid_package_name")]
    pub package_name: String,
    /// Release version
    #[validate(custom = "valid_version")]
    pub version: String,
    /// Python tag, e.g. `py3` or `cp311`
    #[validate(length(min = 1))]
    pub python_tag: String,
    /// ABI tag, e.g. `none` or `cp311`
    #[validate(length(min = 1))]
    pub abi_tag: String,
    /// Platform tag, e.g. `any` or `manylinux_2_17_x86_64`
    #[validate(length(min = 1))]
    pub platform_tag: String,
    /// Optional build tag
    pub build_tag: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct SearchArgs {
    /// Search terms
    #[validate(length(min = 1, max = 200))]
    pub query: String,
    /// Result page, starting at 1
    #[validate(range(min = 1, max = 500))]
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CompareVersionsArgs {
    /// Name of the package on PyPI
    #[validate(custom = "valid_package_name")]
    pub package_name: String,
    /// First version
    #[validate(custom = "valid_version")]
    pub version1: String,
    /// Second version
    #[validate(custom = "valid_version")]
    pub version2: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct DependencyTreeArgs {
    /// Name of the package on PyPI
    #[validate(custom = "valid_package_name")]
    pub package_name: String,
    /// Root version; the latest release when omitted
    #[validate(custom = "valid_version")]
    pub version: Option<String>,
    /// Levels to expand (default 3)
    #[validate(range(min = 1, max = 6))]
    pub depth: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct FileArgs {
    /// Path to a requirements file (.txt or .pip)
    #[validate(length(min = 1))]
    pub file_path: String,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ScanFileArgs {
    /// Path to a requirements file (.txt or .pip)
    #[validate(length(min = 1))]
    pub file_path: String,
    /// `json` (default) or `markdown`
    #[validate(custom = "valid_report_format")]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct ClearCacheArgs {
    /// Regex over cache keys; everything is cleared when omitted
    #[validate(length(min = 1))]
    pub pattern: Option<String>,
}

/// Decode and validate tool arguments
pub fn parse_args<T>(args: Value) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let args = if args.is_null() { json!({}) } else { args };
    let parsed: T = serde_json::from_value(args).map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    parsed.validate().map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    Ok(parsed)
}

/// JSON schema for an argument struct, without the meta keys
pub fn input_schema<T: JsonSchema>() -> Value {
    let mut schema =
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object
            .entry("properties")
            .or_insert_with(|| json!({}));
    }
    schema
}

fn respond<T: Serialize>(tool: &str, result: Result<T>) -> CallToolResult {
    match result {
        Ok(value) => CallToolResult::json(&value),
        Err(e) => {
            tracing::warn!("Tool {} failed: {}", tool, e);
            CallToolResult::error(&e)
        }
    }
}

// ==================== Handler ====================

/// Tool handler
pub struct ToolHandler {
    pypi: Arc<PypiClient>,
    scanner: Arc<SecurityScanner>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(pypi: Arc<PypiClient>, scanner: Arc<SecurityScanner>) -> Self {
        Self { pypi, scanner }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def("get_package_info", "Get detailed information about a Python package from PyPI", input_schema::<PackageArgs>()),
            tool_def("get_latest_version", "Get the latest version of a package", input_schema::<PackageArgs>()),
            tool_def("get_package_releases", "List all released versions of a package, oldest first", input_schema::<PackageArgs>()),
            tool_def("get_release_urls", "Get download URLs for the files of a specific release", input_schema::<PackageVersionArgs>()),
            tool_def("get_source_url", "Build the source distribution URL for a release", input_schema::<PackageVersionArgs>()),
            tool_def("get_wheel_url", "Build the wheel URL for a release and set of wheel tags", input_schema::<WheelUrlArgs>()),
            tool_def("get_newest_packages", "Get the newest packages registered on PyPI", input_schema::<NoArgs>()),
            tool_def("get_latest_updates", "Get the latest package releases on PyPI", input_schema::<NoArgs>()),
            tool_def("get_project_releases", "Get the release feed of a project", input_schema::<PackageArgs>()),
            tool_def("search_packages", "Search PyPI for packages", input_schema::<SearchArgs>()),
            tool_def("compare_versions", "Compare two versions of a package using PEP 440 ordering", input_schema::<CompareVersionsArgs>()),
            tool_def("get_dependencies", "Get the direct dependencies of a package", input_schema::<OptionalVersionArgs>()),
            tool_def("get_dependency_tree", "Resolve the dependency tree of a package", input_schema::<DependencyTreeArgs>()),
            tool_def("check_package_exists", "Check whether a package exists on PyPI", input_schema::<PackageArgs>()),
            tool_def("get_package_metadata", "Get the metadata of a package release", input_schema::<OptionalVersionArgs>()),
            tool_def("get_package_stats", "Get recent download statistics for a package", input_schema::<PackageArgs>()),
            tool_def("get_documentation_url", "Find the documentation URL of a package", input_schema::<PackageArgs>()),
            tool_def("check_requirements_file", "Check a requirements file for outdated packages", input_schema::<FileArgs>()),
            tool_def("scan_package_vulnerabilities", "Scan a package version for known vulnerabilities (OSV)", input_schema::<OptionalVersionArgs>()),
            tool_def("scan_requirements_file", "Scan every package of a requirements file for known vulnerabilities", input_schema::<ScanFileArgs>()),
            tool_def("get_cache_stats", "Get response cache statistics", input_schema::<NoArgs>()),
            tool_def("clear_cache", "Clear the response cache, optionally only keys matching a pattern", input_schema::<ClearCacheArgs>()),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        tracing::debug!("Calling tool {}", name);
        match name {
            "get_package_info" => self.handle_get_package_info(args).await,
            "get_latest_version" => self.handle_get_latest_version(args).await,
            "get_package_releases" => self.handle_get_package_releases(args).await,
            "get_release_urls" => self.handle_get_release_urls(args).await,
            "get_source_url" => self.handle_get_source_url(args),
            "get_wheel_url" => self.handle_get_wheel_url(args),
            "get_newest_packages" => self.handle_get_newest_packages(args).await,
            "get_latest_updates" => self.handle_get_latest_updates(args).await,
            "get_project_releases" => self.handle_get_project_releases(args).await,
            "search_packages" => self.handle_search_packages(args).await,
            "compare_versions" => self.handle_compare_versions(args),
            "get_dependencies" => self.handle_get_dependencies(args).await,
            "get_dependency_tree" => self.handle_get_dependency_tree(args).await,
            "check_package_exists" => self.handle_check_package_exists(args).await,
            "get_package_metadata" => self.handle_get_package_metadata(args).await,
            "get_package_stats" => self.handle_get_package_stats(args).await,
            "get_documentation_url" => self.handle_get_documentation_url(args).await,
            "check_requirements_file" => self.handle_check_requirements_file(args).await,
            "scan_package_vulnerabilities" => self.handle_scan_package(args).await,
            "scan_requirements_file" => self.handle_scan_requirements_file(args).await,
            "get_cache_stats" => self.handle_get_cache_stats(args),
            "clear_cache" => self.handle_clear_cache(args),
            _ => CallToolResult::error(&PypiMcpError::Mcp(McpError::UnknownTool {
                name: name.to_string(),
            })),
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_get_package_info(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("get_package_info", self.pypi.get_package_info(&args.package_name).await)
    }

    async fn handle_get_latest_version(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("get_latest_version", self.pypi.get_latest_version(&args.package_name).await)
    }

    async fn handle_get_package_releases(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("get_package_releases", self.pypi.get_package_releases(&args.package_name).await)
    }

    async fn handle_get_release_urls(&self, args: Value) -> CallToolResult {
        let args: PackageVersionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "get_release_urls",
            self.pypi.get_release_urls(&args.package_name, &args.version).await,
        )
    }

    fn handle_get_source_url(&self, args: Value) -> CallToolResult {
        let args: PackageVersionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("get_source_url", self.pypi.get_source_url(&args.package_name, &args.version))
    }

    fn handle_get_wheel_url(&self, args: Value) -> CallToolResult {
        let args: WheelUrlArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "get_wheel_url",
            self.pypi.get_wheel_url(
                &args.package_name,
                &args.version,
                &args.python_tag,
                &args.abi_tag,
                &args.platform_tag,
                args.build_tag.as_deref(),
            ),
        )
    }

    async fn handle_get_newest_packages(&self, args: Value) -> CallToolResult {
        if let Err(e) = parse_args::<NoArgs>(args) {
            return CallToolResult::error(&e);
        }
        respond("get_newest_packages", self.pypi.get_newest_packages().await)
    }

    async fn handle_get_latest_updates(&self, args: Value) -> CallToolResult {
        if let Err(e) = parse_args::<NoArgs>(args) {
            return CallToolResult::error(&e);
        }
        respond("get_latest_updates", self.pypi.get_latest_updates().await)
    }

    async fn handle_get_project_releases(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("get_project_releases", self.pypi.get_project_releases(&args.package_name).await)
    }

    async fn handle_search_packages(&self, args: Value) -> CallToolResult {
        let args: SearchArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "search_packages",
            self.pypi.search_packages(&args.query, args.page.unwrap_or(1)).await,
        )
    }

    fn handle_compare_versions(&self, args: Value) -> CallToolResult {
        let args: CompareVersionsArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "compare_versions",
            self.pypi.compare_versions(&args.package_name, &args.version1, &args.version2),
        )
    }

    async fn handle_get_dependencies(&self, args: Value) -> CallToolResult {
        let args: OptionalVersionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "get_dependencies",
            self.pypi
                .get_dependencies(&args.package_name, args.version.as_deref())
                .await,
        )
    }

    async fn handle_get_dependency_tree(&self, args: Value) -> CallToolResult {
        let args: DependencyTreeArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "get_dependency_tree",
            self.pypi
                .get_dependency_tree(
                    &args.package_name,
                    args.version.as_deref(),
                    args.depth.unwrap_or(DEFAULT_TREE_DEPTH),
                )
                .await,
        )
    }

    async fn handle_check_package_exists(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("check_package_exists", self.pypi.check_package_exists(&args.package_name).await)
    }

    async fn handle_get_package_metadata(&self, args: Value) -> CallToolResult {
        let args: OptionalVersionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "get_package_metadata",
            self.pypi
                .get_package_metadata(&args.package_name, args.version.as_deref())
                .await,
        )
    }

    async fn handle_get_package_stats(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond("get_package_stats", self.pypi.get_package_stats(&args.package_name).await)
    }

    async fn handle_get_documentation_url(&self, args: Value) -> CallToolResult {
        let args: PackageArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "get_documentation_url",
            self.pypi.get_documentation_url(&args.package_name).await,
        )
    }

    async fn handle_check_requirements_file(&self, args: Value) -> CallToolResult {
        let args: FileArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "check_requirements_file",
            self.pypi.check_requirements_file(&args.file_path).await,
        )
    }

    async fn handle_scan_package(&self, args: Value) -> CallToolResult {
        let args: OptionalVersionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };
        respond(
            "scan_package_vulnerabilities",
            self.scanner
                .scan_package(&args.package_name, args.version.as_deref())
                .await,
        )
    }

    async fn handle_scan_requirements_file(&self, args: Value) -> CallToolResult {
        let args: ScanFileArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };

        match self.scanner.scan_requirements_file(&args.file_path).await {
            Ok(report) if args.format.as_deref() == Some("markdown") => {
                CallToolResult::text(format_report(&report))
            }
            result => respond("scan_requirements_file", result),
        }
    }

    fn handle_get_cache_stats(&self, args: Value) -> CallToolResult {
        if let Err(e) = parse_args::<NoArgs>(args) {
            return CallToolResult::error(&e);
        }
        CallToolResult::json(&self.pypi.cache().stats())
    }

    fn handle_clear_cache(&self, args: Value) -> CallToolResult {
        let args: ClearCacheArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return CallToolResult::error(&e),
        };

        let cache = self.pypi.cache();
        match args.pattern {
            Some(pattern) => respond(
                "clear_cache",
                cache
                    .invalidate_pattern(&pattern)
                    .map(|removed| json!({"status": "cleared", "pattern": pattern, "removed": removed})),
            ),
            None => {
                cache.clear();
                CallToolResult::json(&json!({"status": "cleared"}))
            }
        }
    }
}

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args_valid() {
        let args: DependencyTreeArgs =
            parse_args(json!({"package_name": "requests", "depth": 2})).unwrap();
        assert_eq!(args.package_name, "requests");
        assert_eq!(args.depth, Some(2));
        assert!(args.version.is_none());
    }

    #[test]
    fn test_parse_args_rejects_invalid_values() {
        let err = parse_args::<DependencyTreeArgs>(json!({"package_name": "requests", "depth": 9}))
            .unwrap_err();
        assert_eq!(err.code().as_str(), "invalid_input");

        assert!(parse_args::<PackageArgs>(json!({"package_name": "bad name"})).is_err());
        assert!(parse_args::<PackageArgs>(json!({})).is_err());
        assert!(parse_args::<OptionalVersionArgs>(json!({"package_name": "x", "version": "1 0"})).is_err());
        assert!(parse_args::<ScanFileArgs>(json!({"file_path": "r.txt", "format": "xml"})).is_err());
    }

    #[test]
    fn test_parse_args_null_is_empty_object() {
        assert!(parse_args::<NoArgs>(Value::Null).is_ok());
        let args: ClearCacheArgs = parse_args(Value::Null).unwrap();
        assert!(args.pattern.is_none());
    }

    #[test]
    fn test_generated_schema() {
        let schema = input_schema::<CompareVersionsArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"]["version1"].is_object());

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"package_name"));
        assert!(required.contains(&"version2"));

        let optional = input_schema::<OptionalVersionArgs>();
        let required = optional["required"].as_array().unwrap();
        assert!(!required.iter().any(|v| v == "version"));

        assert!(input_schema::<NoArgs>()["properties"].is_object());
    }
}
