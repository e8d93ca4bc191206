//! MCP prompt templates

use serde_json::{Map, Value};

use crate::error::{McpError, Result};
use crate::mcp::types::{GetPromptResult, Prompt, PromptArgument, PromptMessage, ToolResultContent};

struct PromptDef {
    name: &'static str,
    description: &'static str,
    arguments: &'static [(&'static str, &'static str)],
}

const PROMPTS: &[PromptDef] = &[
    PromptDef {
        name: "search_packages_prompt",
        description: "Search for Python packages matching a query",
        arguments: &[("query", "Search terms")],
    },
    PromptDef {
        name: "analyze_package_prompt",
        description: "Analyze a specific Python package",
        arguments: &[("package_name", "Package to analyze")],
    },
    PromptDef {
        name: "compare_packages_prompt",
        description: "Compare two Python packages",
        arguments: &[
            ("package1", "First package"),
            ("package2", "Second package"),
        ],
    },
    PromptDef {
        name: "security_review_prompt",
        description: "Review the known vulnerabilities of a Python package",
        arguments: &[("package_name", "Package to review")],
    },
];

/// Prompt definitions for `prompts/list`
pub fn list_prompts() -> Vec<Prompt> {
    PROMPTS
        .iter()
        .map(|def| Prompt {
            name: def.name.to_string(),
            description: Some(def.description.to_string()),
            arguments: def
                .arguments
                .iter()
                .map(|(name, description)| PromptArgument {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    required: true,
                })
                .collect(),
        })
        .collect()
}

/// Render a prompt with its arguments
pub fn get_prompt(name: &str, arguments: Option<&Map<String, Value>>) -> Result<GetPromptResult> {
    let arg = |key: &str| -> Result<String> {
        arguments
            .and_then(|args| args.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                McpError::InvalidArguments {
                    message: format!("Missing required argument '{}' for prompt {}", key, name),
                }
                .into()
            })
    };

    let (description, text) = match name {
        "search_packages_prompt" => {
            let query = arg("query")?;
            (
                format!("Search for Python packages matching '{}'", query),
                format!(
                    "Search for Python packages that match '{}' and provide a brief description of each result.",
                    query
                ),
            )
        }
        "analyze_package_prompt" => {
            let package = arg("package_name")?;
            (
                format!("Analyze the Python package '{}'", package),
                format!(
                    "Analyze the Python package '{}'. Provide information about its purpose, features, dependencies, and popularity.",
                    package
                ),
            )
        }
        "compare_packages_prompt" => {
            let first = arg("package1")?;
            let second = arg("package2")?;
            (
                format!("Compare the Python packages '{}' and '{}'", first, second),
                format!(
                    "Compare the Python packages '{}' and '{}'. Analyze their features, popularity, maintenance status, and use cases to determine when to use each one.",
                    first, second
                ),
            )
        }
        "security_review_prompt" => {
            let package = arg("package_name")?;
            (
                format!("Review the security of the Python package '{}'", package),
                format!(
                    "Review the security of the Python package '{}'. Use the scan_package_vulnerabilities tool to list its known vulnerabilities, explain the most severe ones, and recommend the lowest version that fixes them.",
                    package
                ),
            )
        }
        _ => {
            return Err(McpError::UnknownPrompt {
                name: name.to_string(),
            }
            .into())
        }
    };

    Ok(GetPromptResult {
        description: Some(description),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: ToolResultContent::Text { text },
        }],
    })
}
