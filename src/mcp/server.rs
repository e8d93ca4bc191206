//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport.

use std::io::{BufRead, Write};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cache::HybridCache;
use crate::config::Config;
use crate::error::{ErrorCode, PypiMcpError, Result};
use crate::mcp::prompts;
use crate::mcp::resources::ResourceHandler;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;
use crate::pypi::PypiClient;
use crate::security::SecurityScanner;

/// MCP Server info
const SERVER_NAME: &str = "pypi";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server for PyPI
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Resource handler
    resource_handler: ResourceHandler,

    /// Whether the client sent `notifications/initialized`
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(pypi: Arc<PypiClient>, scanner: Arc<SecurityScanner>) -> Self {
        Self {
            tool_handler: ToolHandler::new(pypi.clone(), scanner.clone()),
            resource_handler: ResourceHandler::new(pypi, scanner),
            initialized: false,
        }
    }

    /// Build the cache, PyPI client and scanner from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = Arc::new(HybridCache::from_config(config)?);
        let pypi = Arc::new(PypiClient::new(config, cache)?);
        let scanner = Arc::new(SecurityScanner::new(pypi.clone(), config.osv_url.clone()));
        Ok(Self::new(pypi, scanner))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server on stdio
    pub async fn run_stdio(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.run(stdin.lock(), stdout).await
    }

    /// Serve newline-delimited JSON-RPC until the reader is exhausted
    pub async fn run<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> Result<()> {
        tracing::info!("PyPI MCP server v{} ready", SERVER_VERSION);

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match self.handle_message(&line).await {
                Ok(Some(response)) => {
                    let response_str = serde_json::to_string(&response)?;
                    writeln!(writer, "{}", response_str)?;
                    writer.flush()?;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Error handling message: {}", e);
                }
            }
        }

        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle an incoming JSON-RPC message
    pub async fn handle_message(&mut self, message: &str) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("Unreadable message: {}", e);
                return Ok(Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(e.to_string()),
                )));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return Ok(None);
        }

        if request.jsonrpc != JSONRPC_VERSION {
            return Ok(Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            )));
        }

        tracing::debug!("Request {}", request.method);
        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            methods::INITIALIZE => to_result(self.initialize_result()),
            methods::PING => Ok(serde_json::json!({})),
            methods::LIST_TOOLS => to_result(ListToolsResult {
                tools: self.tool_handler.list_tools(),
            }),
            methods::CALL_TOOL => self.handle_call_tool(&request).await,
            methods::LIST_RESOURCES => to_result(ListResourcesResult {
                resources: self.resource_handler.list_resources(),
            }),
            methods::LIST_RESOURCE_TEMPLATES => to_result(ListResourceTemplatesResult {
                resource_templates: self.resource_handler.list_templates(),
            }),
            methods::READ_RESOURCE => self.handle_read_resource(&request).await,
            methods::LIST_PROMPTS => to_result(ListPromptsResult {
                prompts: prompts::list_prompts(),
            }),
            methods::GET_PROMPT => self.handle_get_prompt(&request),
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        Ok(Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        }))
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        if request.method == methods::INITIALIZED {
            self.initialized = true;
            tracing::info!("Client initialized");
        } else {
            tracing::debug!("Ignoring notification {}", request.method);
        }
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability::default()),
                prompts: Some(PromptsCapability::default()),
            },
        }
    }

    /// Handle call tool request. Tool failures are reported in the result.
    async fn handle_call_tool(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = params(request)?;
        let result = self.tool_handler.call_tool(&params.name, params.arguments).await;
        to_result(result)
    }

    async fn handle_read_resource(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: ReadResourceParams = params(request)?;
        match self.resource_handler.read(&params.uri).await {
            Ok(result) => to_result(result),
            Err(e) => Err(rpc_error(&e)),
        }
    }

    fn handle_get_prompt(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: GetPromptParams = params(request)?;
        match prompts::get_prompt(&params.name, params.arguments.as_ref()) {
            Ok(result) => to_result(result),
            Err(e) => Err(rpc_error(&e)),
        }
    }
}

fn params<T: serde::de::DeserializeOwned>(request: &JsonRpcRequest) -> std::result::Result<T, JsonRpcError> {
    let value = request
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Missing params for {}", request.method)))?;
    serde_json::from_value(value)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params for {}: {}", request.method, e)))
}

fn to_result<T: Serialize>(value: T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

/// Bad input from the client is -32602, anything else -32603
fn rpc_error(error: &PypiMcpError) -> JsonRpcError {
    match error.code() {
        ErrorCode::InvalidInput => JsonRpcError {
            data: Some(serde_json::json!({"code": error.code().as_str()})),
            ..JsonRpcError::invalid_params(error.to_string())
        },
        _ => JsonRpcError::from_error(error),
    }
}
