//! MCP server: request routing over the engine

use crate::protocol::{
    InitializeRequest, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    MCP_VERSION, ServerCapabilities, ServerInfo,
};
use crate::tools;
use lattice_core::Engine;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct McpServer {
    engine: Arc<Engine>,
    initialized: bool,
}

impl McpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        McpServer {
            engine,
            initialized: false,
        }
    }

    /// Handle one request. Notifications return `None` (no response is
    /// written for them).
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "handling request");

        if request.jsonrpc != crate::protocol::JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }
        if !self.initialized
            && !matches!(request.method.as_str(), "initialize" | "notifications/initialized")
        {
            warn!(method = %request.method, "request before initialize");
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => Ok(json!({ "tools": tools::descriptions() })),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Clients reject servers that answer with a newer protocol
        // revision than they asked for.
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version
        } else {
            MCP_VERSION.to_string()
        };
        self.initialized = true;
        info!(version = %negotiated, "mcp session initialized");

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "lattice".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: json!({ "listChanged": false }),
            },
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);

        let result = tools::dispatch(&self.engine, name, args).await?;
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{EngineConfig, HashEmbedder};

    fn server() -> McpServer {
        let dir = std::env::temp_dir().join("lattice-mcp-test");
        let mut config = EngineConfig::new(&dir);
        config.cache_enabled = false;
        let engine = Engine::new(
            config,
            Arc::new(HashEmbedder::new(32)),
            Arc::new(lattice_core::AnalyzerRegistry::new()),
        );
        McpServer::new(Arc::new(engine))
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let mut server = server();
        let response = server
            .handle_request(request("tools/list", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32003);
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let mut server = server();
        let response = server
            .handle_request(request("initialize", None))
            .await
            .unwrap();
        assert!(response.error.is_none());

        let response = server
            .handle_request(request("tools/list", None))
            .await
            .unwrap();
        let tools = response.result.unwrap();
        let names: Vec<&str> = tools["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        for expected in [
            "analyze_file",
            "semantic_search",
            "hybrid_search",
            "pagerank",
            "find_cycles",
            "coupling_report",
            "find_dead_code",
            "find_duplicates",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[tokio::test]
    async fn unknown_method_is_minus_32601() {
        let mut server = server();
        let _ = server.handle_request(request("initialize", None)).await;
        let response = server
            .handle_request(request("tools/nonsense", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let mut server = server();
        let response = server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: None,
                method: "notifications/initialized".to_string(),
                params: None,
            })
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tool_error_is_an_envelope_not_a_protocol_error() {
        let mut server = server();
        let _ = server.handle_request(request("initialize", None)).await;
        // Malformed node key: a tool-level failure inside a successful
        // JSON-RPC response.
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "find_paths", "arguments": {"from": "garbage", "to": "more"}})),
            ))
            .await
            .unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("invalid_argument"));
    }

    #[tokio::test]
    async fn ping_pongs() {
        let mut server = server();
        let _ = server.handle_request(request("initialize", None)).await;
        let response = server.handle_request(request("ping", None)).await.unwrap();
        assert!(response.error.is_none());
    }
}
