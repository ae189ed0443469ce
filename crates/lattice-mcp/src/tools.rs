//! Tool surface: schemas and dispatch into the engine
//!
//! Each tool maps directly onto one typed engine operation. Tool-level
//! failures come back as error envelopes `{error: {kind, message}}`
//! inside a successful JSON-RPC response; only malformed requests
//! surface as JSON-RPC errors.

use crate::protocol::{CallToolResult, JsonRpcError, ToolDescription};
use lattice_core::algo::CycleScope;
use lattice_core::{CancelToken, CoreError, Engine, NodeKind, SearchOptions};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;

pub fn descriptions() -> Vec<ToolDescription> {
    vec![
        ToolDescription {
            name: "analyze_file",
            description: "Parse and ingest one source file into the knowledge graph.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to the source file"}
                },
                "required": ["path"]
            }),
        },
        ToolDescription {
            name: "analyze_directory",
            description: "Walk a directory (gitignore-aware) and ingest every supported source file.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "recursive": {"type": "boolean", "default": true}
                },
                "required": ["path"]
            }),
        },
        ToolDescription {
            name: "semantic_search",
            description: "Dense embedding search over indexed code entities.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "k": {"type": "integer", "default": 10},
                    "threshold": {"type": "number"},
                    "node_type": {"type": "string", "enum": ["module", "function", "type", "macro", "variable", "file"]}
                },
                "required": ["query"]
            }),
        },
        ToolDescription {
            name: "hybrid_search",
            description: "Full retrieval pipeline: query expansion, dense + lexical candidates, reciprocal-rank fusion, intent-aware re-ranking.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "k": {"type": "integer", "default": 10},
                    "strategy": {"type": "string", "enum": ["hybrid", "semantic"], "default": "hybrid"},
                    "intent": {"type": "string", "enum": ["general", "explain", "refactor", "debug"], "default": "general"},
                    "threshold": {"type": "number"},
                    "node_type": {"type": "string"}
                },
                "required": ["query"]
            }),
        },
        ToolDescription {
            name: "query_graph",
            description: "Filtered node enumeration by kind, name substring and file substring.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "node_type": {"type": "string"},
                    "name_contains": {"type": "string"},
                    "file_contains": {"type": "string"},
                    "limit": {"type": "integer", "default": 100}
                }
            }),
        },
        ToolDescription {
            name: "list_nodes",
            description: "Enumerate nodes in canonical order, optionally by kind.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "node_type": {"type": "string"},
                    "limit": {"type": "integer"}
                }
            }),
        },
        ToolDescription {
            name: "find_paths",
            description: "All simple paths between two nodes (canonical keys such as 'function:auth::validate/1'), bounded by depth and count.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string"},
                    "to": {"type": "string"},
                    "max_depth": {"type": "integer", "default": 5},
                    "max_paths": {"type": "integer", "default": 20}
                },
                "required": ["from", "to"]
            }),
        },
        ToolDescription {
            name: "pagerank",
            description: "PageRank over the call graph (damping 0.85, tolerance 1e-4).",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "degree_centrality",
            description: "In/out/total degree for every node.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "betweenness_centrality",
            description: "Brandes' betweenness over the call graph; large graphs return a budget-truncated partial result.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "closeness_centrality",
            description: "BFS closeness over the call graph; unreachable pairs are skipped.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "detect_communities",
            description: "Connected components of the call graph, weakly connected by default.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "strong": {"type": "boolean", "default": false}
                }
            }),
        },
        ToolDescription {
            name: "graph_stats",
            description: "Node/edge/file/embedding totals and the active model.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "find_cycles",
            description: "Cycle enumeration, rotation-deduplicated, over the module or function graph.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "scope": {"type": "string", "enum": ["module", "function"], "default": "module"},
                    "min_cycle_length": {"type": "integer", "default": 2},
                    "limit": {"type": "integer", "default": 100}
                }
            }),
        },
        ToolDescription {
            name: "coupling_report",
            description: "Afferent/efferent coupling and instability per module.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "module": {"type": "string", "description": "Module name; omitted reports every module"},
                    "transitive": {"type": "boolean", "default": false}
                }
            }),
        },
        ToolDescription {
            name: "find_dead_code",
            description: "Functions no call edge reaches, with a confidence grade.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "find_duplicates",
            description: "Function pairs with near-identical embeddings.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "threshold": {"type": "number"}
                }
            }),
        },
    ]
}

#[derive(Deserialize)]
struct PathParams {
    path: PathBuf,
}

#[derive(Deserialize)]
struct DirectoryParams {
    path: PathBuf,
    #[serde(default = "default_true")]
    recursive: bool,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    k: usize,
    threshold: Option<f32>,
    node_type: Option<String>,
    strategy: Option<String>,
    intent: Option<String>,
}

#[derive(Deserialize, Default)]
struct QueryGraphParams {
    node_type: Option<String>,
    name_contains: Option<String>,
    file_contains: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize, Default)]
struct ListNodesParams {
    node_type: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct FindPathsParams {
    from: String,
    to: String,
    #[serde(default = "default_max_depth")]
    max_depth: usize,
    #[serde(default = "default_max_paths")]
    max_paths: usize,
}

#[derive(Deserialize, Default)]
struct CommunitiesParams {
    #[serde(default)]
    strong: bool,
}

#[derive(Deserialize, Default)]
struct CyclesParams {
    scope: Option<String>,
    #[serde(default = "default_min_cycle")]
    min_cycle_length: usize,
    #[serde(default = "default_cycle_limit")]
    limit: usize,
}

#[derive(Deserialize, Default)]
struct CouplingParams {
    module: Option<String>,
    #[serde(default)]
    transitive: bool,
}

#[derive(Deserialize, Default)]
struct DuplicatesParams {
    threshold: Option<f32>,
}

fn default_true() -> bool {
    true
}
fn default_max_depth() -> usize {
    5
}
fn default_max_paths() -> usize {
    20
}
fn default_min_cycle() -> usize {
    2
}
fn default_cycle_limit() -> usize {
    100
}

/// Run a tool by name. Unknown names and malformed params are
/// request-level JSON-RPC errors; engine failures become error
/// envelopes in the tool result.
pub async fn dispatch(
    engine: &Engine,
    name: &str,
    args: Value,
) -> Result<CallToolResult, JsonRpcError> {
    let cancel = CancelToken::new();
    match name {
        "analyze_file" => {
            let params: PathParams = parse(args)?;
            Ok(envelope(engine.analyze_file(&params.path).await))
        }
        "analyze_directory" => {
            let params: DirectoryParams = parse(args)?;
            Ok(envelope(
                engine.analyze_directory(&params.path, params.recursive).await,
            ))
        }
        "semantic_search" => {
            let params: SearchParams = parse(args)?;
            Ok(match search_options(&params) {
                Ok(opts) => envelope(engine.semantic_search(&params.query, &opts, &cancel).await),
                Err(e) => error_envelope(&e),
            })
        }
        "hybrid_search" => {
            let params: SearchParams = parse(args)?;
            Ok(match search_options(&params) {
                Ok(opts) => envelope(engine.hybrid_search(&params.query, &opts, &cancel).await),
                Err(e) => error_envelope(&e),
            })
        }
        "query_graph" => {
            let params: QueryGraphParams = parse(args)?;
            Ok(match parse_kind(params.node_type.as_deref()) {
                Ok(kind) => {
                    let nodes = engine
                        .query_graph(
                            kind,
                            params.name_contains.as_deref(),
                            params.file_contains.as_deref(),
                            params.limit,
                        )
                        .await;
                    envelope(Ok::<_, CoreError>(nodes))
                }
                Err(e) => error_envelope(&e),
            })
        }
        "list_nodes" => {
            let params: ListNodesParams = parse(args)?;
            Ok(match parse_kind(params.node_type.as_deref()) {
                Ok(kind) => {
                    envelope(Ok::<_, CoreError>(engine.list_nodes(kind, params.limit).await))
                }
                Err(e) => error_envelope(&e),
            })
        }
        "find_paths" => {
            let params: FindPathsParams = parse(args)?;
            Ok(envelope(
                engine
                    .find_paths(
                        &params.from,
                        &params.to,
                        params.max_depth,
                        params.max_paths,
                        &cancel,
                    )
                    .await,
            ))
        }
        "pagerank" => Ok(envelope(engine.pagerank(&cancel).await)),
        "degree_centrality" => Ok(envelope(engine.degree_centrality().await)),
        "betweenness_centrality" => Ok(envelope(engine.betweenness_centrality(&cancel).await)),
        "closeness_centrality" => Ok(envelope(engine.closeness_centrality(&cancel).await)),
        "detect_communities" => {
            let params: CommunitiesParams = parse(args)?;
            Ok(envelope(engine.connected_components(params.strong).await))
        }
        "graph_stats" => Ok(envelope(Ok::<_, CoreError>(engine.graph_stats().await))),
        "find_cycles" => {
            let params: CyclesParams = parse(args)?;
            let scope = match params.scope.as_deref() {
                None | Some("module") => CycleScope::Module,
                Some("function") => CycleScope::Function,
                Some(other) => {
                    return Ok(error_envelope(&CoreError::InvalidArgument(format!(
                        "unknown cycle scope `{other}`"
                    ))));
                }
            };
            Ok(envelope(
                engine
                    .find_cycles(scope, params.min_cycle_length, params.limit, &cancel)
                    .await,
            ))
        }
        "coupling_report" => {
            let params: CouplingParams = parse(args)?;
            Ok(envelope(
                engine
                    .coupling_report(params.module.as_deref(), params.transitive)
                    .await,
            ))
        }
        "find_dead_code" => Ok(envelope(engine.find_dead_code().await)),
        "find_duplicates" => {
            let params: DuplicatesParams = parse(args)?;
            Ok(envelope(engine.find_duplicates(params.threshold).await))
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

fn parse<P: serde::de::DeserializeOwned + 'static>(args: Value) -> Result<P, JsonRpcError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
}

fn search_options(params: &SearchParams) -> Result<SearchOptions, CoreError> {
    Ok(SearchOptions {
        k: params.k,
        threshold: params.threshold,
        intent: parse_variant(params.intent.as_deref(), "intent")?,
        strategy: parse_variant(params.strategy.as_deref(), "strategy")?,
        kind: parse_kind(params.node_type.as_deref())?,
    })
}

fn parse_variant<T: serde::de::DeserializeOwned + Default>(
    raw: Option<&str>,
    what: &str,
) -> Result<T, CoreError> {
    match raw {
        None => Ok(T::default()),
        Some(raw) => serde_json::from_value(Value::String(raw.to_string()))
            .map_err(|_| CoreError::InvalidArgument(format!("unknown {what} `{raw}`"))),
    }
}

fn parse_kind(raw: Option<&str>) -> Result<Option<NodeKind>, CoreError> {
    match raw {
        None => Ok(None),
        Some(raw) => NodeKind::from_str_tag(raw)
            .map(Some)
            .ok_or_else(|| CoreError::InvalidArgument(format!("unknown node type `{raw}`"))),
    }
}

fn envelope<T: serde::Serialize>(result: Result<T, CoreError>) -> CallToolResult {
    match result {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(value) => CallToolResult::ok(value),
            Err(e) => error_envelope(&CoreError::Internal(format!("serialize result: {e}"))),
        },
        Err(e) => error_envelope(&e),
    }
}

fn error_envelope(error: &CoreError) -> CallToolResult {
    CallToolResult::err(json!({
        "error": {
            "kind": error.kind(),
            "message": error.to_string(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_description_has_an_object_schema() {
        for tool in descriptions() {
            assert_eq!(
                tool.input_schema["type"], "object",
                "{} schema must be an object",
                tool.name
            );
        }
    }

    #[test]
    fn kind_parsing_rejects_unknowns() {
        assert_eq!(parse_kind(Some("function")).unwrap(), Some(NodeKind::Function));
        assert!(parse_kind(None).unwrap().is_none());
        assert!(parse_kind(Some("blob")).is_err());
    }

    #[test]
    fn variant_parsing_uses_defaults() {
        use lattice_core::{SearchIntent, SearchStrategy};
        let intent: SearchIntent = parse_variant(None, "intent").unwrap();
        assert_eq!(intent, SearchIntent::General);
        let intent: SearchIntent = parse_variant(Some("refactor"), "intent").unwrap();
        assert_eq!(intent, SearchIntent::Refactor);
        let strategy: Result<SearchStrategy, _> = parse_variant(Some("bogus"), "strategy");
        assert!(strategy.is_err());
    }
}
