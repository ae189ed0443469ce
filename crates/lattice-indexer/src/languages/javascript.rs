//! JavaScript / TypeScript front-end using tree-sitter
//!
//! One front-end covers both grammars; the parser pool picks the grammar
//! by extension and the node shapes relevant here are shared.

use super::{module_name_for, span, text};
use crate::parser_pool::{FileType, ParseRequest, ParserPool};
use lattice_core::ingest::{
    AnalyzedFile, EdgeDecl, FunctionRecord, ItemRecord, ModuleRecord, SymbolRef,
};
use lattice_core::{CoreResult, EdgeKind, FileAnalyzer, Language, NodeKind, Visibility};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Node;

pub struct JavaScriptFrontend {
    pool: ParserPool,
}

impl JavaScriptFrontend {
    pub fn new(pool: ParserPool) -> Self {
        JavaScriptFrontend { pool }
    }
}

impl FileAnalyzer for JavaScriptFrontend {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs", "ts", "tsx"]
    }

    fn analyze(&self, bytes: &[u8], path: &Path) -> CoreResult<AnalyzedFile> {
        let file_type = match Language::from_path(path) {
            Language::TypeScript => FileType::TypeScript,
            _ => FileType::JavaScript,
        };
        let content = String::from_utf8_lossy(bytes).into_owned();
        let parsed = self.pool.parse_blocking(ParseRequest {
            file_type,
            content,
            path: path.to_path_buf(),
        })?;

        let module = module_name_for(path);
        let mut payload = AnalyzedFile {
            path: path.to_path_buf(),
            language: Some(Language::from_path(path)),
            modules: vec![ModuleRecord {
                name: module.clone(),
                span: None,
                doc: None,
                visibility: Visibility::Public,
            }],
            ..Default::default()
        };

        walk(
            parsed.tree.root_node(),
            &parsed.content,
            &module,
            None,
            None,
            &mut payload,
        );
        Ok(payload)
    }
}

struct EnclosingFn {
    module: String,
    name: String,
    arity: u32,
}

fn walk(
    node: Node,
    source: &str,
    module: &str,
    class: Option<&str>,
    enclosing: Option<&EnclosingFn>,
    payload: &mut AnalyzedFile,
) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            if let Some(function) = extract_function(node, source, module, class, payload) {
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, source, module, class, Some(&function), payload);
                }
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let class_name = text(name_node, source).to_string();
                payload.items.push(ItemRecord {
                    kind: NodeKind::Type,
                    module: module.to_string(),
                    name: class_name.clone(),
                    span: span(node),
                    doc: None,
                    visibility: Visibility::Public,
                });
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, source, module, Some(&class_name), enclosing, payload);
                }
            }
        }
        "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                payload.items.push(ItemRecord {
                    kind: NodeKind::Type,
                    module: module.to_string(),
                    name: text(name_node, source).to_string(),
                    span: span(node),
                    doc: None,
                    visibility: Visibility::Public,
                });
            }
        }
        "import_statement" => {
            if let Some(source_node) = node.child_by_field_name("source") {
                let target = import_target(text(source_node, source));
                if !target.is_empty() {
                    payload.edges.push(EdgeDecl {
                        from: SymbolRef::Module(module.to_string()),
                        to: SymbolRef::Module(target),
                        kind: EdgeKind::Imports,
                        line: Some(super::line(node.start_position())),
                    });
                }
            }
        }
        "call_expression" => {
            if let Some(enclosing) = enclosing {
                if let Some(callee) = callee_ref(node, source) {
                    payload.edges.push(EdgeDecl {
                        from: SymbolRef::Function {
                            module: Some(enclosing.module.clone()),
                            name: enclosing.name.clone(),
                            arity: Some(enclosing.arity),
                        },
                        to: callee,
                        kind: EdgeKind::Calls,
                        line: Some(super::line(node.start_position())),
                    });
                }
            }
            walk_children(node, source, module, class, enclosing, payload);
        }
        _ => walk_children(node, source, module, class, enclosing, payload),
    }
}

fn walk_children(
    node: Node,
    source: &str,
    module: &str,
    class: Option<&str>,
    enclosing: Option<&EnclosingFn>,
    payload: &mut AnalyzedFile,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk(child, source, module, class, enclosing, payload);
    }
}

fn extract_function(
    node: Node,
    source: &str,
    module: &str,
    class: Option<&str>,
    payload: &mut AnalyzedFile,
) -> Option<EnclosingFn> {
    let bare = text(node.child_by_field_name("name")?, source).to_string();
    // Constructors and computed names are noise for the graph.
    if bare.is_empty() || bare == "constructor" {
        return None;
    }
    let name = match class {
        Some(class) => format!("{class}.{bare}"),
        None => bare,
    };
    let arity = node
        .child_by_field_name("parameters")
        .map(|params| params.named_child_count() as u32)
        .unwrap_or(0);

    payload.functions.push(FunctionRecord {
        module: module.to_string(),
        name: name.clone(),
        arity,
        span: span(node),
        doc: None,
        visibility: Visibility::Public,
        signature: signature_of(node, source),
        extra: HashMap::new(),
    });

    Some(EnclosingFn {
        module: module.to_string(),
        name,
        arity,
    })
}

fn signature_of(node: Node, source: &str) -> Option<String> {
    let start = node.start_byte();
    let end = node
        .child_by_field_name("body")
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());
    source
        .get(start..end)
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}

/// `"./billing/ledger"` imports module `ledger`; `"@scope/pkg"` imports
/// `pkg`; bare specifiers import themselves.
fn import_target(raw: &str) -> String {
    let unquoted = raw.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    unquoted
        .rsplit('/')
        .next()
        .unwrap_or(unquoted)
        .trim()
        .to_string()
}

fn callee_ref(node: Node, source: &str) -> Option<SymbolRef> {
    let function = node.child_by_field_name("function")?;
    let arity = node
        .child_by_field_name("arguments")
        .map(|args| args.named_child_count() as u32)
        .unwrap_or(0);

    match function.kind() {
        "identifier" => Some(SymbolRef::Function {
            module: None,
            name: text(function, source).to_string(),
            arity: Some(arity),
        }),
        "member_expression" => {
            let name = text(function.child_by_field_name("property")?, source).to_string();
            let receiver = function
                .child_by_field_name("object")
                .map(|o| text(o, source))
                .filter(|o| o.chars().all(|c| c.is_alphanumeric() || c == '_'));
            Some(SymbolRef::Function {
                module: receiver.map(str::to_string),
                name,
                arity: Some(arity),
            })
        }
        _ => None,
    }
}
