//! Rust front-end using tree-sitter

use super::{module_name_for, span, text};
use crate::parser_pool::{FileType, ParseRequest, ParserPool};
use lattice_core::ingest::{
    AnalyzedFile, EdgeDecl, FunctionRecord, ItemRecord, ModuleRecord, SymbolRef,
};
use lattice_core::{CoreResult, EdgeKind, FileAnalyzer, Language, NodeKind, Visibility};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Node;

pub struct RustFrontend {
    pool: ParserPool,
}

impl RustFrontend {
    pub fn new(pool: ParserPool) -> Self {
        RustFrontend { pool }
    }
}

impl FileAnalyzer for RustFrontend {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn analyze(&self, bytes: &[u8], path: &Path) -> CoreResult<AnalyzedFile> {
        let content = String::from_utf8_lossy(bytes).into_owned();
        let parsed = self.pool.parse_blocking(ParseRequest {
            file_type: FileType::Rust,
            content,
            path: path.to_path_buf(),
        })?;

        let module = module_name_for(path);
        let mut payload = AnalyzedFile {
            path: path.to_path_buf(),
            language: Some(Language::Rust),
            modules: vec![ModuleRecord {
                name: module.clone(),
                span: None,
                doc: None,
                visibility: Visibility::Public,
            }],
            ..Default::default()
        };

        let root = parsed.tree.root_node();
        walk(root, &parsed.content, &module, None, &mut payload);
        Ok(payload)
    }
}

/// The function whose body is being walked, for `calls` attribution.
struct EnclosingFn {
    module: String,
    name: String,
    arity: u32,
}

fn walk(
    node: Node,
    source: &str,
    module: &str,
    enclosing: Option<&EnclosingFn>,
    payload: &mut AnalyzedFile,
) {
    match node.kind() {
        "mod_item" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let child_module = format!("{module}::{}", text(name_node, source));
            payload.modules.push(ModuleRecord {
                name: child_module.clone(),
                span: span(node),
                doc: doc_for(node, source),
                visibility: visibility_of(node),
            });
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.named_children(&mut cursor) {
                    walk(child, source, &child_module, None, payload);
                }
            }
        }
        "function_item" => {
            if let Some(function) = extract_function(node, source, module, payload) {
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, source, module, Some(&function), payload);
                }
            }
        }
        "impl_item" => {
            if let Some(body) = node.child_by_field_name("body") {
                walk_children(body, source, module, enclosing, payload);
            }
        }
        "use_declaration" => {
            if let Some(target) = import_target(node, source) {
                payload.edges.push(EdgeDecl {
                    from: SymbolRef::Module(module.to_string()),
                    to: SymbolRef::Module(target),
                    kind: EdgeKind::Imports,
                    line: Some(super::line(node.start_position())),
                });
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
            walk_children(node, source, module, enclosing, payload);
        }
        "struct_item" | "enum_item" | "trait_item" | "type_item" | "union_item" => {
            push_item(node, source, module, NodeKind::Type, payload);
        }
        "macro_definition" => {
            push_item(node, source, module, NodeKind::Macro, payload);
        }
        "const_item" | "static_item" => {
            push_item(node, source, module, NodeKind::Variable, payload);
        }
        _ => walk_children(node, source, module, enclosing, payload),
    }
}

fn walk_children(
    node: Node,
    source: &str,
    module: &str,
    enclosing: Option<&EnclosingFn>,
    payload: &mut AnalyzedFile,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk(child, source, module, enclosing, payload);
    }
}

fn extract_function(
    node: Node,
    source: &str,
    module: &str,
    payload: &mut AnalyzedFile,
) -> Option<EnclosingFn> {
    let name = text(node.child_by_field_name("name")?, source).to_string();
    let arity = node
        .child_by_field_name("parameters")
        .map(|params| {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter(|p| p.kind() == "parameter")
                .count() as u32
        })
        .unwrap_or(0);

    payload.functions.push(FunctionRecord {
        module: module.to_string(),
        name: name.clone(),
        arity,
        span: span(node),
        doc: doc_for(node, source),
        visibility: visibility_of(node),
        signature: signature_of(node, source),
        extra: HashMap::new(),
    });

    Some(EnclosingFn {
        module: module.to_string(),
        name,
        arity,
    })
}

fn push_item(node: Node, source: &str, module: &str, kind: NodeKind, payload: &mut AnalyzedFile) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    payload.items.push(ItemRecord {
        kind,
        module: module.to_string(),
        name: text(name_node, source).to_string(),
        span: span(node),
        doc: doc_for(node, source),
        visibility: visibility_of(node),
    });
}

fn visibility_of(node: Node) -> Visibility {
    let mut cursor = node.walk();
    let public = node
        .named_children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier");
    if public { Visibility::Public } else { Visibility::Private }
}

/// Contiguous `///` comments immediately above the item.
fn doc_for(node: Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut sibling = node.prev_named_sibling();
    while let Some(prev) = sibling {
        if prev.kind() != "line_comment" {
            break;
        }
        let raw = text(prev, source);
        let Some(stripped) = raw.strip_prefix("///") else {
            break;
        };
        lines.push(stripped.trim().to_string());
        sibling = prev.prev_named_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join(" "))
}

/// Everything up to the body: `pub fn parse(input: &str) -> Token`.
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

/// First meaningful path segment of a `use` declaration, skipping the
/// `crate`/`self`/`super` prefixes.
fn import_target(node: Node, source: &str) -> Option<String> {
    let argument = node.child_by_field_name("argument")?;
    let raw = text(argument, source);
    raw.split("::")
        .map(str::trim)
        .find(|segment| {
            !segment.is_empty()
                && !matches!(*segment, "crate" | "self" | "super")
                && !segment.starts_with('{')
        })
        .map(|segment| segment.trim_end_matches(';').to_string())
}

/// Build a reference for the callee of a call expression.
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
        "scoped_identifier" => {
            let name = text(function.child_by_field_name("name")?, source).to_string();
            let path = function
                .child_by_field_name("path")
                .map(|p| text(p, source))
                .unwrap_or("");
            let module: Vec<&str> = path
                .split("::")
                .filter(|s| !s.is_empty() && !matches!(*s, "crate" | "self" | "super"))
                .collect();
            Some(SymbolRef::Function {
                module: (!module.is_empty()).then(|| module.join("::")),
                name,
                arity: Some(arity),
            })
        }
        // Method call: receiver type is unknown at parse time, so the
        // reference stays name-and-arity only.
        "field_expression" => {
            let name = text(function.child_by_field_name("field")?, source).to_string();
            Some(SymbolRef::Function {
                module: None,
                name,
                arity: Some(arity),
            })
        }
        _ => None,
    }
}
