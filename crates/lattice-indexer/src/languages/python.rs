//! Python front-end using tree-sitter

use super::{module_name_for, span, text};
use crate::parser_pool::{FileType, ParseRequest, ParserPool};
use lattice_core::ingest::{
    AnalyzedFile, EdgeDecl, FunctionRecord, ItemRecord, ModuleRecord, SymbolRef,
};
use lattice_core::{CoreResult, EdgeKind, FileAnalyzer, Language, NodeKind, Visibility};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Node;

pub struct PythonFrontend {
    pool: ParserPool,
}

impl PythonFrontend {
    pub fn new(pool: ParserPool) -> Self {
        PythonFrontend { pool }
    }
}

impl FileAnalyzer for PythonFrontend {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn analyze(&self, bytes: &[u8], path: &Path) -> CoreResult<AnalyzedFile> {
        let content = String::from_utf8_lossy(bytes).into_owned();
        let parsed = self.pool.parse_blocking(ParseRequest {
            file_type: FileType::Python,
            content,
            path: path.to_path_buf(),
        })?;

        let module = module_name_for(path);
        let mut payload = AnalyzedFile {
            path: path.to_path_buf(),
            language: Some(Language::Python),
            modules: vec![ModuleRecord {
                name: module.clone(),
                span: None,
                doc: module_docstring(parsed.tree.root_node(), &parsed.content),
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
        "function_definition" => {
            if let Some(function) = extract_function(node, source, module, class, payload) {
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, source, module, class, Some(&function), payload);
                }
            }
        }
        "class_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let class_name = text(name_node, source).to_string();
                payload.items.push(ItemRecord {
                    kind: NodeKind::Type,
                    module: module.to_string(),
                    name: class_name.clone(),
                    span: span(node),
                    doc: docstring_of(node, source),
                    visibility: visibility_from_name(&class_name),
                });
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, source, module, Some(&class_name), enclosing, payload);
                }
            }
        }
        "decorated_definition" => {
            if let Some(definition) = node.child_by_field_name("definition") {
                walk(definition, source, module, class, enclosing, payload);
            }
        }
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let target = match child.kind() {
                    "dotted_name" => Some(first_segment(text(child, source))),
                    "aliased_import" => child
                        .child_by_field_name("name")
                        .map(|n| first_segment(text(n, source))),
                    _ => None,
                };
                if let Some(target) = target.filter(|t| !t.is_empty()) {
                    push_import(payload, module, target, node);
                }
            }
        }
        "import_from_statement" => {
            if let Some(module_node) = node.child_by_field_name("module_name") {
                let target = first_segment(text(module_node, source));
                if !target.is_empty() {
                    push_import(payload, module, target, node);
                }
            }
        }
        "call" => {
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
    let name = match class {
        Some(class) => format!("{class}.{bare}"),
        None => bare.clone(),
    };
    let arity = node
        .child_by_field_name("parameters")
        .map(|params| arity_of(params, source, class.is_some()))
        .unwrap_or(0);

    payload.functions.push(FunctionRecord {
        module: module.to_string(),
        name: name.clone(),
        arity,
        span: span(node),
        doc: docstring_of(node, source),
        visibility: visibility_from_name(&bare),
        signature: signature_of(node, source),
        extra: HashMap::new(),
    });

    Some(EnclosingFn {
        module: module.to_string(),
        name,
        arity,
    })
}

/// Parameter count; `self`/`cls` of methods is not part of the arity.
fn arity_of(params: Node, source: &str, in_class: bool) -> u32 {
    let mut cursor = params.walk();
    let mut arity = 0u32;
    for (index, param) in params.named_children(&mut cursor).enumerate() {
        if index == 0 && in_class {
            let name = text(param, source);
            if name == "self" || name == "cls" {
                continue;
            }
        }
        arity += 1;
    }
    arity
}

fn visibility_from_name(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

/// First string expression of a definition body.
fn docstring_of(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    Some(clean_docstring(text(string, source)))
}

fn module_docstring(root: Node, source: &str) -> Option<String> {
    let first = root.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    (string.kind() == "string").then(|| clean_docstring(text(string, source)))
}

fn clean_docstring(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn signature_of(node: Node, source: &str) -> Option<String> {
    let start = node.start_byte();
    let end = node
        .child_by_field_name("body")
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());
    source
        .get(start..end)
        .map(|s| s.trim().trim_end_matches(':').trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_segment(dotted: &str) -> String {
    dotted.split('.').next().unwrap_or("").trim().to_string()
}

fn push_import(payload: &mut AnalyzedFile, module: &str, target: String, node: Node) {
    payload.edges.push(EdgeDecl {
        from: SymbolRef::Module(module.to_string()),
        to: SymbolRef::Module(target),
        kind: EdgeKind::Imports,
        line: Some(super::line(node.start_position())),
    });
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
        "attribute" => {
            let name = text(function.child_by_field_name("attribute")?, source).to_string();
            let receiver = function
                .child_by_field_name("object")
                .map(|o| text(o, source))
                .filter(|o| o.chars().all(|c| c.is_alphanumeric() || c == '_'));
            Some(SymbolRef::Function {
                // A bare-identifier receiver is usually a module alias.
                module: receiver.map(str::to_string),
                name,
                arity: Some(arity),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser_pool::ParserPool;

    fn analyze(source: &str) -> AnalyzedFile {
        let frontend = PythonFrontend::new(ParserPool::new(1));
        frontend
            .analyze(source.as_bytes(), Path::new("pkg/billing.py"))
            .unwrap()
    }

    #[test]
    fn functions_and_docstrings() {
        let payload = analyze(
            r#"
def charge(customer, amount):
    """Charges a customer."""
    return ledger.post(customer, amount)

def _internal():
    pass
"#,
        );
        assert_eq!(payload.functions.len(), 2);
        let charge = &payload.functions[0];
        assert_eq!(charge.name, "charge");
        assert_eq!(charge.arity, 2);
        assert_eq!(charge.doc.as_deref(), Some("Charges a customer."));
        assert_eq!(charge.visibility, Visibility::Public);
        assert_eq!(payload.functions[1].visibility, Visibility::Private);
    }

    #[test]
    fn methods_drop_self_from_arity() {
        let payload = analyze(
            r#"
class Ledger:
    """Double-entry ledger."""

    def post(self, customer, amount):
        return amount
"#,
        );
        assert!(payload.items.iter().any(|i| i.name == "Ledger" && i.kind == NodeKind::Type));
        let post = payload.functions.iter().find(|f| f.name == "Ledger.post").unwrap();
        assert_eq!(post.arity, 2);
    }

    #[test]
    fn imports_take_the_first_segment() {
        let payload = analyze("import os.path\nfrom collections import OrderedDict\n");
        let imports: Vec<&str> = payload
            .edges
            .iter()
            .filter_map(|e| match (&e.kind, &e.to) {
                (EdgeKind::Imports, SymbolRef::Module(name)) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert!(imports.contains(&"os"));
        assert!(imports.contains(&"collections"));
    }

    #[test]
    fn calls_record_receiver_as_module_hint() {
        let payload = analyze(
            r#"
def charge(customer, amount):
    return ledger.post(customer, amount)
"#,
        );
        let call = payload
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Calls)
            .unwrap();
        assert!(matches!(
            &call.to,
            SymbolRef::Function { module: Some(m), name, arity: Some(2) }
                if m == "ledger" && name == "post"
        ));
    }

    #[test]
    fn decorated_functions_are_extracted() {
        let payload = analyze(
            r#"
@retry(3)
def flaky():
    pass
"#,
        );
        assert!(payload.functions.iter().any(|f| f.name == "flaky"));
    }

    #[test]
    fn module_docstring_lands_on_module_record() {
        let payload = analyze("\"\"\"Billing helpers.\"\"\"\n\ndef f():\n    pass\n");
        assert_eq!(payload.modules[0].doc.as_deref(), Some("Billing helpers."));
    }
}
