//! Core data model: node and edge identities, attributes, languages

use crate::error::{CoreError, CoreResult};
use crate::symbols::{Symbol, SymbolTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Discriminates what kind of code entity a node represents. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Function,
    Type,
    Macro,
    Variable,
    File,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Module,
        NodeKind::Function,
        NodeKind::Type,
        NodeKind::Macro,
        NodeKind::Variable,
        NodeKind::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Function => "function",
            NodeKind::Type => "type",
            NodeKind::Macro => "macro",
            NodeKind::Variable => "variable",
            NodeKind::File => "file",
        }
    }

    pub fn from_str_tag(tag: &str) -> Option<Self> {
        match tag {
            "module" => Some(NodeKind::Module),
            "function" => Some(NodeKind::Function),
            "type" => Some(NodeKind::Type),
            "macro" => Some(NodeKind::Macro),
            "variable" => Some(NodeKind::Variable),
            "file" => Some(NodeKind::File),
            _ => None,
        }
    }

    /// One-byte tag used in the on-disk embedding cache.
    pub fn wire_tag(&self) -> u8 {
        match self {
            NodeKind::Module => 0,
            NodeKind::Function => 1,
            NodeKind::Type => 2,
            NodeKind::Macro => 3,
            NodeKind::Variable => 4,
            NodeKind::File => 5,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NodeKind::Module),
            1 => Some(NodeKind::Function),
            2 => Some(NodeKind::Type),
            3 => Some(NodeKind::Macro),
            4 => Some(NodeKind::Variable),
            5 => Some(NodeKind::File),
            _ => None,
        }
    }
}

/// Type-dependent node identifier. Module and item names are interned
/// symbols so map keys stay cheap; render to strings only at boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Symbolic module name, e.g. `auth::login`.
    Module(Symbol),
    /// `(module, name, arity)` triple.
    Function {
        module: Symbol,
        name: Symbol,
        arity: u32,
    },
    /// Named item inside a module: types, macros, variables.
    Item { module: Symbol, name: Symbol },
    /// Canonical file path.
    File(PathBuf),
}

impl NodeId {
    /// Render the identifier in its canonical string form:
    /// modules as `name`, functions as `module::name/arity`,
    /// items as `module::name`, files as their path.
    pub fn render(&self, symbols: &SymbolTable) -> String {
        match self {
            NodeId::Module(m) => symbols.resolve(*m).to_string(),
            NodeId::Function {
                module,
                name,
                arity,
            } => format!(
                "{}::{}/{}",
                symbols.resolve(*module),
                symbols.resolve(*name),
                arity
            ),
            NodeId::Item { module, name } => {
                format!("{}::{}", symbols.resolve(*module), symbols.resolve(*name))
            }
            NodeId::File(path) => path.display().to_string(),
        }
    }

    /// Parse a canonical identifier string back into a `NodeId` for the
    /// given kind. Inverse of [`NodeId::render`].
    pub fn parse(kind: NodeKind, raw: &str, symbols: &SymbolTable) -> CoreResult<NodeId> {
        match kind {
            NodeKind::Module => Ok(NodeId::Module(symbols.intern(raw))),
            NodeKind::File => Ok(NodeId::File(PathBuf::from(raw))),
            NodeKind::Function => {
                let (path, arity) = raw.rsplit_once('/').ok_or_else(|| {
                    CoreError::InvalidArgument(format!(
                        "function id must be module::name/arity, got `{raw}`"
                    ))
                })?;
                let arity: u32 = arity.parse().map_err(|_| {
                    CoreError::InvalidArgument(format!("bad arity in function id `{raw}`"))
                })?;
                let (module, name) = split_item_path(path, raw)?;
                Ok(NodeId::Function {
                    module: symbols.intern(module),
                    name: symbols.intern(name),
                    arity,
                })
            }
            NodeKind::Type | NodeKind::Macro | NodeKind::Variable => {
                let (module, name) = split_item_path(raw, raw)?;
                Ok(NodeId::Item {
                    module: symbols.intern(module),
                    name: symbols.intern(name),
                })
            }
        }
    }
}

fn split_item_path<'a>(path: &'a str, raw: &str) -> CoreResult<(&'a str, &'a str)> {
    path.rsplit_once("::").ok_or_else(|| {
        CoreError::InvalidArgument(format!("id must be module::name, got `{raw}`"))
    })
}

/// The unique identity of a node: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: NodeId,
}

impl NodeKey {
    pub fn module(symbols: &SymbolTable, name: &str) -> Self {
        NodeKey {
            kind: NodeKind::Module,
            id: NodeId::Module(symbols.intern(name)),
        }
    }

    pub fn function(symbols: &SymbolTable, module: &str, name: &str, arity: u32) -> Self {
        NodeKey {
            kind: NodeKind::Function,
            id: NodeId::Function {
                module: symbols.intern(module),
                name: symbols.intern(name),
                arity,
            },
        }
    }

    pub fn item(symbols: &SymbolTable, kind: NodeKind, module: &str, name: &str) -> Self {
        debug_assert!(matches!(
            kind,
            NodeKind::Type | NodeKind::Macro | NodeKind::Variable
        ));
        NodeKey {
            kind,
            id: NodeId::Item {
                module: symbols.intern(module),
                name: symbols.intern(name),
            },
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        NodeKey {
            kind: NodeKind::File,
            id: NodeId::File(path.into()),
        }
    }

    /// Stable `kind:id` string used for ordering tie-breaks, on-disk
    /// entries and wire envelopes.
    pub fn canonical(&self, symbols: &SymbolTable) -> String {
        format!("{}:{}", self.kind.as_str(), self.id.render(symbols))
    }

    /// Parse a `kind:id` canonical string.
    pub fn parse_canonical(raw: &str, symbols: &SymbolTable) -> CoreResult<NodeKey> {
        let (tag, rest) = raw.split_once(':').ok_or_else(|| {
            CoreError::InvalidArgument(format!("node key must be kind:id, got `{raw}`"))
        })?;
        let kind = NodeKind::from_str_tag(tag)
            .ok_or_else(|| CoreError::InvalidArgument(format!("unknown node kind `{tag}`")))?;
        Ok(NodeKey {
            kind,
            id: NodeId::parse(kind, rest, symbols)?,
        })
    }

    /// The module a node belongs to, when its identity carries one.
    pub fn module_of(&self) -> Option<Symbol> {
        match &self.id {
            NodeId::Module(m) => Some(*m),
            NodeId::Function { module, .. } => Some(*module),
            NodeId::Item { module, .. } => Some(*module),
            NodeId::File(_) => None,
        }
    }
}

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => Language::Rust,
            Some("py") | Some("pyi") => Language::Python,
            Some("ts") | Some("tsx") => Language::TypeScript,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            _ => Language::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// Node attributes: the known fields as a struct, front-end extensions in
/// the `extra` side map (purity/complexity tags consumed by the re-ranker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// 1-based inclusive line range in the defining file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<(u32, u32)>,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl NodeAttrs {
    /// Text handed to the embedding backend for this node. Changes to it
    /// invalidate the node's stored vector.
    pub fn embedding_text(&self, canonical_id: &str) -> String {
        let mut text = canonical_id.to_string();
        if let Some(sig) = self.extra.get("signature") {
            text.push(' ');
            text.push_str(sig);
        }
        if let Some(doc) = &self.doc {
            text.push(' ');
            text.push_str(doc);
        }
        text
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Defines,
    Calls,
    Imports,
    References,
    DependsOn,
    SimilarTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Defines => "defines",
            EdgeKind::Calls => "calls",
            EdgeKind::Imports => "imports",
            EdgeKind::References => "references",
            EdgeKind::DependsOn => "depends_on",
            EdgeKind::SimilarTo => "similar_to",
        }
    }

    pub fn from_str_tag(tag: &str) -> Option<Self> {
        match tag {
            "defines" => Some(EdgeKind::Defines),
            "calls" => Some(EdgeKind::Calls),
            "imports" => Some(EdgeKind::Imports),
            "references" => Some(EdgeKind::References),
            "depends_on" => Some(EdgeKind::DependsOn),
            "similar_to" => Some(EdgeKind::SimilarTo),
            _ => None,
        }
    }
}

/// A materialized view of one edge, as returned by store queries.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeView {
    pub from: NodeKey,
    pub to: NodeKey,
    pub kind: EdgeKind,
    pub weight: f32,
    pub attrs: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trips() {
        let symbols = SymbolTable::new();
        let keys = vec![
            NodeKey::module(&symbols, "auth::login"),
            NodeKey::function(&symbols, "auth", "validate", 2),
            NodeKey::item(&symbols, NodeKind::Type, "auth", "Token"),
            NodeKey::file("src/auth.rs"),
        ];
        for key in keys {
            let canonical = key.canonical(&symbols);
            let parsed = NodeKey::parse_canonical(&canonical, &symbols).unwrap();
            assert_eq!(parsed, key, "round trip failed for {canonical}");
        }
    }

    #[test]
    fn function_id_requires_arity() {
        let symbols = SymbolTable::new();
        let err = NodeId::parse(NodeKind::Function, "auth::validate", &symbols).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn same_source_location_yields_same_key() {
        let symbols = SymbolTable::new();
        let a = NodeKey::function(&symbols, "auth", "validate", 2);
        let b = NodeKey::function(&symbols, "auth", "validate", 2);
        assert_eq!(a, b);
    }

    #[test]
    fn wire_tags_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_wire_tag(kind.wire_tag()), Some(kind));
        }
    }

    #[test]
    fn language_detection() {
        assert_eq!(Language::from_path(std::path::Path::new("a.rs")), Language::Rust);
        assert_eq!(Language::from_path(std::path::Path::new("a.py")), Language::Python);
        assert_eq!(Language::from_path(std::path::Path::new("a.tsx")), Language::TypeScript);
        assert_eq!(Language::from_path(std::path::Path::new("a.txt")), Language::Other);
    }

    #[test]
    fn embedding_text_includes_doc_and_signature() {
        let mut attrs = NodeAttrs::default();
        attrs.doc = Some("Validates an email address".into());
        attrs
            .extra
            .insert("signature".into(), "fn validate(email: &str) -> bool".into());
        let text = attrs.embedding_text("function:auth::validate/1");
        assert!(text.contains("validate"));
        assert!(text.contains("Validates an email address"));
    }
}
