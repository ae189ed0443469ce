//! Language front-ends and their shared helpers

pub mod javascript;
pub mod python;
pub mod rust;

use crate::parser_pool::ParserPool;
use lattice_core::AnalyzerRegistry;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::Node;

/// Registry with every built-in front-end, sharing one parser pool.
pub fn default_registry() -> Arc<AnalyzerRegistry> {
    let pool = ParserPool::with_default_workers();
    let mut registry = AnalyzerRegistry::new();
    registry.register(Arc::new(rust::RustFrontend::new(pool.clone())));
    registry.register(Arc::new(python::PythonFrontend::new(pool.clone())));
    registry.register(Arc::new(javascript::JavaScriptFrontend::new(pool)));
    Arc::new(registry)
}

/// 1-based line of a tree-sitter point.
pub(crate) fn line(point: tree_sitter::Point) -> u32 {
    point.row as u32 + 1
}

pub(crate) fn span(node: Node) -> Option<(u32, u32)> {
    Some((line(node.start_position()), line(node.end_position())))
}

pub(crate) fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Module name derived from the file path: the stem, or the parent
/// directory for conventional index files (`mod.rs`, `__init__.py`,
/// `index.ts`, ...).
pub(crate) fn module_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("anonymous");
    if matches!(stem, "mod" | "lib" | "main" | "index" | "__init__") {
        if let Some(parent) = path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
            return parent.to_string();
        }
    }
    stem.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_follow_conventions() {
        assert_eq!(module_name_for(Path::new("src/auth.rs")), "auth");
        assert_eq!(module_name_for(Path::new("src/auth/mod.rs")), "auth");
        assert_eq!(module_name_for(Path::new("pkg/__init__.py")), "pkg");
        assert_eq!(module_name_for(Path::new("web/index.ts")), "web");
    }
}
