//! Registry-level tests for the language front-ends

use crate::default_registry;
use std::path::Path;

#[test]
fn registry_claims_all_builtin_extensions() {
    let registry = default_registry();
    for ext in ["rs", "py", "pyi", "ts", "tsx", "js", "jsx", "mjs", "cjs"] {
        assert!(
            registry.for_path(Path::new(&format!("file.{ext}"))).is_some(),
            "no front-end claims .{ext}"
        );
    }
    assert!(registry.for_path(Path::new("file.go")).is_none());
    assert!(registry.for_path(Path::new("Makefile")).is_none());
}

#[test]
fn frontends_share_one_payload_shape() {
    let registry = default_registry();
    let cases: Vec<(&str, &str)> = vec![
        ("m.rs", "pub fn f(a: u32) -> u32 { a }"),
        ("m.py", "def f(a):\n    return a\n"),
        ("m.js", "function f(a) { return a; }"),
        ("m.ts", "export function f(a: number): number { return a; }"),
    ];
    for (file, source) in cases {
        let path = Path::new(file);
        let analyzer = registry.for_path(path).unwrap();
        let payload = analyzer.analyze(source.as_bytes(), path).unwrap();
        assert_eq!(payload.modules.len(), 1, "{file}: one file-level module");
        assert_eq!(payload.modules[0].name, "m");
        assert_eq!(payload.functions.len(), 1, "{file}: one function");
        assert_eq!(payload.functions[0].name, "f");
        assert_eq!(payload.functions[0].arity, 1);
    }
}

#[test]
fn malformed_source_still_produces_a_payload() {
    // Tree-sitter recovers from syntax errors; the front-end reports
    // whatever parsed instead of failing the file.
    let registry = default_registry();
    let path = Path::new("broken.rs");
    let analyzer = registry.for_path(path).unwrap();
    let payload = analyzer
        .analyze(b"fn ok() {}\nfn broken( {", path)
        .unwrap();
    assert!(payload.functions.iter().any(|f| f.name == "ok"));
}
