//! Interned symbols for module and function names

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::RwLock;

/// A small integer handle into the [`SymbolTable`]. Comparisons and hashing
/// are O(1); render back to a string only at serialization boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Symbol interner mapping names to stable handles. Thread-safe for
/// concurrent access from ingest and query paths.
pub struct SymbolTable {
    by_name: DashMap<Box<str>, Symbol>,
    names: RwLock<Vec<Arc<str>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            by_name: DashMap::new(),
            names: RwLock::new(Vec::new()),
        }
    }

    /// Intern a name, returning its handle. Idempotent.
    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(sym) = self.by_name.get(name) {
            return *sym.value();
        }
        // Insert under the entry lock so two racing interns of the same
        // name resolve to one handle.
        *self
            .by_name
            .entry(name.into())
            .or_insert_with(|| {
                let mut names = self.names.write().unwrap_or_else(|e| e.into_inner());
                let sym = Symbol(names.len() as u32);
                names.push(Arc::from(name));
                sym
            })
            .value()
    }

    /// Render a handle back to its name.
    pub fn resolve(&self, sym: Symbol) -> Arc<str> {
        let names = self.names.read().unwrap_or_else(|e| e.into_inner());
        names[sym.0 as usize].clone()
    }

    /// Look up a handle without interning.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.by_name.get(name).map(|r| *r.value())
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
