//! Lattice Indexer — tree-sitter language front-ends
//!
//! Each front-end turns source bytes into the neutral `AnalyzedFile`
//! payload the core ingests. Front-ends register by file extension;
//! [`default_registry`] wires up every built-in language.

pub mod languages;
pub mod parser_pool;

#[cfg(test)]
mod tests;

pub use languages::default_registry;
pub use parser_pool::{FileType, ParserPool};
