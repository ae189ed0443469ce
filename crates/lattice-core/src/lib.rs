//! Lattice Core — knowledge graph store, vector index, retrieval
//! pipeline and graph algorithms
//!
//! The engine ([`engine::Engine`]) owns every component and exposes the
//! typed API the MCP dispatcher and CLI consume. Language front-ends
//! feed it [`ingest::AnalyzedFile`] payloads; an embedding backend plugs
//! in behind [`embed::Embedder`].

pub mod algo;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod model;
pub mod retrieval;
pub mod store;
pub mod symbols;
pub mod tracker;
pub mod vector;


pub use cache::{ClearScope, EmbeddingCache, project_fingerprint};
pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use embed::{Embedder, EmbeddingPool, HashEmbedder, ModelInfo};
pub use engine::{Engine, SearchOptions};
pub use error::{CoreError, CoreResult};
pub use ingest::{AnalyzedFile, AnalyzerRegistry, EdgeDecl, FileAnalyzer, SymbolRef};
pub use model::{EdgeKind, Language, NodeAttrs, NodeId, NodeKey, NodeKind, Visibility};
pub use retrieval::{SearchIntent, SearchStrategy};
pub use store::{GraphSnapshot, GraphStore};
pub use symbols::{Symbol, SymbolTable};
pub use tracker::{FileStatus, FileTracker};
pub use vector::VectorIndex;
