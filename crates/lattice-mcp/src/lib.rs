//! Lattice MCP — JSON-RPC 2.0 tool dispatcher over the engine
//!
//! A thin translation layer: newline-delimited JSON-RPC frames over
//! stdio or a Unix domain socket, dispatched onto
//! `lattice_core::Engine`'s typed API. No business logic lives here.

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use server::McpServer;
pub use transport::{serve_stdio, serve_unix_socket};
