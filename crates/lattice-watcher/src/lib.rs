//! Lattice Watcher — debounced filesystem change stream
//!
//! Subscribes to notify events for a root, debounces with a trailing
//! per-path window, and forwards change/remove events to the consumer.
//! No business logic lives here; the ingest side decides what a change
//! means.

mod watcher;

pub use watcher::{DebouncedWatcher, FileEvent};
