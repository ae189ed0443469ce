//! Thread-safe parser pool for tree-sitter parsers
//!
//! Tree-sitter parsers are Send but not Sync, while front-ends must be
//! shareable across threads. Dedicated parser threads behind a channel
//! solve that and amortize parser construction across files.

use lattice_core::{CoreError, CoreResult};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tree_sitter::{Language, Parser};

/// Languages with a compiled grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rust,
    TypeScript,
    JavaScript,
    Python,
}

impl FileType {
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rs" => Some(FileType::Rust),
            "ts" | "tsx" => Some(FileType::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(FileType::JavaScript),
            "py" | "pyi" => Some(FileType::Python),
            _ => None,
        }
    }

    fn grammar(&self) -> Language {
        match self {
            FileType::Rust => tree_sitter_rust::LANGUAGE.into(),
            FileType::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            FileType::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            FileType::Python => tree_sitter_python::LANGUAGE.into(),
        }
    }
}

/// A parsing request sent to the pool.
pub struct ParseRequest {
    pub file_type: FileType,
    pub content: String,
    pub path: PathBuf,
}

/// Parsed tree plus the content it came from (tree nodes borrow byte
/// offsets, not text, so callers need both).
pub struct ParseResult {
    pub tree: tree_sitter::Tree,
    pub content: String,
    pub path: PathBuf,
}

struct WorkerRequest {
    request: ParseRequest,
    reply: mpsc::Sender<CoreResult<ParseResult>>,
}

/// Channel-fronted pool of parser threads.
#[derive(Clone)]
pub struct ParserPool {
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));
        for id in 0..workers.max(1) {
            let receiver = receiver.clone();
            std::thread::spawn(move || worker_loop(id, receiver));
        }
        ParserPool { sender }
    }

    /// Pool sized to the machine, at least two workers.
    pub fn with_default_workers() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get().max(2))
            .unwrap_or(2);
        Self::new(workers)
    }

    /// Parse on a pool thread, blocking the caller until done. Callers
    /// already run on blocking-capable threads during ingest.
    pub fn parse_blocking(&self, request: ParseRequest) -> CoreResult<ParseResult> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(WorkerRequest { request, reply })
            .map_err(|_| CoreError::Internal("parser pool is shut down".into()))?;
        response
            .recv()
            .map_err(|_| CoreError::Internal("parser worker died".into()))?
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
    tracing::debug!(worker = id, "parser worker started");
    let mut parser = Parser::new();
    loop {
        let WorkerRequest { request, reply } = {
            let guard = receiver.lock().unwrap_or_else(|e| e.into_inner());
            match guard.recv() {
                Ok(req) => req,
                Err(_) => break,
            }
        };

        let result = parser
            .set_language(&request.file_type.grammar())
            .map_err(|e| CoreError::Internal(format!("grammar load: {e}")))
            .and_then(|_| {
                parser
                    .parse(&request.content, None)
                    .ok_or_else(|| {
                        CoreError::InvalidArgument(format!(
                            "unparseable source: {}",
                            request.path.display()
                        ))
                    })
                    .map(|tree| ParseResult {
                        tree,
                        content: request.content,
                        path: request.path,
                    })
            });

        if reply.send(result).is_err() {
            tracing::warn!(worker = id, "parse caller went away");
        }
    }
    tracing::debug!(worker = id, "parser worker shutting down");
}
