//! Filesystem watcher with trailing-window debounce

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error};

/// Events delivered to the consumer after debouncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Created or modified; the path exists.
    Changed(PathBuf),
    /// The path no longer exists.
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Changed(path) | FileEvent::Removed(path) => path,
        }
    }
}

/// Watches a root recursively and emits one event per path once that
/// path has been quiet for the debounce window.
pub struct DebouncedWatcher {
    // Dropping the notify watcher stops the stream; hold it for the
    // lifetime of the subscription.
    _watcher: RecommendedWatcher,
}

impl DebouncedWatcher {
    /// Start watching. Returns the handle (keep it alive) and the
    /// debounced event stream.
    pub fn watch(
        root: &Path,
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<FileEvent>();

        let mut watcher =
            notify::recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
                match result {
                    Ok(event) => {
                        if !matches!(
                            event.kind,
                            notify::EventKind::Create(_)
                                | notify::EventKind::Modify(_)
                                | notify::EventKind::Remove(_)
                        ) {
                            return;
                        }
                        for path in event.paths {
                            if should_ignore(&path) {
                                continue;
                            }
                            let _ = raw_tx.send(path);
                        }
                    }
                    Err(e) => error!("filesystem watch error: {e}"),
                }
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "watching directory tree");

        tokio::spawn(debounce_loop(raw_rx, out_tx, debounce));
        Ok((DebouncedWatcher { _watcher: watcher }, out_rx))
    }
}

/// Trailing-window debounce: a path flushes once no new event has
/// touched it for `window`. Existence at flush time decides between
/// `Changed` and `Removed`, which also absorbs editor rename-replace
/// save patterns.
async fn debounce_loop(
    mut raw: mpsc::UnboundedReceiver<PathBuf>,
    out: mpsc::UnboundedSender<FileEvent>,
    window: Duration,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let tick = Duration::from_millis(window.as_millis().min(50) as u64).max(Duration::from_millis(10));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = raw.recv() => {
                match event {
                    Some(path) => {
                        pending.insert(path, Instant::now());
                    }
                    None => break,
                }
            }
            _ = interval.tick() => {
                if pending.is_empty() {
                    continue;
                }
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|&(_, &touched)| now.duration_since(touched) >= window)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    let event = if path.exists() {
                        FileEvent::Changed(path)
                    } else {
                        FileEvent::Removed(path)
                    };
                    if out.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }

    // Channel closed: flush whatever is left.
    for (path, _) in pending {
        let event = if path.exists() {
            FileEvent::Changed(path)
        } else {
            FileEvent::Removed(path)
        };
        let _ = out.send(event);
    }
}

fn should_ignore(path: &Path) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| {
                matches!(name, "target" | "node_modules" | "__pycache__" | ".git")
                    || (name.starts_with('.') && name.len() > 1)
            })
    })
}
