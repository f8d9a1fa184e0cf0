use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Events sent from the watcher thread to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    ShaderChanged(PathBuf),
    /// Graph, scene or material YAML. The engine tells them apart by path.
    YamlChanged(PathBuf),
}

/// Map a changed path to an event.
pub fn classify(path: &Path) -> Option<WatchEvent> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "wgsl" => Some(WatchEvent::ShaderChanged(path.to_path_buf())),
        "yaml" | "yml" => Some(WatchEvent::YamlChanged(path.to_path_buf())),
        _ => None,
    }
}

/// Creates a file watcher on the given directory and returns a receiver
/// for change events. The watcher must be kept alive.
pub fn start_watching(
    watch_dir: &Path,
) -> Result<(RecommendedWatcher, mpsc::Receiver<WatchEvent>), notify::Error> {
    let (tx, rx) = mpsc::channel();

    let mut watcher =
        notify::recommended_watcher(move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    for event in event.paths.iter().filter_map(|p| classify(p)) {
                        tracing::debug!("File changed: {:?}", event);
                        let _ = tx.send(event);
                    }
                }
            }
            Err(e) => {
                tracing::error!("File watcher error: {:?}", e);
            }
        })?;

    watcher.watch(watch_dir, RecursiveMode::Recursive)?;
    tracing::info!("File watcher started on: {:?}", watch_dir);

    Ok((watcher, rx))
}

/// Drain pending events, dropping repeats of the same event. Editors often
/// emit several writes per save.
pub fn drain_events(rx: &mpsc::Receiver<WatchEvent>) -> Vec<WatchEvent> {
    let mut events: Vec<WatchEvent> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if !events.contains(&event) {
            events.push(event);
        }
    }
    events
}
