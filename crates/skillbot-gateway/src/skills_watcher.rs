//! Skills directory watcher for hot-reload.

use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use skillbot_skills::SkillStore;

/// How often the blocking loop checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Start watching the store's directory and reload on change.
///
/// The watcher stops once `shutdown` is cancelled.
pub fn start_skills_watcher(
    store: Arc<SkillStore>,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if !store.directory().is_dir() {
        info!(
            "Skills directory {} does not exist, skipping watcher",
            store.directory().display()
        );
        return None;
    }
    Some(tokio::task::spawn_blocking(move || {
        run_watcher(store, shutdown)
    }))
}

fn run_watcher(store: Arc<SkillStore>, shutdown: CancellationToken) {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut debouncer = match new_debouncer(Duration::from_secs(1), tx) {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to create skills watcher: {e}");
            return;
        }
    };

    // Recursive so edits to `<dir>/<skill>/SKILL.md` are seen too.
    if let Err(e) = debouncer
        .watcher()
        .watch(store.directory(), notify::RecursiveMode::Recursive)
    {
        warn!("Failed to watch skills directory: {e}");
        return;
    }

    info!("Skills watcher started: watching {}", store.directory().display());

    while !shutdown.is_cancelled() {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(events)) => {
                if events.iter().any(|e| e.kind == DebouncedEventKind::Any) {
                    info!("Skills directory changed, reloading...");
                    if let Err(e) = store.reload() {
                        warn!("Skill reload failed, keeping previous snapshot: {e}");
                    }
                }
            }
            Ok(Err(e)) => warn!("Skills watcher error: {e:?}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("Skills watcher stopped");
}
