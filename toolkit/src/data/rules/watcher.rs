//! Rule file watcher
//!
//! Polls the rules file modification time. A detected change is debounced
//! until the file stops changing for [`RULES_DEBOUNCE_MS`], then the store
//! reloads. Read or parse failures keep the last good rules.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::store::RuleStore;
use crate::core::constants::{RULES_DEBOUNCE_MS, RULES_POLL_INTERVAL_MS};

/// Spawn the watch loop for the store's backing file.
///
/// Returns `None` when the store has no file. The loop exits when `cancel`
/// fires.
pub fn spawn_watcher(store: Arc<RuleStore>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
    spawn_watcher_with_interval(store, cancel, Duration::from_millis(RULES_POLL_INTERVAL_MS))
}

pub fn spawn_watcher_with_interval(
    store: Arc<RuleStore>,
    cancel: CancellationToken,
    poll_interval: Duration,
) -> Option<JoinHandle<()>> {
    let path = store.path()?.to_path_buf();
    let debounce = Duration::from_millis(RULES_DEBOUNCE_MS);

    Some(tokio::spawn(async move {
        let mut last_seen = modified(&path);
        if last_seen.is_none() {
            tracing::warn!(path = %path.display(), "Rules file not found, watching for it to appear");
        }
        tracing::debug!(path = %path.display(), "Rule watcher started");

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let current = modified(&path);
            if current == last_seen {
                continue;
            }

            // Coalesce editor write bursts
            let mut settled = current;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(debounce) => {}
                }
                let again = modified(&path);
                if again == settled {
                    break;
                }
                settled = again;
            }
            last_seen = settled;

            if settled.is_none() {
                tracing::warn!(path = %path.display(), "Rules file removed, keeping current rules");
                continue;
            }

            match store.reload() {
                Ok(generation) => {
                    tracing::debug!(generation, "Rules file change applied");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Rules reload failed, keeping current rules"
                    );
                }
            }
        }
        tracing::debug!("Rule watcher stopped");
    }))
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::rules::MappingRules;

    #[tokio::test]
    async fn test_no_path_no_watcher() {
        let store = Arc::new(RuleStore::with_defaults());
        assert!(spawn_watcher(store, CancellationToken::new()).is_none());
    }

    #[tokio::test]
    async fn test_file_change_triggers_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "version: \"1.0\"\n").unwrap();

        let store = Arc::new(RuleStore::load(&path));
        let mut rx = store.subscribe();
        let cancel = CancellationToken::new();
        let handle =
            spawn_watcher_with_interval(Arc::clone(&store), cancel.clone(), Duration::from_millis(20))
                .unwrap();

        // Let the watcher record the initial mtime, then change the file with
        // a distinct timestamp
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "version: \"2.0\"\n").unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.rules.version, "2.0");
        assert_eq!(store.rules().version, "2.0");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_broken_write_keeps_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, serde_yaml::to_string(&MappingRules::default()).unwrap()).unwrap();

        let store = Arc::new(RuleStore::load(&path));
        let cancel = CancellationToken::new();
        let handle =
            spawn_watcher_with_interval(Arc::clone(&store), cancel.clone(), Duration::from_millis(20))
                .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "default_rules: [").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.generation(), 1);
        assert_eq!(*store.rules(), MappingRules::default());

        cancel.cancel();
        handle.await.unwrap();
    }
}
