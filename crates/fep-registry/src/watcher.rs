//! The hot-reload poller named in §4.1: "a dedicated watcher polls the
//! source's modification indicator at a fixed interval (default 5s) and
//! re-invokes `load` on change." §9: "a timestamp-poll is sufficient; do not
//! require OS-level file-watch APIs" — so this is exactly that, nothing
//! more.
use std::sync::Arc;
use std::time::{Duration, Instant};

use fep_core::configuration::ConfigSource;
use tokio::task::JoinHandle;

use crate::registry::Registry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawns the watcher task. Returns a [`JoinHandle`]; dropping or aborting
/// it stops hot-reload polling without affecting the registry itself.
pub fn spawn_hot_reload(
    registry: Arc<Registry>,
    source: Arc<dyn ConfigSource>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_checked = Instant::now();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if source.modified_since(last_checked) {
                last_checked = Instant::now();
                match registry.load(source.as_ref()) {
                    Ok(()) => tracing::info!("hot-reload: configuration reloaded"),
                    Err(e) => tracing::warn!(error = %e, "hot-reload: load failed, retaining prior state"),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StrictMode;
    use fep_core::configuration::StaticConfigSource;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn reload_fires_after_source_changes() {
        let registry = Registry::new(StrictMode::Tolerant);
        let source = Arc::new(StaticConfigSource::new(
            br#"{"version": "2.0", "connectionProfiles": {}, "channels": {}}"#.to_vec(),
        ));
        let handle = spawn_hot_reload(registry.clone(), source.clone(), Duration::from_millis(10));

        source.set(
            br#"{"version": "2.0", "connectionProfiles": {}, "channels": {}}"#.to_vec(),
        );
        tokio::time::advance(Duration::from_millis(30)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.abort();
    }
}
