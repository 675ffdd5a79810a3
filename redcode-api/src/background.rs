use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::config::ApiConfig;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::state::AppState;
use crate::store::Store;

/// Starts the periodic saver and the staleness sweeper.
pub fn spawn_background_workers(state: Arc<AppState>, config: &ApiConfig) {
    let save_interval = config.save_interval();
    let sweep_interval = config.sweep_interval();
    let stale_timeout = chrono::Duration::from_std(config.stale_timeout())
        .unwrap_or(chrono::Duration::MAX);

    let saver_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = ticker(save_interval);
        loop {
            interval.tick().await;
            save_tick(&saver_state.store).await;
        }
    });

    tokio::spawn(async move {
        let mut interval = ticker(sweep_interval);
        loop {
            interval.tick().await;
            sweep(&state.store, Utc::now(), stale_timeout).await;
        }
    });
}

/// Shortest allowed period; `tokio::time::interval` panics on zero.
const MIN_TICK: Duration = Duration::from_secs(1);

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(MIN_TICK));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Errors are logged and left for the next tick.
async fn save_tick(store: &Store) {
    match store.persist_if_dirty().await {
        Ok(true) => debug!("periodic save complete"),
        Ok(false) => {}
        Err(e) => error!("periodic save failed, retrying next tick: {e}"),
    }
}

/// Marks bots that stopped reporting as offline, saving right away if any
/// changed. Returns the demoted bot names.
pub async fn sweep(store: &Store, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<String> {
    let demoted = store.with_exclusive(|data| data.demote_stale(now, timeout));
    if demoted.is_empty() {
        return demoted;
    }

    for name in &demoted {
        warn!(bot = %name, timeout_secs = timeout.num_seconds(), "bot stopped reporting, marked offline");
    }
    if let Err(e) = store.persist_now().await {
        error!("save after sweep failed, retrying next tick: {e}");
    }
    demoted
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{Bot, BotStatus};

    #[tokio::test]
    async fn sweep_demotes_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        let store = Store::open(&path).await.unwrap();

        let now = Utc::now();
        store.with_exclusive(|data| {
            let mut bob = Bot::new(1, 1, "Bob".into(), "t".into(), "g".into());
            bob.status = BotStatus::Online;
            bob.last_update = Some(now - Duration::minutes(3));
            data.insert_bot(bob);
        });
        store.persist_now().await.unwrap();

        let demoted = sweep(&store, now, Duration::minutes(2)).await;
        assert_eq!(demoted, vec!["Bob".to_owned()]);
        assert_eq!(
            store.snapshot().bot_by_name("Bob").unwrap().status,
            BotStatus::Offline
        );
        assert!(!store.is_dirty());

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["bots"][0]["status"], "offline");

        // Nothing left to demote.
        assert!(sweep(&store, now, Duration::minutes(2)).await.is_empty());
    }

    #[tokio::test]
    async fn zero_period_ticker_is_clamped() {
        let mut interval = ticker(std::time::Duration::ZERO);
        interval.tick().await;
        assert_eq!(interval.period(), MIN_TICK);
    }

    #[tokio::test]
    async fn save_tick_flushes_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        let store = Store::open(&path).await.unwrap();

        store.with_exclusive(|data| {
            data.insert_bot(Bot::new(1, 1, "Alice".into(), "t".into(), "g".into()));
        });
        save_tick(&store).await;

        assert!(!store.is_dirty());
        assert!(std::fs::read_to_string(&path).unwrap().contains("Alice"));
    }
}
