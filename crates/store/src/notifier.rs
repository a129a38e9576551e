//! Reactive change notification
//!
//! Each watched (`user_id`, `key`) pair has a `tokio::sync::watch` channel
//! holding the latest committed snapshot (`None` once the row is gone).
//! Watch channels keep only the most recent value, so rapid successive
//! commits coalesce into the latest consistent state; a slow subscriber can
//! miss intermediate snapshots but never sees a half-applied one.
//!
//! Re-evaluation is decoupled from the write path: writers enqueue an
//! `Invalidation` and a single background worker re-reads the touched keys
//! and publishes the fresh snapshots.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use syncstash_core::Record;
use syncstash_database::queries::records;
use syncstash_database::DbPool;

/// (user_id, key)
type Topic = (String, String);

/// A long-lived stream of snapshots for one watched key
///
/// The first `next()` yields the snapshot taken at subscription time;
/// subsequent calls wait for a change. Yields `None` for the record once
/// it has been deleted, and ends (outer `None`) when the store is dropped.
pub struct Subscription {
    rx: watch::Receiver<Option<Record>>,
    primed: bool,
}

impl Subscription {
    /// Waits for the next snapshot
    pub async fn next(&mut self) -> Option<Option<Record>> {
        if self.primed && self.rx.changed().await.is_err() {
            return None;
        }
        self.primed = true;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Returns the latest snapshot without waiting
    pub fn latest(&mut self) -> Option<Record> {
        self.rx.borrow_and_update().clone()
    }
}

/// A write the notifier must re-evaluate subscriptions for
#[derive(Debug, Clone)]
pub enum Invalidation {
    /// One (user, key) row was mutated
    Key { user_id: String, key: String },
    /// Everything in one user partition was removed
    User { user_id: String },
    /// The whole store was wiped
    All,
}

/// Registry of active subscriptions, keyed by (user, key)
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    channels: Arc<Mutex<HashMap<Topic, watch::Sender<Option<Record>>>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber
    ///
    /// The initial read seeds the channel only when nobody is watching it
    /// yet. A channel with live subscribers already holds the latest
    /// published snapshot, and that snapshot may be newer than the
    /// caller's read (a commit can land between the read and this call);
    /// seeding it would regress every watcher to older state.
    pub fn subscribe(&self, user_id: &str, key: &str, initial: Option<Record>) -> Subscription {
        let mut channels = self.lock();
        let tx = match channels.entry((user_id.to_string(), key.to_string())) {
            Entry::Occupied(entry) => {
                let tx = entry.into_mut();
                if tx.receiver_count() == 0 {
                    send_deduplicated(tx, initial);
                }
                tx
            }
            Entry::Vacant(entry) => entry.insert(watch::channel(initial).0),
        };
        Subscription {
            rx: tx.subscribe(),
            primed: false,
        }
    }

    /// Publishes a fresh snapshot; prunes channels nobody watches anymore
    pub fn publish(&self, user_id: &str, key: &str, snapshot: Option<Record>) {
        let topic = (user_id.to_string(), key.to_string());
        let mut channels = self.lock();
        let prune = match channels.get(&topic) {
            Some(tx) if tx.receiver_count() == 0 => true,
            Some(tx) => {
                send_deduplicated(tx, snapshot);
                false
            }
            None => false,
        };
        if prune {
            channels.remove(&topic);
        }
    }

    /// Returns true if anyone is watching this (user, key)
    pub fn is_watched(&self, user_id: &str, key: &str) -> bool {
        self.lock()
            .get(&(user_id.to_string(), key.to_string()))
            .is_some_and(|tx| tx.receiver_count() > 0)
    }

    /// Keys currently watched within one user partition
    pub fn watched_keys(&self, user_id: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|((user, _), tx)| user.as_str() == user_id && tx.receiver_count() > 0)
            .map(|((_, key), _)| key.clone())
            .collect()
    }

    /// Every (user, key) pair currently watched
    pub fn watched_topics(&self) -> Vec<Topic> {
        self.lock()
            .iter()
            .filter(|(_, tx)| tx.receiver_count() > 0)
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Topic, watch::Sender<Option<Record>>>> {
        // A poisoned lock only means a panicking thread held it; the map
        // itself is still consistent (inserts and sends are atomic).
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends only if the snapshot actually differs, so re-reads of unchanged
/// state never wake subscribers
fn send_deduplicated(tx: &watch::Sender<Option<Record>>, snapshot: Option<Record>) {
    tx.send_if_modified(move |current| {
        if *current == snapshot {
            return false;
        }
        *current = snapshot;
        true
    });
}

/// Spawns the background worker that re-reads invalidated keys and
/// publishes fresh snapshots
///
/// The worker processes invalidations in commit order on a single task, so
/// published snapshots never go backwards. It exits when the last sender
/// (the `Store` and its partitions) is dropped.
pub(crate) fn spawn_refresh_worker(
    pool: DbPool,
    notifier: ChangeNotifier,
) -> mpsc::UnboundedSender<Invalidation> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Invalidation>();

    tokio::spawn(async move {
        while let Some(invalidation) = rx.recv().await {
            let topics: Vec<Topic> = match invalidation {
                Invalidation::Key { user_id, key } => {
                    if notifier.is_watched(&user_id, &key) {
                        vec![(user_id, key)]
                    } else {
                        Vec::new()
                    }
                }
                Invalidation::User { user_id } => notifier
                    .watched_keys(&user_id)
                    .into_iter()
                    .map(|key| (user_id.clone(), key))
                    .collect(),
                Invalidation::All => notifier.watched_topics(),
            };

            for (user_id, key) in topics {
                match records::get_by_key(&pool, &key, &user_id).await {
                    Ok(snapshot) => notifier.publish(&user_id, &key, snapshot),
                    Err(e) => {
                        log::warn!("failed to refresh subscription for key '{}': {}", key, e);
                    }
                }
            }
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncstash_core::{SyncStatus, Timestamp};

    fn record(key: &str, user_id: &str, version: i64) -> Record {
        Record {
            key: key.to_string(),
            value: "v".to_string(),
            user_id: user_id.to_string(),
            timestamp: Timestamp::from_millis(version * 100),
            sync_status: SyncStatus::Pending,
            version,
        }
    }

    #[tokio::test]
    async fn test_subscribe_yields_initial_snapshot() {
        let notifier = ChangeNotifier::new();
        let initial = record("A", "u1", 1);

        let mut sub = notifier.subscribe("u1", "A", Some(initial.clone()));

        assert_eq!(sub.next().await, Some(Some(initial)));
    }

    #[tokio::test]
    async fn test_subscribe_with_no_row_yields_none_snapshot() {
        let notifier = ChangeNotifier::new();

        let mut sub = notifier.subscribe("u1", "A", None);

        assert_eq!(sub.next().await, Some(None));
    }

    #[tokio::test]
    async fn test_publish_wakes_subscriber() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe("u1", "A", Some(record("A", "u1", 1)));
        sub.next().await;

        notifier.publish("u1", "A", Some(record("A", "u1", 2)));

        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.version, 2);
    }

    #[tokio::test]
    async fn test_rapid_publishes_coalesce_to_latest() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe("u1", "A", Some(record("A", "u1", 1)));
        sub.next().await;

        notifier.publish("u1", "A", Some(record("A", "u1", 2)));
        notifier.publish("u1", "A", Some(record("A", "u1", 3)));

        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.version, 3);
    }

    #[tokio::test]
    async fn test_identical_snapshot_does_not_wake() {
        let notifier = ChangeNotifier::new();
        let initial = record("A", "u1", 1);
        let mut sub = notifier.subscribe("u1", "A", Some(initial.clone()));
        sub.next().await;

        // Same state re-published, then a real change
        notifier.publish("u1", "A", Some(initial));
        notifier.publish("u1", "A", Some(record("A", "u1", 2)));

        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.version, 2);
    }

    #[tokio::test]
    async fn test_watched_bookkeeping() {
        let notifier = ChangeNotifier::new();

        assert!(!notifier.is_watched("u1", "A"));

        let sub = notifier.subscribe("u1", "A", None);
        let _sub2 = notifier.subscribe("u2", "B", None);

        assert!(notifier.is_watched("u1", "A"));
        assert_eq!(notifier.watched_keys("u1"), vec!["A".to_string()]);
        assert_eq!(notifier.watched_topics().len(), 2);

        drop(sub);
        assert!(!notifier.is_watched("u1", "A"));
        assert!(notifier.watched_keys("u1").is_empty());
    }

    #[tokio::test]
    async fn test_publish_prunes_abandoned_channels() {
        let notifier = ChangeNotifier::new();
        let sub = notifier.subscribe("u1", "A", None);
        drop(sub);

        notifier.publish("u1", "A", Some(record("A", "u1", 1)));

        let channels = notifier.lock();
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn test_late_subscriber_cannot_regress_published_state() {
        let notifier = ChangeNotifier::new();
        let mut first = notifier.subscribe("u1", "A", Some(record("A", "u1", 2)));
        first.next().await;

        notifier.publish("u1", "A", Some(record("A", "u1", 3)));

        // A second subscriber arrives with a read taken before the publish;
        // the channel already carries newer state and must keep it.
        let mut second = notifier.subscribe("u1", "A", Some(record("A", "u1", 2)));

        assert_eq!(second.next().await.unwrap().unwrap().version, 3);
        assert_eq!(first.latest().unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_latest_returns_current_without_waiting() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe("u1", "A", Some(record("A", "u1", 1)));

        assert_eq!(sub.latest().unwrap().version, 1);

        notifier.publish("u1", "A", Some(record("A", "u1", 2)));
        assert_eq!(sub.latest().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_resubscribe_reissues_initial_read() {
        let notifier = ChangeNotifier::new();

        let sub = notifier.subscribe("u1", "A", Some(record("A", "u1", 1)));
        drop(sub);

        let mut sub = notifier.subscribe("u1", "A", Some(record("A", "u1", 5)));
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.version, 5);
    }
}
