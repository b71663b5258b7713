use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::models::{estimate_completion, SearchProgress, SearchRecord};
use super::subscription::SearchSubscription;
use super::types::{ProgressError, SearchStatus, SubscriberId};

/// How long a finished search stays resolvable
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(300);

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::UnboundedSender<SearchProgress>,
}

/// A record and its subscribers live and die together
struct SearchEntry {
    record: SearchRecord,
    subscribers: Vec<Subscriber>,
}

/// Search progress manager（内存状态，按搜索ID向订阅者推送进度）
///
/// One instance is built at startup and cloned into every component that
/// reports or streams progress. Clones share state.
///
/// Every subscriber gets its own unbounded FIFO channel. Updates are small and
/// infrequent, so no backpressure is applied; a subscriber that never reads
/// only grows its own backlog until the search is cleaned up.
#[derive(Clone)]
pub struct SearchProgressManager {
    searches: Arc<RwLock<HashMap<String, SearchEntry>>>,
    next_subscriber_id: Arc<AtomicU64>,
    cleanup_delay: Duration,
}

impl SearchProgressManager {
    pub fn new() -> Self {
        Self::with_cleanup_delay(DEFAULT_CLEANUP_DELAY)
    }

    pub fn with_cleanup_delay(cleanup_delay: Duration) -> Self {
        Self {
            searches: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
            cleanup_delay,
        }
    }

    pub fn cleanup_delay(&self) -> Duration {
        self.cleanup_delay
    }

    /// 创建搜索
    pub fn create_search(&self, location: &str, radius: f64) -> String {
        let record = SearchRecord::new(location, radius);
        let search_id = record.id.clone();

        self.searches.write().insert(
            search_id.clone(),
            SearchEntry {
                record,
                subscribers: Vec::new(),
            },
        );

        tracing::info!("Created search {} for location: {} (radius: {})", search_id, location, radius);
        search_id
    }

    /// Record new progress and push a snapshot to every subscriber.
    ///
    /// Unknown ids are logged and ignored: the search may already have been
    /// cleaned up while its driver was still reporting.
    pub fn update_progress(
        &self,
        search_id: &str,
        status: impl Into<SearchStatus>,
        progress: f64,
        current_step: &str,
        message: Option<String>,
        location_info: Option<serde_json::Value>,
    ) {
        let status = status.into();
        let terminal = status.is_terminal();

        let mut searches = self.searches.write();
        let Some(entry) = searches.get_mut(search_id) else {
            tracing::warn!("Search {} not found, dropping update ({})", search_id, status);
            return;
        };

        let record = &mut entry.record;
        record.status = status;
        record.progress = progress;
        record.current_step = current_step.to_string();
        record.message = message;
        if let Some(info) = location_info {
            record.location_info = Some(info.to_string());
        }
        record.estimated_completion = if terminal {
            None
        } else {
            Some(estimate_completion(Utc::now(), progress))
        };

        let snapshot = SearchProgress::from(&*record);
        for subscriber in &entry.subscribers {
            if subscriber.sender.send(snapshot.clone()).is_err() {
                tracing::debug!(
                    "Subscriber {:?} of search {} is gone, update not delivered",
                    subscriber.id,
                    search_id
                );
            }
        }
        drop(searches);

        tracing::debug!("Search {} -> {} {:.0}% ({})", search_id, snapshot.status, progress, current_step);

        if terminal {
            self.schedule_cleanup(search_id.to_string());
        }
    }

    /// 订阅搜索进度
    ///
    /// The returned subscription already holds a snapshot of the current state.
    pub fn subscribe(&self, search_id: &str) -> Result<SearchSubscription, ProgressError> {
        let mut searches = self.searches.write();
        let entry = searches
            .get_mut(search_id)
            .ok_or_else(|| ProgressError::NotFound(search_id.to_string()))?;

        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(SearchProgress::from(&entry.record));
        entry.subscribers.push(Subscriber { id, sender });
        drop(searches);

        tracing::debug!("Subscriber {:?} attached to search {}", id, search_id);
        Ok(SearchSubscription::new(self.clone(), search_id.to_string(), id, receiver))
    }

    /// 取消订阅（幂等）
    pub fn unsubscribe(&self, search_id: &str, subscriber: SubscriberId) {
        let mut searches = self.searches.write();
        if let Some(entry) = searches.get_mut(search_id) {
            let before = entry.subscribers.len();
            entry.subscribers.retain(|s| s.id != subscriber);
            if entry.subscribers.len() < before {
                tracing::debug!("Subscriber {:?} detached from search {}", subscriber, search_id);
            }
        }
    }

    /// Current snapshot without subscribing
    pub fn get_search(&self, search_id: &str) -> Option<SearchProgress> {
        self.searches
            .read()
            .get(search_id)
            .map(|entry| SearchProgress::from(&entry.record))
    }

    pub fn active_searches(&self) -> usize {
        self.searches.read().len()
    }

    fn schedule_cleanup(&self, search_id: String) {
        let manager = self.clone();
        let delay = self.cleanup_delay;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.cleanup(&search_id);
                });
            }
            Err(_) => {
                tracing::warn!("No tokio runtime, search {} will not be cleaned up", search_id);
            }
        }
    }

    /// Drops the record and every subscriber channel, attached or not
    fn cleanup(&self, search_id: &str) {
        if let Some(entry) = self.searches.write().remove(search_id) {
            tracing::info!(
                "Cleaned up search {} ({} subscribers still attached)",
                search_id,
                entry.subscribers.len()
            );
        }
    }

    /// Number of attached subscribers, `None` once the search is gone
    pub fn subscriber_count(&self, search_id: &str) -> Option<usize> {
        self.searches.read().get(search_id).map(|entry| entry.subscribers.len())
    }
}

impl Default for SearchProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn test_manager() -> SearchProgressManager {
        SearchProgressManager::with_cleanup_delay(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_subscribe_gets_pending_snapshot_first() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);

        let mut sub = manager.subscribe(&id).unwrap();
        let first = sub.recv().await.unwrap();
        assert_eq!(first.search_id, id);
        assert_eq!(first.status, SearchStatus::Pending);
        assert_eq!(first.progress_percentage, 0.0);
        assert_eq!(first.current_step, "Initializing search");
        assert!(first.estimated_completion.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_search_fails() {
        let manager = test_manager();
        let err = manager.subscribe("does-not-exist").err().unwrap();
        assert_eq!(err, ProgressError::NotFound("does-not-exist".to_string()));
    }

    #[tokio::test]
    async fn test_update_unknown_search_is_noop() {
        let manager = test_manager();
        manager.update_progress("ghost", SearchStatus::Searching, 50.0, "Querying sources", None, None);
        manager.update_progress("ghost", SearchStatus::Complete, 100.0, "Done", None, None);
        assert_eq!(manager.active_searches(), 0);
    }

    #[tokio::test]
    async fn test_example_scenario_ordering() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);
        let mut early = manager.subscribe(&id).unwrap();

        manager.update_progress(&id, "geocoding", 10.0, "Converting location", None, None);
        manager.update_progress(&id, "searching", 50.0, "Querying sources", None, None);
        let mut late = manager.subscribe(&id).unwrap();
        manager.update_progress(
            &id,
            "complete",
            100.0,
            "Done",
            Some("Found 5 results".to_string()),
            None,
        );

        let mut seen = Vec::new();
        while let Some(progress) = early.recv().await {
            seen.push((progress.status, progress.progress_percentage));
        }
        assert_eq!(
            seen,
            vec![
                (SearchStatus::Pending, 0.0),
                (SearchStatus::Geocoding, 10.0),
                (SearchStatus::Searching, 50.0),
                (SearchStatus::Complete, 100.0),
            ]
        );

        let current = late.recv().await.unwrap();
        assert_eq!(current.status, SearchStatus::Searching);
        assert_eq!(current.progress_percentage, 50.0);
        let done = late.recv().await.unwrap();
        assert_eq!(done.status, SearchStatus::Complete);
        assert_eq!(done.message.as_deref(), Some("Found 5 results"));
        assert!(done.estimated_completion.is_none());
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_location_info_is_kept_until_replaced() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);

        let info = serde_json::json!({ "city": "Austin", "state": "Texas" });
        manager.update_progress(&id, "searching", 20.0, "Location found", None, Some(info));
        manager.update_progress(&id, "searching", 30.0, "Checking existing data", None, None);

        let snapshot = manager.get_search(&id).unwrap();
        let stored: serde_json::Value =
            serde_json::from_str(snapshot.location_info.as_deref().unwrap()).unwrap();
        assert_eq!(stored["city"], "Austin");
        assert_eq!(snapshot.current_step, "Checking existing data");
    }

    #[tokio::test]
    async fn test_estimated_completion_tracks_progress() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);

        let before = Utc::now();
        manager.update_progress(&id, "searching", 50.0, "Querying sources", None, None);
        let eta = manager.get_search(&id).unwrap().estimated_completion.unwrap();
        assert!(eta >= before + chrono::Duration::seconds(15));
        assert!(eta <= Utc::now() + chrono::Duration::seconds(15));

        manager.update_progress(&id, "error", 50.0, "Search failed", Some("boom".to_string()), None);
        assert!(manager.get_search(&id).unwrap().estimated_completion.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);
        let sub = manager.subscribe(&id).unwrap();
        assert_eq!(manager.subscriber_count(&id), Some(1));

        manager.unsubscribe(&id, sub.id());
        manager.unsubscribe(&id, sub.id());
        manager.unsubscribe("ghost", sub.id());
        assert_eq!(manager.subscriber_count(&id), Some(0));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);
        {
            let _first = manager.subscribe(&id).unwrap();
            let _second = manager.subscribe(&id).unwrap();
            assert_eq!(manager.subscriber_count(&id), Some(2));
        }
        assert_eq!(manager.subscriber_count(&id), Some(0));
    }

    #[tokio::test]
    async fn test_terminal_search_is_cleaned_up() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);
        let mut sub = manager.subscribe(&id).unwrap();

        manager.update_progress(&id, "complete", 100.0, "done", None, None);
        assert!(manager.get_search(&id).is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(manager.get_search(&id).is_none());
        assert_eq!(manager.active_searches(), 0);
        assert_eq!(
            manager.subscribe(&id).err(),
            Some(ProgressError::NotFound(id.clone()))
        );
        manager.update_progress(&id, "searching", 10.0, "late update", None, None);
        assert!(manager.get_search(&id).is_none());

        // Pending snapshot and completion, then the stream is over
        assert_eq!(manager.subscriber_count(&id), None);
        assert_eq!(sub.try_recv().unwrap().status, SearchStatus::Pending);
        assert_eq!(sub.try_recv().unwrap().status, SearchStatus::Complete);
        assert_eq!(sub.try_recv().err(), Some(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_nothing_is_read_past_a_terminal_snapshot() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);
        let mut polled = manager.subscribe(&id).unwrap();
        let mut awaited = manager.subscribe(&id).unwrap();

        manager.update_progress(&id, "complete", 100.0, "done", None, None);
        // Still delivered to the channels until cleanup runs
        manager.update_progress(&id, "searching", 50.0, "late update", None, None);

        assert_eq!(polled.try_recv().unwrap().status, SearchStatus::Pending);
        assert_eq!(polled.try_recv().unwrap().status, SearchStatus::Complete);
        assert_eq!(polled.try_recv().err(), Some(TryRecvError::Disconnected));

        assert_eq!(awaited.recv().await.unwrap().status, SearchStatus::Pending);
        assert_eq!(awaited.recv().await.unwrap().status, SearchStatus::Complete);
        assert!(awaited.recv().await.is_none());
        assert_eq!(awaited.try_recv().err(), Some(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_non_terminal_search_is_not_cleaned_up() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);
        manager.update_progress(&id, "searching_google", 70.0, "Searching Google Places", None, None);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            manager.get_search(&id).unwrap().status,
            SearchStatus::Other("searching_google".to_string())
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_block_others() {
        let manager = test_manager();
        let id = manager.create_search("Austin", 10.0);

        let gone_id = SubscriberId(999);
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        manager
            .searches
            .write()
            .get_mut(&id)
            .unwrap()
            .subscribers
            .push(Subscriber { id: gone_id, sender });
        let mut alive = manager.subscribe(&id).unwrap();

        manager.update_progress(&id, "geocoding", 10.0, "Converting location", None, None);

        assert_eq!(alive.recv().await.unwrap().status, SearchStatus::Pending);
        assert_eq!(alive.recv().await.unwrap().status, SearchStatus::Geocoding);
        assert_eq!(manager.subscriber_count(&id), Some(2));
        manager.unsubscribe(&id, gone_id);
        assert_eq!(manager.subscriber_count(&id), Some(1));
    }

    #[tokio::test]
    async fn test_searches_are_independent() {
        let manager = test_manager();
        let austin = manager.create_search("Austin", 10.0);
        let denver = manager.create_search("Denver", 5.0);
        let mut sub = manager.subscribe(&denver).unwrap();

        manager.update_progress(&austin, "complete", 100.0, "done", None, None);

        assert_eq!(sub.recv().await.unwrap().status, SearchStatus::Pending);
        assert_eq!(sub.try_recv().err(), Some(TryRecvError::Empty));
        assert_eq!(manager.get_search(&denver).unwrap().status, SearchStatus::Pending);
    }
}
