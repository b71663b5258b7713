use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::manager::SearchProgressManager;
use super::models::SearchProgress;
use super::types::SubscriberId;

/// Live view of one search's progress.
///
/// `recv` stops after the first terminal snapshot. Dropping the subscription
/// detaches it from the manager, however the consumer exits.
pub struct SearchSubscription {
    manager: SearchProgressManager,
    search_id: String,
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<SearchProgress>,
    finished: bool,
}

impl SearchSubscription {
    pub(crate) fn new(
        manager: SearchProgressManager,
        search_id: String,
        id: SubscriberId,
        receiver: mpsc::UnboundedReceiver<SearchProgress>,
    ) -> Self {
        Self {
            manager,
            search_id,
            id,
            receiver,
            finished: false,
        }
    }

    pub fn search_id(&self) -> &str {
        &self.search_id
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next snapshot, or `None` once a terminal snapshot was returned or the
    /// search was cleaned up.
    pub async fn recv(&mut self) -> Option<SearchProgress> {
        if self.finished {
            return None;
        }
        let progress = self.receiver.recv().await;
        match &progress {
            Some(p) if p.is_terminal() => self.finished = true,
            None => self.finished = true,
            _ => {}
        }
        progress
    }

    /// Non-blocking `recv`. Reports `Disconnected` once a terminal snapshot
    /// was returned, like `recv` reports `None`.
    pub fn try_recv(&mut self) -> Result<SearchProgress, TryRecvError> {
        if self.finished {
            return Err(TryRecvError::Disconnected);
        }
        let progress = self.receiver.try_recv();
        match &progress {
            Ok(p) if p.is_terminal() => self.finished = true,
            Err(TryRecvError::Disconnected) => self.finished = true,
            _ => {}
        }
        progress
    }
}

impl Drop for SearchSubscription {
    fn drop(&mut self) {
        self.manager.unsubscribe(&self.search_id, self.id);
    }
}
