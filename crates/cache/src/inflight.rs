use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use cg_domain::model::ArtifactBundle;

use crate::PublishError;

/// Token handed to the single caller that won `begin()` for a fingerprint.
/// `generation` pins it to one specific inflight slot so a leader that
/// raced an `invalidate`/retry can never resolve a later generation's
/// followers (see `ContentCache::token_is_current`).
#[derive(Debug, Clone)]
pub struct LeaderToken {
    pub fingerprint: String,
    pub generation: u64,
}

pub enum BeginOutcome {
    Leader(LeaderToken),
    Follower(Arc<Inflight>),
}

/// The latch a follower waits on. Resolved exactly once, by the leader's
/// `publish` or `abort`.
pub struct Inflight {
    pub(crate) generation: u64,
    notify: Notify,
    result: Mutex<Option<Result<ArtifactBundle, PublishError>>>,
}

impl Inflight {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            notify: Notify::new(),
            result: Mutex::new(None),
        }
    }

    pub(crate) fn resolve(&self, result: Result<ArtifactBundle, PublishError>) {
        *self.result.lock() = Some(result);
        self.notify.notify_waiters();
    }

    /// Await the leader's outcome. A follower that subscribed before
    /// `resolve()` ran is woken by `notify_waiters`; one that arrives
    /// after sees `result` already populated and returns immediately —
    /// no missed-wakeup window.
    pub async fn wait(&self) -> Result<ArtifactBundle, PublishError> {
        loop {
            if let Some(result) = self.result.lock().clone() {
                return result;
            }
            let notified = self.notify.notified();
            if self.result.lock().is_some() {
                continue;
            }
            notified.await;
        }
    }
}
