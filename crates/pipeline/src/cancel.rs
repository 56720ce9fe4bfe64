//! Per-job cancellation tokens (`spec.md` §4.5 Cancellation, §5
//! Cancellation semantics), adapted from the gateway's session-level
//! `CancelToken`/`CancelMap` to key by `job_id` instead of session key —
//! there is no group/cascade concept here since jobs don't nest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

/// Checked by C6 at every stage boundary and natural suspension point
/// (`spec.md` §4.5).
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the active cancel token for every running job. The Scheduler
/// registers one per admitted job and removes it once the job reaches a
/// terminal state; the `/api/jobs/{id}/cancel` handler looks it up and
/// flips it.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: DashMap<Uuid, CancelToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn register(&self, job_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.insert(job_id, token.clone());
        token
    }

    /// Idempotent — setting the flag twice, or on an unknown job, is not
    /// an error (`spec.md` §4.5 "Sets cancel_flag = true (idempotent)").
    pub fn cancel(&self, job_id: Uuid) -> bool {
        if let Some(token) = self.tokens.get(&job_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, job_id: Uuid) {
        self.tokens.remove(&job_id);
    }

    pub fn is_registered(&self, job_id: Uuid) -> bool {
        self.tokens.contains_key(&job_id)
    }
}
