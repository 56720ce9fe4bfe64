//! Event Bus (C4) — per-job append-only ordered event log with
//! since-cursor replay, adaptive subscriber pacing, and retention-bounded
//! garbage collection (`spec.md` §4.4).
//!
//! Unlike a plain `tokio::sync::broadcast` channel (the teacher's pattern
//! for its run-events SSE stream — see `cg-gateway`'s prior
//! `runtime::runs`), a subscriber here can attach with an arbitrary
//! `since_event_id` and replay everything it missed, which a broadcast
//! channel's ring buffer cannot do once a receiver lags past its
//! capacity.

mod log;
mod pacing;

pub use pacing::poll_interval;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_core::Stream;
use parking_lot::RwLock;
use uuid::Uuid;

use cg_domain::model::{Event, EventKind, JobStatus};

use log::JobLog;

pub struct EventBus {
    logs: DashMap<Uuid, Arc<RwLock<JobLog>>>,
    keep_alive_interval: Duration,
    max_events_per_job: usize,
    max_bytes_per_job: usize,
    retention_after_terminal: Duration,
}

impl EventBus {
    pub fn new(
        keep_alive_interval: Duration,
        max_events_per_job: usize,
        max_bytes_per_job: usize,
        retention_after_terminal: Duration,
    ) -> Self {
        Self {
            logs: DashMap::new(),
            keep_alive_interval,
            max_events_per_job,
            max_bytes_per_job,
            retention_after_terminal,
        }
    }

    /// Open a log for a new job. `fast_lane` marks jobs requesting
    /// `audio`/`video` artifacts for the tighter post-`job_started`
    /// polling hint (`spec.md` §4.4).
    pub fn register(&self, job_id: Uuid, fast_lane: bool) {
        self.logs.insert(
            job_id,
            Arc::new(RwLock::new(JobLog::new(
                fast_lane,
                self.max_events_per_job,
                self.max_bytes_per_job,
            ))),
        );
    }

    /// `publish(job_id, kind, payload) -> event_id`.
    pub fn publish(&self, job_id: Uuid, kind: EventKind, payload: serde_json::Value) -> Option<u64> {
        debug_assert_ne!(kind, EventKind::KeepAlive, "keep_alive is synthetic, never published");
        let log = self.logs.get(&job_id)?;
        log.write().push(job_id, kind, payload)
    }

    /// `terminate(job_id, terminal_event)` — publishes the terminal event
    /// and closes the log. `kind` must be one of `complete`/`cancelled`/
    /// `error`.
    pub fn terminate(
        &self,
        job_id: Uuid,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Option<u64> {
        debug_assert!(kind.is_terminal(), "terminate() requires a terminal kind");
        self.publish(job_id, kind, payload)
    }

    /// `subscribe(job_id, since_event_id) -> Stream<Event>`. Ends the
    /// stream once a terminal event has been yielded, or immediately if
    /// no log exists for `job_id`.
    pub fn subscribe(&self, job_id: Uuid, since_event_id: u64) -> impl Stream<Item = Event> {
        let log = self.logs.get(&job_id).map(|r| Arc::clone(&r));
        let keep_alive_interval = self.keep_alive_interval;

        async_stream::stream! {
            let Some(log) = log else { return; };
            let mut cursor = since_event_id;
            let mut last_emit = Instant::now();

            loop {
                let (to_yield, status, started_at, closed, fast_lane, terminal_at) = {
                    let guard = log.read();
                    let mut out = Vec::new();

                    if guard.evicted_up_to > 0 && cursor < guard.evicted_up_to {
                        if let Some(front) = guard.events.front() {
                            out.push(gap_marker(job_id, front.event_id));
                            cursor = guard.evicted_up_to;
                        }
                    }

                    for ev in guard.events.iter() {
                        if ev.event_id > cursor {
                            out.push(ev.clone());
                        }
                    }

                    (
                        out,
                        guard.status,
                        guard.started_at,
                        guard.closed,
                        guard.fast_lane,
                        guard.terminal_at,
                    )
                };

                if !to_yield.is_empty() {
                    for ev in to_yield {
                        cursor = cursor.max(ev.event_id);
                        let terminal = ev.kind.is_terminal();
                        last_emit = Instant::now();
                        yield ev;
                        if terminal {
                            return;
                        }
                    }
                    continue;
                }

                if closed {
                    // Closed with nothing left to replay (subscriber was
                    // already caught up to the terminal event).
                    return;
                }

                let elapsed = started_at.map(|s| s.elapsed());
                let post_terminal = terminal_at.is_some();
                let interval = poll_interval(status, elapsed, post_terminal, fast_lane);

                if last_emit.elapsed() >= keep_alive_interval {
                    last_emit = Instant::now();
                    yield Event::keep_alive(job_id);
                }

                tokio::time::sleep(interval).await;
            }
        }
    }

    /// `gc()` — drop logs closed for longer than the retention window.
    /// Call periodically from a background task (`spec.md` §4.4).
    pub fn gc(&self) {
        self.logs.retain(|_, log| {
            let guard = log.read();
            match guard.terminal_at {
                Some(t) => t.elapsed() < self.retention_after_terminal,
                None => true,
            }
        });
    }

    pub fn job_status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.logs.get(&job_id).map(|log| log.read().status)
    }

    /// Time elapsed since the last `status`/`stage_progress` event for
    /// `job_id`, or `None` if no log is open for it (never registered, or
    /// already garbage-collected). Drives the stage-stall watchdog
    /// (`spec.md` §4.5 Timeouts).
    pub fn stage_progress_age(&self, job_id: Uuid) -> Option<Duration> {
        self.logs.get(&job_id).map(|log| log.read().last_progress_at.elapsed())
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

fn gap_marker(job_id: Uuid, dropped_before: u64) -> Event {
    Event {
        event_id: dropped_before.saturating_sub(1),
        job_id,
        kind: EventKind::Status,
        payload: serde_json::json!({ "gap": true, "dropped_before_event_id": dropped_before }),
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn bus() -> EventBus {
        EventBus::new(Duration::from_millis(50), 4, 64 * 1024, Duration::from_secs(120))
    }

    #[tokio::test]
    async fn publish_assigns_increasing_event_ids() {
        let bus = bus();
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);
        let id1 = bus.publish(job_id, EventKind::JobStarted, serde_json::json!({})).unwrap();
        let id2 = bus.publish(job_id, EventKind::StageProgress, serde_json::json!({})).unwrap();
        assert!(id2 > id1);
    }

    #[tokio::test]
    async fn subscribe_replays_events_after_since_id() {
        let bus = bus();
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);
        bus.publish(job_id, EventKind::JobStarted, serde_json::json!({})).unwrap();
        let id2 = bus.publish(job_id, EventKind::StageProgress, serde_json::json!({"n": 1})).unwrap();
        bus.terminate(job_id, EventKind::Complete, serde_json::json!({})).unwrap();

        let stream = bus.subscribe(job_id, id2 - 1);
        tokio::pin!(stream);
        let events: Vec<Event> = stream.collect().await;

        // StageProgress (id2) then Complete — JobStarted already consumed.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, id2);
        assert!(events[1].kind.is_terminal());
    }

    #[tokio::test]
    async fn subscribe_ends_stream_after_terminal_event() {
        let bus = bus();
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);
        bus.terminate(job_id, EventKind::Complete, serde_json::json!({})).unwrap();

        let stream = bus.subscribe(job_id, 0);
        tokio::pin!(stream);
        let events: Vec<Event> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].kind.is_terminal());
    }

    #[tokio::test]
    async fn stage_progress_age_resets_on_status_and_stage_progress_events() {
        let bus = bus();
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let age_before = bus.stage_progress_age(job_id).unwrap();
        assert!(age_before >= Duration::from_millis(20));

        bus.publish(job_id, EventKind::StageProgress, serde_json::json!({"pct": 10})).unwrap();
        let age_after = bus.stage_progress_age(job_id).unwrap();
        assert!(age_after < age_before);
    }

    #[tokio::test]
    async fn stage_progress_age_is_none_for_unknown_job() {
        let bus = bus();
        assert!(bus.stage_progress_age(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn unknown_job_yields_empty_stream() {
        let bus = bus();
        let stream = bus.subscribe(Uuid::new_v4(), 0);
        tokio::pin!(stream);
        let events: Vec<Event> = stream.collect().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn keep_alive_emitted_while_pending_with_no_new_events() {
        let bus = bus();
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);

        let stream = bus.subscribe(job_id, 0);
        tokio::pin!(stream);
        let first = tokio::time::timeout(Duration::from_millis(500), stream.next())
            .await
            .expect("stream should yield a keep_alive before timing out")
            .expect("stream should not end");
        assert_eq!(first.kind, EventKind::KeepAlive);
        assert_eq!(first.event_id, 0);
    }

    #[tokio::test]
    async fn backpressure_evicts_oldest_non_terminal_and_surfaces_gap() {
        let bus = bus(); // max_events = 4
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);

        for i in 0..6u32 {
            bus.publish(job_id, EventKind::StageProgress, serde_json::json!({ "i": i })).unwrap();
        }
        bus.terminate(job_id, EventKind::Complete, serde_json::json!({})).unwrap();

        // Subscriber starts from the very beginning, long past what's
        // still buffered — should see a synthetic gap then the remainder.
        let stream = bus.subscribe(job_id, 0);
        tokio::pin!(stream);
        let events: Vec<Event> = stream.collect().await;

        assert!(events[0].payload.get("gap").is_some());
        assert!(events.last().unwrap().kind.is_terminal());
    }

    #[tokio::test]
    async fn gc_drops_logs_past_retention_window() {
        let bus = EventBus::new(Duration::from_millis(50), 256, 64 * 1024, Duration::from_millis(10));
        let job_id = Uuid::new_v4();
        bus.register(job_id, false);
        bus.terminate(job_id, EventKind::Complete, serde_json::json!({})).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        bus.gc();
        assert_eq!(bus.log_count(), 0);
    }
}
