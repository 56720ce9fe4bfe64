use std::collections::VecDeque;
use std::time::Instant;

use cg_domain::model::{Event, EventKind, JobStatus};

/// Per-job append-only event log. Bounded by both entry count
/// (`subscriber_buffer`, reused here as the shared log's cap — every
/// subscriber reads from this one ordered log rather than an independent
/// per-subscription channel) and total payload bytes
/// (`max_bytes_per_job`). When full, the oldest *non-terminal* event is
/// evicted; terminal events are never dropped (`spec.md` §5 Backpressure).
pub struct JobLog {
    pub(crate) events: VecDeque<Event>,
    next_event_id: u64,
    pub(crate) status: JobStatus,
    pub(crate) started_at: Option<Instant>,
    pub(crate) terminal_at: Option<Instant>,
    pub(crate) closed: bool,
    pub(crate) fast_lane: bool,
    total_bytes: usize,
    max_events: usize,
    max_bytes: usize,
    /// Lowest event_id ever evicted; used to synthesize the gap marker's
    /// `dropped_before` boundary for a subscriber whose cursor predates it.
    pub(crate) evicted_up_to: u64,
    /// Last time a `status` (stage entry) or `stage_progress` event was
    /// pushed. Starts at registration so a job that never emits a single
    /// stage event still trips the stall watchdog after `stage_timeout`
    /// (`spec.md` §4.5 Timeouts).
    pub(crate) last_progress_at: Instant,
}

impl JobLog {
    pub fn new(fast_lane: bool, max_events: usize, max_bytes: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_event_id: 1,
            status: JobStatus::Pending,
            started_at: None,
            terminal_at: None,
            closed: false,
            fast_lane,
            total_bytes: 0,
            max_events,
            max_bytes,
            evicted_up_to: 0,
            last_progress_at: Instant::now(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append an event, assigning the next sequence number. Returns the
    /// assigned `event_id`. A no-op (returns `None`) once the log is
    /// closed — the terminal event already written is final.
    pub fn push(&mut self, job_id: uuid::Uuid, kind: EventKind, payload: serde_json::Value) -> Option<u64> {
        if self.closed {
            return None;
        }

        let event_id = self.next_event_id;
        self.next_event_id += 1;

        if kind == EventKind::JobStarted {
            self.status = JobStatus::Running;
            self.started_at = Some(Instant::now());
        }

        if matches!(kind, EventKind::Status | EventKind::StageProgress) {
            self.last_progress_at = Instant::now();
        }

        let size = payload.to_string().len();
        let event = Event {
            event_id,
            job_id,
            kind,
            payload,
            created_at: chrono::Utc::now(),
        };
        self.events.push_back(event);
        self.total_bytes += size;

        self.evict_overflow();

        if kind.is_terminal() {
            self.status = match kind {
                EventKind::Complete => JobStatus::Completed,
                EventKind::Cancelled => JobStatus::Cancelled,
                EventKind::Error => JobStatus::Failed,
                _ => unreachable!("is_terminal() only true for these three"),
            };
            self.terminal_at = Some(Instant::now());
            self.closed = true;
        }

        Some(event_id)
    }

    fn evict_overflow(&mut self) {
        while self.events.len() > self.max_events || self.total_bytes > self.max_bytes {
            // The only terminal event is always the last one pushed, so
            // the front is non-terminal whenever eviction is still needed.
            match self.events.front() {
                Some(front) if !front.kind.is_terminal() => {
                    let front = self.events.pop_front().unwrap();
                    self.total_bytes = self.total_bytes.saturating_sub(front.payload.to_string().len());
                    self.evicted_up_to = front.event_id;
                }
                _ => break,
            }
        }
    }
}
