use std::time::Duration;

use cg_domain::model::JobStatus;

/// Subscriber-side polling period the Bus hands back to its caller for a
/// given job's current phase (`spec.md` §4.4 Adaptive pacing).
///
/// `elapsed_since_start` is `None` while the job hasn't entered `running`
/// yet. `post_terminal` takes priority once a terminal event has been
/// written — late `artifact_ready` events still need a responsive drain
/// window (§9). `fast_lane` is set for jobs requesting `audio`/`video`,
/// whose artifacts tend to land right before the terminal event.
pub fn poll_interval(
    status: JobStatus,
    elapsed_since_start: Option<Duration>,
    post_terminal: bool,
    fast_lane: bool,
) -> Duration {
    if post_terminal {
        return Duration::from_millis(500);
    }

    match status {
        JobStatus::Pending => Duration::from_millis(1_000),
        JobStatus::Running => {
            if fast_lane {
                return Duration::from_millis(200);
            }
            match elapsed_since_start {
                Some(d) if d < Duration::from_secs(30) => Duration::from_millis(300),
                Some(d) if d < Duration::from_secs(120) => Duration::from_millis(500),
                _ => Duration::from_millis(1_000),
            }
        }
        // Completed/Failed/Cancelled without a recorded terminal_at yet
        // (shouldn't normally happen — terminate() sets both together).
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
            Duration::from_millis(500)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_one_second() {
        assert_eq!(
            poll_interval(JobStatus::Pending, None, false, false),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn running_under_30s_is_300ms() {
        assert_eq!(
            poll_interval(JobStatus::Running, Some(Duration::from_secs(5)), false, false),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn running_30_to_120s_is_500ms() {
        assert_eq!(
            poll_interval(JobStatus::Running, Some(Duration::from_secs(60)), false, false),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn running_over_120s_is_one_second() {
        assert_eq!(
            poll_interval(JobStatus::Running, Some(Duration::from_secs(200)), false, false),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn post_terminal_is_500ms_regardless_of_status() {
        assert_eq!(
            poll_interval(JobStatus::Completed, None, true, false),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn fast_lane_running_is_200ms_even_past_30s() {
        assert_eq!(
            poll_interval(JobStatus::Running, Some(Duration::from_secs(90)), false, true),
            Duration::from_millis(200)
        );
    }
}
