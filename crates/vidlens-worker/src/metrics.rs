//! Worker metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Jobs that reached a terminal state, by status and error kind.
    pub const JOBS_FINISHED_TOTAL: &str = "vidlens_worker_jobs_finished_total";

    /// Outcomes thrown away, by reason.
    pub const JOBS_DISCARDED_TOTAL: &str = "vidlens_worker_jobs_discarded_total";

    /// Time from claim to terminal write, in seconds.
    pub const JOB_DURATION_SECONDS: &str = "vidlens_worker_job_duration_seconds";

    /// Jobs failed by the stall reconciler.
    pub const JOBS_STALLED_TOTAL: &str = "vidlens_worker_jobs_stalled_total";

    /// Tasks moved to the dead letter queue.
    pub const TASKS_DEAD_LETTERED_TOTAL: &str = "vidlens_worker_tasks_dead_lettered_total";
}

pub fn record_finished(status: &str, kind: Option<&str>, duration_secs: f64) {
    counter!(
        names::JOBS_FINISHED_TOTAL,
        "status" => status.to_string(),
        "kind" => kind.unwrap_or("none").to_string()
    )
    .increment(1);

    histogram!(names::JOB_DURATION_SECONDS, "status" => status.to_string()).record(duration_secs);
}

pub fn record_discarded(reason: &str) {
    counter!(names::JOBS_DISCARDED_TOTAL, "reason" => reason.to_string()).increment(1);
}

pub fn record_stalled() {
    counter!(names::JOBS_STALLED_TOTAL).increment(1);
}

pub fn record_dead_lettered() {
    counter!(names::TASKS_DEAD_LETTERED_TOTAL).increment(1);
}
