//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const CLIPS_FETCHED_TOTAL: &str = "camcount_clips_fetched_total";
    pub const CLIPS_FETCH_FAILED_TOTAL: &str = "camcount_clips_fetch_failed_total";
    pub const CLIPS_PROCESSED_TOTAL: &str = "camcount_clips_processed_total";
    pub const CLIPS_FAILED_TOTAL: &str = "camcount_clips_failed_total";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "camcount_download_duration_seconds";
    pub const PROCESSING_DURATION_SECONDS: &str = "camcount_processing_duration_seconds";
}

pub fn record_fetch(group_id: &str, fetched: bool) {
    let labels = [("group", group_id.to_string())];
    if fetched {
        counter!(names::CLIPS_FETCHED_TOTAL, &labels).increment(1);
    } else {
        counter!(names::CLIPS_FETCH_FAILED_TOTAL, &labels).increment(1);
    }
}

pub fn record_clip_processed(group_id: &str) {
    let labels = [("group", group_id.to_string())];
    counter!(names::CLIPS_PROCESSED_TOTAL, &labels).increment(1);
}

pub fn record_clip_failed(group_id: &str, kind: &str) {
    let labels = [("group", group_id.to_string()), ("kind", kind.to_string())];
    counter!(names::CLIPS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_download_duration(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_processing_duration(request_id: &str, duration_secs: f64) {
    let labels = [("request", request_id.to_string())];
    histogram!(names::PROCESSING_DURATION_SECONDS, &labels).record(duration_secs);
}
