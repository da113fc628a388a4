//! Metric names, their static metadata, and per-job value derivation.

use crate::history::SessionRow;
use crate::timestamp::parse_timestamp;
use chrono::{DateTime, Utc};

pub const JOB_COUNT: &str = "cloudberry.job.count";
pub const JOB_STATUS: &str = "cloudberry.job.status";
pub const JOB_FILES_UPLOADED: &str = "cloudberry.job.files_uploaded";
pub const JOB_DURATION: &str = "cloudberry.job.job_duration";
pub const JOB_TIME_SINCE_LAST_START: &str = "cloudberry.job.time_since_last_start";
pub const JOB_SIZE_UPLOADED: &str = "cloudberry.job.size_uploaded";
pub const JOB_SIZE_TOTAL: &str = "cloudberry.job.size_total";
pub const JOB_FILES: &str = "cloudberry.job.files";

/// Out-of-band metadata for one metric name: rate type, unit, description.
#[derive(Debug)]
pub struct MetricMeta {
    pub metric: &'static str,
    pub rate: &'static str,
    pub unit: &'static str,
    pub desc: &'static str,
}

/// All metrics this collector can emit. Metadata is static, populated from
/// this table exactly once per metric per run by the emitter.
pub const METADATA: &[MetricMeta] = &[
    MetricMeta {
        metric: JOB_COUNT,
        rate: "gauge",
        unit: "count",
        desc: "Number of backup and consistency-check jobs registered.",
    },
    MetricMeta {
        metric: JOB_STATUS,
        rate: "gauge",
        unit: "count",
        desc: "The last reported status of the last job run.",
    },
    MetricMeta {
        metric: JOB_FILES_UPLOADED,
        rate: "gauge",
        unit: "count",
        desc: "The number of files uploaded in the last job run.",
    },
    MetricMeta {
        metric: JOB_DURATION,
        rate: "gauge",
        unit: "seconds",
        desc: "The last reported duration of the job.",
    },
    MetricMeta {
        metric: JOB_TIME_SINCE_LAST_START,
        rate: "gauge",
        unit: "seconds",
        desc: "Time since the job last started.",
    },
    MetricMeta {
        metric: JOB_SIZE_UPLOADED,
        rate: "gauge",
        unit: "bytes",
        desc: "The size of the data that was uploaded as reported by the last run of the job.",
    },
    MetricMeta {
        metric: JOB_SIZE_TOTAL,
        rate: "gauge",
        unit: "bytes",
        desc: "The total size of the last backup job (i.e. not just what was uploaded).",
    },
    MetricMeta {
        metric: JOB_FILES,
        rate: "gauge",
        unit: "count",
        desc: "The operation taken on the file during the last job run. -1 = purged, 1 = backed up. \
               Filenames are sanitised: letters, numbers, underscores, periods and hyphens are kept, \
               slashes are converted to hyphens, spaces to underscores, everything else is stripped.",
    },
];

/// Look up the static metadata entry for a metric name.
pub fn metadata_for(metric: &str) -> Option<&'static MetricMeta> {
    METADATA.iter().find(|m| m.metric == metric)
}

/// The reportable values derived from a job's most recent session.
#[derive(Debug)]
pub struct JobValues {
    pub status: i64,
    pub files_uploaded: i64,
    pub job_duration: f64,
    /// None when the session's start timestamp does not parse; the other
    /// values still emit.
    pub time_since_last_start: Option<f64>,
    pub size_uploaded: f64,
    pub size_total: f64,
}

/// Derive the per-job gauge values from the latest session row.
///
/// Pure apart from the warning logged when `date_start_utc` is malformed.
pub fn derive(session: &SessionRow, now: DateTime<Utc>) -> JobValues {
    let time_since_last_start = match parse_timestamp(&session.date_start_utc) {
        Ok(started) => Some((now - started).num_seconds() as f64),
        Err(e) => {
            tracing::warn!(
                error = %e,
                plan_id = %session.plan_id,
                start = %session.date_start_utc,
                "unparsable session start timestamp; skipping time_since_last_start"
            );
            None
        }
    };

    JobValues {
        status: session.result,
        files_uploaded: session.uploaded_count,
        job_duration: session.duration as f64,
        time_since_last_start,
        size_uploaded: session.uploaded_size,
        size_total: session.total_size,
    }
}

/// Remap an item-operation code for emission: 0 (purge) becomes -1 so a
/// purge is visually distinct from a backup (1) on a graph. Unknown codes
/// pass through unchanged.
pub fn remap_operation(code: i64) -> i64 {
    if code == 0 {
        -1
    } else {
        code
    }
}

/// Advisory label for a session result code. Used in diagnostics only,
/// never in emitted data; the raw code is the signal of record.
pub fn status_label(code: i64) -> &'static str {
    match code {
        2 => "running",
        6 => "success",
        9 => "user interrupted",
        _ => "unknown",
    }
}

/// Advisory label for an item-operation code. Diagnostics only.
pub fn operation_label(code: i64) -> &'static str {
    match code {
        0 => "purge",
        1 => "backup",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(date_start_utc: &str) -> SessionRow {
        SessionRow {
            id: 7,
            plan_id: "plan-1".to_string(),
            date_start_utc: date_start_utc.to_string(),
            duration: 120,
            result: 6,
            uploaded_count: 5,
            scanned_count: 10,
            purged_count: 0,
            total_count: 10,
            failed_count: 0,
            uploaded_size: 1024.0,
            scanned_size: 4096.0,
            total_size: 2048.0,
        }
    }

    #[test]
    fn derives_all_values_from_a_good_row() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let v = derive(&session("20240101020000"), now);
        assert_eq!(v.status, 6);
        assert_eq!(v.files_uploaded, 5);
        assert_eq!(v.job_duration, 120.0);
        assert_eq!(v.time_since_last_start, Some(3600.0));
        assert_eq!(v.size_uploaded, 1024.0);
        assert_eq!(v.size_total, 2048.0);
    }

    #[test]
    fn bad_start_timestamp_skips_only_staleness() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let v = derive(&session("garbage"), now);
        assert_eq!(v.time_since_last_start, None);
        assert_eq!(v.status, 6);
        assert_eq!(v.job_duration, 120.0);
    }

    #[test]
    fn operation_remap() {
        assert_eq!(remap_operation(0), -1);
        assert_eq!(remap_operation(1), 1);
        assert_eq!(remap_operation(5), 5);
        assert_eq!(remap_operation(-3), -3);
    }

    #[test]
    fn every_metric_has_metadata() {
        for metric in [
            JOB_COUNT,
            JOB_STATUS,
            JOB_FILES_UPLOADED,
            JOB_DURATION,
            JOB_TIME_SINCE_LAST_START,
            JOB_SIZE_UPLOADED,
            JOB_SIZE_TOTAL,
            JOB_FILES,
        ] {
            let meta = metadata_for(metric).expect(metric);
            assert_eq!(meta.rate, "gauge");
            assert!(!meta.unit.is_empty());
            assert!(!meta.desc.is_empty());
        }
    }

    #[test]
    fn advisory_labels() {
        assert_eq!(status_label(6), "success");
        assert_eq!(status_label(42), "unknown");
        assert_eq!(operation_label(0), "purge");
        assert_eq!(operation_label(1), "backup");
        assert_eq!(operation_label(9), "unknown");
    }
}
