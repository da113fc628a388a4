//! One collection pass: discover plans, correlate each backup plan with
//! its most recent session, derive the gauge values, emit.
//!
//! Fatal preconditions (nothing discovered, no database) abort before any
//! emission; everything after that is per-unit: a bad row or failed write
//! is logged and skipped, never fatal.

use crate::config::CollectorConfig;
use crate::discover::{self, BackupPlan};
use crate::emit::Emitter;
use crate::history::{self, SessionRow};
use crate::metrics;
use crate::timestamp::{format_timestamp, parse_timestamp};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

/// Fatal preconditions. Anything here means no metrics were emitted.
#[derive(Debug)]
pub enum PipelineError {
    /// The walk found no plan documents at all.
    NoPlans { dir: PathBuf },
    /// The walk never located the history log.
    NoDatabase { dir: PathBuf },
    /// The history log exists but could not be opened.
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::NoPlans { dir } => {
                write!(f, "did not locate any plan documents under {}", dir.display())
            }
            PipelineError::NoDatabase { dir } => {
                write!(f, "did not locate cbbackup.db under {}", dir.display())
            }
            PipelineError::OpenDatabase { path, source } => {
                write!(
                    f,
                    "failed to open history log {}: {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::OpenDatabase { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Run one full pass, writing metric records to `out`.
pub fn run<W: Write>(config: &CollectorConfig, out: W) -> Result<(), PipelineError> {
    let found = discover::discover(&config.data_dir);
    let discovered = found.backups.len() + found.consistency_checks.len();

    if discovered == 0 {
        return Err(PipelineError::NoPlans {
            dir: config.data_dir.clone(),
        });
    }
    let db_path = found.database.clone().ok_or(PipelineError::NoDatabase {
        dir: config.data_dir.clone(),
    })?;
    let conn = history::open_read_only(&db_path).map_err(|e| PipelineError::OpenDatabase {
        path: db_path.clone(),
        source: e,
    })?;

    tracing::info!(
        backups = found.backups.len(),
        consistency_checks = found.consistency_checks.len(),
        database = %db_path.display(),
        "discovery complete"
    );

    let mut emitter = Emitter::new(out);
    emitter.point(
        metrics::JOB_COUNT,
        discovered as i64,
        base_tags(config),
    );

    // Consistency-check plans are counted above but carry no backup
    // telemetry worth reporting; only backup plans get execution metrics.
    for plan in &found.backups {
        let session = match history::latest_session(&conn, &plan.id) {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(plan = %plan.name, "no execution history, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, plan = %plan.name, "history query failed, skipping");
                continue;
            }
        };

        report_session(&mut emitter, config, plan, &session);

        if config.report_file_operations {
            report_file_operations(&conn, &mut emitter, config, plan, &session);
        }
    }

    Ok(())
}

fn report_session<W: Write>(
    emitter: &mut Emitter<W>,
    config: &CollectorConfig,
    plan: &BackupPlan,
    session: &SessionRow,
) {
    let values = metrics::derive(session, Utc::now());
    tracing::debug!(
        plan = %plan.name,
        status = metrics::status_label(values.status),
        scanned = session.scanned_count,
        scanned_bytes = session.scanned_size,
        purged = session.purged_count,
        failed = session.failed_count,
        total = session.total_count,
        "reporting last run"
    );

    let tags = job_tags(config, &plan.name);
    emitter.point(metrics::JOB_STATUS, values.status, tags.clone());
    emitter.point(metrics::JOB_FILES_UPLOADED, values.files_uploaded, tags.clone());
    emitter.point(metrics::JOB_DURATION, values.job_duration, tags.clone());
    if let Some(staleness) = values.time_since_last_start {
        emitter.point(metrics::JOB_TIME_SINCE_LAST_START, staleness, tags.clone());
    }
    emitter.point(metrics::JOB_SIZE_UPLOADED, values.size_uploaded, tags.clone());
    emitter.point(metrics::JOB_SIZE_TOTAL, values.size_total, tags);
}

/// Emit one point per file operation in the plan's latest session. The
/// session-id join is tried first; a log revision without usable session
/// keys yields nothing there, so fall back to the start/end window join.
fn report_file_operations<W: Write>(
    conn: &Connection,
    emitter: &mut Emitter<W>,
    config: &CollectorConfig,
    plan: &BackupPlan,
    session: &SessionRow,
) {
    let mut items = match history::session_items(conn, &plan.id, session.id) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, plan = %plan.name, "file-operation query failed");
            return;
        }
    };

    if items.is_empty() {
        if let Some(fallback) = window_items(conn, plan, session) {
            items = fallback;
        }
    }

    for item in &items {
        // Only the filename component goes out; full paths would blow up
        // the tag cardinality and the output size.
        let filename = file_component(&item.local_path);
        tracing::debug!(
            plan = %plan.name,
            file = filename,
            operation = metrics::operation_label(item.operation),
            size = item.size,
            finished = %item.date_finished_utc,
            "file operation"
        );

        let mut tags = job_tags(config, &plan.name);
        tags.insert("file".to_string(), filename.to_string());
        emitter.point(
            metrics::JOB_FILES,
            metrics::remap_operation(item.operation),
            tags,
        );
    }
}

fn window_items(
    conn: &Connection,
    plan: &BackupPlan,
    session: &SessionRow,
) -> Option<Vec<history::ItemRow>> {
    let start = match parse_timestamp(&session.date_start_utc) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(
                error = %e,
                plan = %plan.name,
                "cannot window-join file operations without a session start time"
            );
            return None;
        }
    };
    let end = start + chrono::Duration::seconds(session.duration);

    match history::session_items_in_window(
        conn,
        &plan.id,
        &session.date_start_utc,
        &format_timestamp(end),
    ) {
        Ok(items) => Some(items),
        Err(e) => {
            tracing::warn!(error = %e, plan = %plan.name, "window-join query failed");
            None
        }
    }
}

/// Filename component of a path, splitting on either separator flavor:
/// the log records Windows paths even when this collector runs elsewhere.
fn file_component(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn base_tags(config: &CollectorConfig) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if config.omit_host {
        // Empty string is the emitter's "no host dimension" signal.
        tags.insert("host".to_string(), String::new());
    }
    tags
}

fn job_tags(config: &CollectorConfig, job: &str) -> BTreeMap<String, String> {
    let mut tags = base_tags(config);
    tags.insert("job".to_string(), job.to_string());
    tags
}
