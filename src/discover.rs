//! Plan and database discovery.
//!
//! Walks the CloudBerry data directory looking for two things: `.cbb`
//! plan documents (XML) and the `cbbackup.db` SQLite history log.
//! Everything else is ignored. A malformed plan document is reported and
//! skipped; it never aborts the walk.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// History log filename, matched case-insensitively.
const DATABASE_FILENAME: &str = "cbbackup.db";
/// Plan document extension, matched case-insensitively.
const PLAN_EXTENSION: &str = ".cbb";
/// Plans whose display name starts with this prefix are consistency
/// checks. A naming convention of CloudBerry itself, not configurable.
const CONSISTENCY_PREFIX: &str = "Consistency";

/// Identity of one configured plan, from its `.cbb` document.
///
/// The documents carry a large schedule/retention/encryption schema; only
/// the identity fields are consumed here. Missing elements deserialize to
/// empty strings, matching how the source system treats them.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupPlan {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Backup,
    ConsistencyCheck,
}

impl BackupPlan {
    pub fn kind(&self) -> PlanKind {
        if self.name.starts_with(CONSISTENCY_PREFIX) {
            PlanKind::ConsistencyCheck
        } else {
            PlanKind::Backup
        }
    }
}

/// Result of one walk over the data directory.
///
/// Duplicate plan ids are not de-duplicated here: a duplicate contradicts
/// the source system, and the last document the walk visits wins.
#[derive(Debug, Default)]
pub struct Discovery {
    pub backups: Vec<BackupPlan>,
    pub consistency_checks: Vec<BackupPlan>,
    pub database: Option<PathBuf>,
}

/// Errors from reading a single plan document.
#[derive(Debug)]
pub enum PlanError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: quick_xml::DeError,
    },
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::Read { path, source } => {
                write!(f, "failed to read plan file {}: {source}", path.display())
            }
            PlanError::Parse { path, source } => {
                write!(f, "failed to parse plan file {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::Read { source, .. } => Some(source),
            PlanError::Parse { source, .. } => Some(source),
        }
    }
}

/// Parse one `.cbb` document into a plan identity.
pub fn parse_plan(path: &Path) -> Result<BackupPlan, PlanError> {
    let text = std::fs::read_to_string(path).map_err(|e| PlanError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    quick_xml::de::from_str(&text).map_err(|e| PlanError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Walk the data directory and collect plan identities plus the history
/// log location. Unreadable entries and malformed documents are logged
/// and skipped; whether anything usable was found is for the caller to
/// judge.
pub fn discover(dir: &Path) -> Discovery {
    let mut found = Discovery::default();
    walk(dir, &mut found);
    found
}

fn walk(dir: &Path, found: &mut Discovery) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, dir = %dir.display(), "failed to read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, found);
            continue;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => continue,
        };

        if filename == DATABASE_FILENAME {
            found.database = Some(path);
        } else if filename.ends_with(PLAN_EXTENSION) {
            match parse_plan(&path) {
                Ok(plan) => {
                    tracing::debug!(
                        id = %plan.id,
                        name = %plan.name,
                        kind = ?plan.kind(),
                        "discovered plan"
                    );
                    match plan.kind() {
                        PlanKind::Backup => found.backups.push(plan),
                        PlanKind::ConsistencyCheck => found.consistency_checks.push(plan),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed plan document"),
            }
        }
    }
}
