//! Destination folder archiving
//!
//! Moves files that predate today from a destination folder root into
//! date-partitioned YYYY/MM/DD subfolders, at most once per calendar day per
//! destination. The once-per-day gate is persisted so restarts do not rerun
//! a pass that already completed; a pass with errors leaves the gate open so
//! the next send retries the remaining files.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const GATE_FILE: &str = "archive_gate.json";

/// Result of one archive pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub moved: usize,
    pub errors: usize,
}

impl ArchiveOutcome {
    pub fn is_empty(&self) -> bool {
        self.moved == 0 && self.errors == 0
    }
}

/// Persisted once-per-day archive gate, one date per destination tag
/// ("cam", "print")
pub struct ArchiveGate {
    path: PathBuf,
    dates: HashMap<String, NaiveDate>,
}

impl ArchiveGate {
    /// Load the gate from the state directory; a missing or corrupt gate
    /// file simply means every destination is due
    pub fn open(state_dir: &Path) -> Self {
        let path = state_dir.join(GATE_FILE);
        let dates = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(dates) => dates,
                Err(e) => {
                    warn!("Corrupt archive gate file {}: {}. Resetting.", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self { path, dates }
    }

    pub fn last_archive_date(&self, tag: &str) -> Option<NaiveDate> {
        self.dates.get(tag).copied()
    }

    /// Record a completed pass and persist immediately
    pub fn mark_archived(&mut self, tag: &str, date: NaiveDate) {
        self.dates.insert(tag.to_string(), date);
        if let Err(e) = self.save() {
            warn!("Failed to persist archive gate: {:#}", e);
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let content =
            serde_json::to_string_pretty(&self.dates).context("Failed to serialize archive gate")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write archive gate: {}", self.path.display()))?;
        Ok(())
    }
}

/// Archiving engine gated to one pass per day per destination
pub struct ArchiveEngine {
    enabled: bool,
    gate: ArchiveGate,
}

impl ArchiveEngine {
    pub fn new(enabled: bool, gate: ArchiveGate) -> Self {
        Self { enabled, gate }
    }

    /// Archive stale files in `target` unless a pass already completed
    /// today for this tag
    pub fn archive_if_due(&mut self, target: &Path, tag: &str) -> ArchiveOutcome {
        self.archive_if_due_on(target, tag, Local::now().date_naive())
    }

    /// Same, against an explicit calendar day
    pub fn archive_if_due_on(&mut self, target: &Path, tag: &str, today: NaiveDate) -> ArchiveOutcome {
        if !self.enabled {
            return ArchiveOutcome::default();
        }
        if !target.is_dir() {
            debug!("Archiving skipped for '{}': target missing", tag);
            return ArchiveOutcome::default();
        }
        if self.gate.last_archive_date(tag) == Some(today) {
            return ArchiveOutcome::default();
        }

        let outcome = archive_old_files(target, today);
        if !outcome.is_empty() {
            info!(
                "Archive pass for '{}': moved {} file(s), {} error(s)",
                tag, outcome.moved, outcome.errors
            );
        }

        // Only a clean pass closes the gate; errors keep it open so the
        // next invocation retries the files left behind
        if outcome.errors == 0 {
            self.gate.mark_archived(tag, today);
        } else {
            warn!(
                "Archive errors in '{}' target, leaving the daily gate open",
                tag
            );
        }

        outcome
    }
}

/// Move every direct file of `target` modified before `today` into a
/// YYYY/MM/DD subfolder matching its own modification date
fn archive_old_files(target: &Path, today: NaiveDate) -> ArchiveOutcome {
    let mut outcome = ArchiveOutcome::default();

    let entries = match std::fs::read_dir(target) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {} for archiving: {}", target.display(), e);
            outcome.errors += 1;
            return outcome;
        }
    };

    let mut to_archive: Vec<(PathBuf, NaiveDate)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Failed to stat {} for archiving: {}", path.display(), e);
                outcome.errors += 1;
                continue;
            }
        };
        let mod_date = DateTime::<Local>::from(mtime).date_naive();
        if mod_date < today {
            to_archive.push((path, mod_date));
        }
    }

    for (source, mod_date) in to_archive {
        let day_dir = target
            .join(mod_date.format("%Y").to_string())
            .join(mod_date.format("%m").to_string())
            .join(mod_date.format("%d").to_string());
        let file_name = match source.file_name() {
            Some(name) => name.to_os_string(),
            None => continue,
        };
        let destination = day_dir.join(&file_name);

        if let Err(e) = std::fs::create_dir_all(&day_dir) {
            warn!("Failed to create archive folder {}: {}", day_dir.display(), e);
            outcome.errors += 1;
            continue;
        }

        match std::fs::rename(&source, &destination) {
            Ok(()) => {
                debug!(
                    "Archived '{}' -> {}",
                    file_name.to_string_lossy(),
                    day_dir.display()
                );
                outcome.moved += 1;
            }
            // Source vanished between listing and move: already handled
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    "Failed to archive '{}': {}",
                    file_name.to_string_lossy(),
                    e
                );
                outcome.errors += 1;
            }
        }
    }

    outcome
}
