//! Send orchestration
//!
//! Copies a project's qualifying file bundle to the CAM or Print destination:
//! archive the destination first (once per day), resolve duplicates through
//! the configured policies, then copy with timestamps preserved. Single
//! project sends fail fast on the first copy error; batch sends carry on with
//! the next project.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveEngine, ArchiveGate, ArchiveOutcome};
use crate::config::Config;
use crate::duplicate::{DuplicateDecision, DuplicatePrompt, DuplicateResolver};
use crate::scanner::ProjectRecord;

/// File bundle category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendCategory {
    /// Info document plus all *cad.stl meshes, for CAM machining
    Cam,
    /// All *model*.stl meshes, for 3D printing
    Print,
}

impl SendCategory {
    /// Stable key used by the archive gate and the auto-send log
    pub fn tag(&self) -> &'static str {
        match self {
            SendCategory::Cam => "cam",
            SendCategory::Print => "print",
        }
    }

    /// Human-facing label
    pub fn label(&self) -> &'static str {
        match self {
            SendCategory::Cam => "CAM",
            SendCategory::Print => "Print",
        }
    }
}

/// Per-file copy failure
#[derive(Debug, Clone)]
pub struct CopyError {
    pub file: String,
    pub error: String,
}

/// Per-project copy statistics
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    pub project_name: String,
    pub copied: usize,
    pub skipped: usize,
    pub errors: Vec<CopyError>,
    pub cancelled: bool,
}

impl CopyStats {
    fn for_project(record: &ProjectRecord) -> Self {
        Self {
            project_name: record.display_name(),
            ..Self::default()
        }
    }
}

/// How a single-project send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendDisposition {
    /// Every file copied or deliberately skipped
    Completed,
    /// Required files absent; nothing was attempted
    MissingPrerequisites(String),
    /// Operator cancelled at a duplicate prompt
    Cancelled,
    /// A copy error aborted the remaining files
    Failed,
}

/// Outcome of a single-project send
#[derive(Debug, Clone)]
pub struct SendReport {
    pub disposition: SendDisposition,
    pub stats: CopyStats,
    pub archive: ArchiveOutcome,
}

impl SendReport {
    pub fn success(&self) -> bool {
        self.disposition == SendDisposition::Completed
    }
}

/// A project a batch send skipped before copying anything
#[derive(Debug, Clone)]
pub struct SkippedProject {
    pub name: String,
    pub reason: String,
}

/// Outcome of a multi-project batch send
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub per_project: Vec<CopyStats>,
    pub skipped: Vec<SkippedProject>,
    pub archive: ArchiveOutcome,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn total_copied(&self) -> usize {
        self.per_project.iter().map(|s| s.copied).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.per_project.iter().map(|s| s.skipped).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.per_project.iter().map(|s| s.errors.len()).sum()
    }
}

/// The send engine. One long-lived instance per host; owns the archive gate
/// and the duplicate resolver so sticky state has a single home.
pub struct SyncEngine {
    cam_target: Option<PathBuf>,
    print_target: Option<PathBuf>,
    archive: ArchiveEngine,
    resolver: DuplicateResolver,
}

impl SyncEngine {
    /// Build an engine from configuration, persisting the archive gate in
    /// the given state directory
    pub fn new(config: &Config, prompt: Box<dyn DuplicatePrompt>, state_dir: &Path) -> Self {
        let archive = ArchiveEngine::new(config.archive.enabled, ArchiveGate::open(state_dir));
        let resolver = DuplicateResolver::new(
            config.duplicates.manual,
            config.duplicates.automatic,
            prompt,
        );

        Self {
            cam_target: config.cam_target().map(PathBuf::from),
            print_target: config.print_target().map(PathBuf::from),
            archive,
            resolver,
        }
    }

    /// Build an engine using the default state directory
    pub fn from_config(config: &Config, prompt: Box<dyn DuplicatePrompt>) -> Result<Self> {
        let state_dir = Config::state_dir()?;
        Ok(Self::new(config, prompt, &state_dir))
    }

    /// Send one project's bundle for one category.
    ///
    /// Fails eagerly (before any filesystem work) when the destination is
    /// not configured or cannot be created; every other problem is reported
    /// through the returned [`SendReport`].
    pub fn send_category(
        &mut self,
        record: &ProjectRecord,
        category: SendCategory,
        is_auto: bool,
    ) -> Result<SendReport> {
        self.send_category_on(record, category, is_auto, Local::now().date_naive())
    }

    /// Same, against an explicit calendar day
    pub fn send_category_on(
        &mut self,
        record: &ProjectRecord,
        category: SendCategory,
        is_auto: bool,
        today: NaiveDate,
    ) -> Result<SendReport> {
        let destination = self.destination(category)?;
        let mut stats = CopyStats::for_project(record);

        let files = match bundle_files(record, category) {
            Ok(files) => files,
            Err(reason) => {
                debug!(
                    "Send {} skipped for {}: {}",
                    category.label(),
                    stats.project_name,
                    reason
                );
                return Ok(SendReport {
                    disposition: SendDisposition::MissingPrerequisites(reason),
                    stats,
                    archive: ArchiveOutcome::default(),
                });
            }
        };

        let archive = self.archive.archive_if_due_on(&destination, category.tag(), today);

        self.resolver.reset();
        info!(
            "Sending {} bundle for {} ({} file(s), auto={})",
            category.label(),
            stats.project_name,
            files.len(),
            is_auto
        );

        for source in &files {
            if !self.copy_file(source, &destination, &mut stats, is_auto, false) {
                break;
            }
        }

        let disposition = if stats.cancelled {
            SendDisposition::Cancelled
        } else if !stats.errors.is_empty() {
            SendDisposition::Failed
        } else {
            SendDisposition::Completed
        };

        Ok(SendReport {
            disposition,
            stats,
            archive,
        })
    }

    /// Send several projects' bundles for one category. Archiving runs once
    /// for the whole batch and the sticky duplicate choice spans it; a
    /// cancel stops the remaining projects but keeps completed results.
    pub fn send_category_batch(
        &mut self,
        records: &[ProjectRecord],
        category: SendCategory,
    ) -> Result<BatchReport> {
        self.send_category_batch_on(records, category, Local::now().date_naive())
    }

    /// Same, against an explicit calendar day
    pub fn send_category_batch_on(
        &mut self,
        records: &[ProjectRecord],
        category: SendCategory,
        today: NaiveDate,
    ) -> Result<BatchReport> {
        let destination = self.destination(category)?;

        let mut report = BatchReport {
            archive: self.archive.archive_if_due_on(&destination, category.tag(), today),
            ..BatchReport::default()
        };

        self.resolver.reset();
        info!(
            "Batch send {} for {} project(s)",
            category.label(),
            records.len()
        );

        for record in records {
            let mut stats = CopyStats::for_project(record);

            let files = match bundle_files(record, category) {
                Ok(files) => files,
                Err(reason) => {
                    debug!("Skipping {}: {}", stats.project_name, reason);
                    report.skipped.push(SkippedProject {
                        name: stats.project_name,
                        reason,
                    });
                    continue;
                }
            };

            for source in &files {
                if !self.copy_file(source, &destination, &mut stats, false, true) {
                    break;
                }
            }

            let cancelled = stats.cancelled;
            report.per_project.push(stats);
            if cancelled {
                warn!("Batch send cancelled by operator; remaining projects untouched");
                report.cancelled = true;
                break;
            }
        }

        Ok(report)
    }

    /// Resolve and validate the destination folder for a category
    fn destination(&self, category: SendCategory) -> Result<PathBuf> {
        let destination = match category {
            SendCategory::Cam => self.cam_target.as_ref(),
            SendCategory::Print => self.print_target.as_ref(),
        }
        .ok_or_else(|| anyhow!("Target ({}) folder is not configured", category.label()))?;

        std::fs::create_dir_all(destination).with_context(|| {
            format!(
                "Failed to create target ({}) folder: {}",
                category.label(),
                destination.display()
            )
        })?;

        Ok(destination.clone())
    }

    /// Copy one file, resolving duplicates first. Returns false when the
    /// remaining files of this project must not be attempted.
    fn copy_file(
        &mut self,
        source: &Path,
        destination: &Path,
        stats: &mut CopyStats,
        is_auto: bool,
        is_batch: bool,
    ) -> bool {
        let file_name = match source.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return false,
        };

        if !source.exists() {
            stats.errors.push(CopyError {
                file: file_name.clone(),
                error: "Source file not found".to_string(),
            });
            warn!("Copy error: source file gone: {}", source.display());
            return false;
        }

        let final_path = destination.join(&file_name);
        if final_path.exists() {
            match self
                .resolver
                .resolve(&file_name, destination, is_auto, is_batch)
            {
                DuplicateDecision::Skip => {
                    debug!("Skipping duplicate file: {}", file_name);
                    stats.skipped += 1;
                    return true;
                }
                DuplicateDecision::Cancel => {
                    info!("Operator cancelled at duplicate: {}", file_name);
                    stats.cancelled = true;
                    return false;
                }
                DuplicateDecision::Overwrite => {}
            }
        }

        match copy_preserving_mtime(source, &final_path) {
            Ok(()) => {
                stats.copied += 1;
                true
            }
            Err(e) => {
                warn!("Failed copying '{}': {:#}", file_name, e);
                stats.errors.push(CopyError {
                    file: file_name,
                    error: format!("{:#}", e),
                });
                false
            }
        }
    }
}

/// Ordered copy list for a category, restricted to files that still exist.
/// Err carries the human-readable missing-prerequisite reason.
fn bundle_files(record: &ProjectRecord, category: SendCategory) -> Result<Vec<PathBuf>, String> {
    match category {
        SendCategory::Cam => {
            let info = record
                .info_path
                .as_ref()
                .filter(|p| p.exists())
                .cloned();
            let cads: Vec<PathBuf> = record
                .cad_stl_paths
                .iter()
                .filter(|p| p.exists())
                .cloned()
                .collect();

            match (&info, cads.is_empty()) {
                (Some(info), false) => {
                    let mut files = vec![info.clone()];
                    files.extend(cads);
                    Ok(files)
                }
                (None, false) => Err("Missing .constructionInfo".to_string()),
                (Some(_), true) => Err("Missing *cad.stl".to_string()),
                (None, true) => Err("Missing .constructionInfo & *cad.stl".to_string()),
            }
        }
        SendCategory::Print => {
            let models: Vec<PathBuf> = record
                .model_stl_paths
                .iter()
                .filter(|p| p.exists())
                .cloned()
                .collect();
            if models.is_empty() {
                Err("No model files (*model*.stl) found".to_string())
            } else {
                Ok(models)
            }
        }
    }
}

/// Copy that keeps the source's modification time on the destination, so
/// today-filtering and archiving at the destination see the original dates
fn copy_preserving_mtime(source: &Path, destination: &Path) -> Result<()> {
    std::fs::copy(source, destination)
        .with_context(|| format!("copy to {}", destination.display()))?;

    let metadata = std::fs::metadata(source).context("stat source after copy")?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(destination, mtime).context("restore modification time")?;

    Ok(())
}
