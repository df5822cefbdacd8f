//! Change-trigger coordination
//!
//! Receives raw file-change notifications from the watch collaborator and
//! decides what each one means: nothing, an automatic send, a live
//! notification for the operator, or both. Keeps the per-path debounce, the
//! per-folder notification cooldown, and the at-most-one-open-notification
//! gate as explicit state with documented reset points.

use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::archive::ArchiveOutcome;
use crate::config::Config;
use crate::scanner::{classify_file_name, normalize_path, DirectoryScanner, FileClass, ProjectRecord, StlClass};
use crate::status::AutoSendLog;
use crate::sync::{SendCategory, SendReport, SyncEngine};

/// OS-level events for the same path within this window collapse into one
const PATH_DEBOUNCE: Duration = Duration::from_secs(1);

/// Events the coordinator surfaces to its host.
///
/// Default implementations are no-ops so a headless host can ignore what it
/// does not present.
pub trait TriggerEvents {
    /// A project is ready to show a live notification for
    fn notification_ready(&self, _record: &ProjectRecord) {}

    /// An automatic send finished successfully
    fn auto_send_completed(
        &self,
        _record: &ProjectRecord,
        _category: SendCategory,
        _report: &SendReport,
    ) {
    }

    /// An archive pass ran as part of a send
    fn archive_completed(&self, _category: SendCategory, _outcome: &ArchiveOutcome) {}
}

/// Sink for hosts without any presentation layer
pub struct NullEvents;

impl TriggerEvents for NullEvents {}

/// Coordinates change triggers for one watch root
pub struct TriggerCoordinator {
    config: Config,
    watch_root: PathBuf,
    scanner: DirectoryScanner,
    engine: SyncEngine,
    status: AutoSendLog,
    events: Box<dyn TriggerEvents>,
    /// Last accepted event per file path (debounce)
    last_event: HashMap<PathBuf, Instant>,
    /// Last notification per project folder (cooldown)
    last_notified: HashMap<PathBuf, Instant>,
    /// At most one live notification is outstanding at a time
    notification_open: bool,
}

impl TriggerCoordinator {
    pub fn new(
        config: Config,
        engine: SyncEngine,
        status: AutoSendLog,
        events: Box<dyn TriggerEvents>,
    ) -> Self {
        let watch_root = normalize_path(Path::new(&config.watch_folder));
        let scanner = DirectoryScanner::new(config.scan.max_depth);

        Self {
            config,
            watch_root,
            scanner,
            engine,
            status,
            events,
            last_event: HashMap::new(),
            last_notified: HashMap::new(),
            notification_open: false,
        }
    }

    /// True when a changed path is worth reacting to: an info document or a
    /// classified mesh, somewhere under the watch root
    pub fn is_relevant_change(&self, path: &Path) -> bool {
        if !normalize_path(path).starts_with(&self.watch_root) {
            return false;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        matches!(
            classify_file_name(name),
            Some(FileClass::Info) | Some(FileClass::Stl(StlClass::Cad)) | Some(FileClass::Stl(StlClass::Model))
        )
    }

    /// Handle one file-change notification from the watch collaborator
    pub fn on_file_changed(&mut self, path: &Path) {
        if !self.is_relevant_change(path) {
            return;
        }

        let now = Instant::now();
        let normalized = normalize_path(path);
        if let Some(last) = self.last_event.get(&normalized) {
            if now.duration_since(*last) < PATH_DEBOUNCE {
                return;
            }
        }
        self.last_event.insert(normalized, now);

        let Some(folder) = path.parent().map(normalize_path) else {
            return;
        };
        debug!("Change accepted: {}", path.display());

        if !self.config.notify.live_enabled && !self.config.auto_send.enabled {
            return;
        }

        // The cooldown is sampled now but the timestamp is only advanced
        // when a notification actually goes out
        let cooldown = Duration::from_secs(self.config.effective_cooldown_secs());
        let cooldown_passed = self
            .last_notified
            .get(&folder)
            .map_or(true, |last| now.duration_since(*last) >= cooldown);

        let Some(record) = self.scanner.scan_folder(&folder) else {
            debug!("Trigger folder vanished before re-scan: {}", folder.display());
            return;
        };

        let mut action_taken = false;
        for category in [SendCategory::Cam, SendCategory::Print] {
            if self.try_auto_send(&record, &folder, category) {
                action_taken = true;
            }
        }

        if self.config.notify.live_enabled && cooldown_passed && !action_taken {
            if self.notification_open {
                debug!(
                    "Notification suppressed for {}: another one is open",
                    record.display_name()
                );
            } else {
                self.last_notified.insert(folder, now);
                self.notification_open = true;
                info!("Notification ready for {}", record.display_name());
                self.events.notification_ready(&record);
            }
        }
    }

    /// The host closed the live notification; the next trigger may open
    /// another one
    pub fn notification_closed(&mut self) {
        self.notification_open = false;
    }

    /// Run one category's automatic send if it is eligible right now.
    /// Returns true when files were actually sent.
    fn try_auto_send(&mut self, record: &ProjectRecord, folder: &Path, category: SendCategory) -> bool {
        if !self.config.auto_send.enabled {
            return false;
        }

        let ready = match category {
            SendCategory::Cam => record.has_cad() && record.has_info(),
            SendCategory::Print => record.has_models(),
        };
        let target_configured = match category {
            SendCategory::Cam => self.config.cam_target().is_some(),
            SendCategory::Print => self.config.print_target().is_some(),
        };
        let today = Local::now().date_naive();
        let already_sent = self.status.has_been_sent(folder, category, today);

        if !ready || !target_configured || already_sent {
            debug!(
                "Auto-send {} not eligible for {}: ready={}, target={}, sent_today={}",
                category.label(),
                record.display_name(),
                ready,
                target_configured,
                already_sent
            );
            return false;
        }

        info!(
            "Auto-sending {} for {}",
            category.label(),
            record.display_name()
        );
        match self.engine.send_category(record, category, true) {
            Ok(report) if report.success() => {
                // Mark sent before anything else so a crash cannot resend
                self.status.mark_sent(folder, category, today);
                if !report.archive.is_empty() {
                    self.events.archive_completed(category, &report.archive);
                }
                self.events.auto_send_completed(record, category, &report);
                true
            }
            Ok(report) => {
                // Eligibility is re-evaluated fresh on the next trigger
                warn!(
                    "Auto-send {} did not complete for {}: {:?}",
                    category.label(),
                    record.display_name(),
                    report.disposition
                );
                false
            }
            Err(e) => {
                warn!(
                    "Auto-send {} failed for {}: {:#}",
                    category.label(),
                    record.display_name(),
                    e
                );
                false
            }
        }
    }
}
