//! Watch loop
//!
//! Wires a filesystem change source to the trigger coordinator: one watcher
//! task emits paths, one serializer applies them in order. A global
//! operation-in-progress flag drops triggers that arrive while a scan or
//! send is running; they are not queued, the next quiet change re-evaluates
//! the folder from scratch.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::duplicate::DuplicatePrompt;
use crate::status::AutoSendLog;
use crate::sync::SyncEngine;
use crate::trigger::{TriggerCoordinator, TriggerEvents};

/// Grace period before re-scanning a changed folder, so the CAD application
/// can finish writing its burst of files
const SETTLE_DELAY: Duration = Duration::from_millis(750);

/// Capability seam over filesystem change notifications. Hosts without a
/// usable watcher plug in [`DisabledChangeSource`] and the rest of the core
/// keeps working through manual scans.
pub trait ChangeSource {
    /// Begin delivering changed paths under `root` into `sink`
    fn start(&mut self, root: &Path, sink: ChangeSink) -> Result<()>;

    /// Source name for logs
    fn name(&self) -> &'static str;
}

/// Hands changed paths from the watcher thread to the serializer. Drops
/// events while an operation is in flight instead of queueing them.
#[derive(Clone)]
pub struct ChangeSink {
    tx: mpsc::Sender<PathBuf>,
    busy: Arc<AtomicBool>,
}

impl ChangeSink {
    pub fn push(&self, path: PathBuf) {
        if self.busy.load(Ordering::SeqCst) {
            debug!("Dropping change during active operation: {}", path.display());
            return;
        }
        if self.tx.try_send(path).is_err() {
            debug!("Change channel full, dropping event");
        }
    }
}

/// Real change source backed by the notify crate
pub struct NotifyChangeSource {
    watcher: Option<RecommendedWatcher>,
}

impl NotifyChangeSource {
    pub fn new() -> Self {
        Self { watcher: None }
    }
}

impl Default for NotifyChangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSource for NotifyChangeSource {
    fn start(&mut self, root: &Path, sink: ChangeSink) -> Result<()> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            sink.push(path);
                        }
                    }
                }
                Err(e) => warn!("Filesystem watch error: {}", e),
            }
        })
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        self.watcher = Some(watcher);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "notify"
    }
}

/// Disabled variant: never delivers anything
pub struct DisabledChangeSource;

impl ChangeSource for DisabledChangeSource {
    fn start(&mut self, _root: &Path, _sink: ChangeSink) -> Result<()> {
        warn!("Real-time watching disabled; only manual scans will see changes");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// The foreground watch daemon: owns the coordinator and serializes every
/// trigger through a single loop
pub struct Daemon {
    config: Config,
    coordinator: TriggerCoordinator,
    busy: Arc<AtomicBool>,
}

impl Daemon {
    /// Build a daemon using the default state directory
    pub fn new(
        config: Config,
        prompt: Box<dyn DuplicatePrompt>,
        events: Box<dyn TriggerEvents>,
    ) -> Result<Self> {
        let state_dir = Config::state_dir()?;
        Ok(Self::with_state_dir(config, prompt, events, &state_dir))
    }

    /// Build a daemon with an explicit state directory
    pub fn with_state_dir(
        config: Config,
        prompt: Box<dyn DuplicatePrompt>,
        events: Box<dyn TriggerEvents>,
        state_dir: &Path,
    ) -> Self {
        let engine = SyncEngine::new(&config, prompt, state_dir);
        let status = AutoSendLog::open(state_dir);
        let coordinator = TriggerCoordinator::new(config.clone(), engine, status, events);

        Self {
            config,
            coordinator,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Access the coordinator, e.g. to forward `notification_closed`
    pub fn coordinator_mut(&mut self) -> &mut TriggerCoordinator {
        &mut self.coordinator
    }

    /// Run the watch loop until ctrl-c
    pub async fn run(&mut self, source: &mut dyn ChangeSource) -> Result<()> {
        let root = PathBuf::from(&self.config.watch_folder);
        anyhow::ensure!(
            root.is_dir(),
            "Watch folder is missing or not a directory: {}",
            root.display()
        );

        let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
        let sink = ChangeSink {
            tx,
            busy: self.busy.clone(),
        };
        source.start(&root, sink)?;
        info!("Watching {} ({} source)", root.display(), source.name());

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping watch loop");
                    break;
                }
                maybe_path = rx.recv() => {
                    let Some(path) = maybe_path else {
                        break;
                    };
                    // Let the writing application settle before re-scanning
                    tokio::time::sleep(SETTLE_DELAY).await;

                    self.busy.store(true, Ordering::SeqCst);
                    self.coordinator.on_file_changed(&path);
                    self.busy.store(false, Ordering::SeqCst);
                }
            }
        }

        Ok(())
    }
}
