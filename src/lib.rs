//! labsentry - Dental Lab Case Folder Watcher
//!
//! labsentry discovers work-in-progress dental case folders under a watch
//! root, classifies their contents, and synchronizes qualifying files to CAM
//! machining and 3D printing destinations under duplicate-resolution,
//! once-per-day archiving, and once-per-day auto-send rules.
//!
//! ## Core Features
//!
//! - **Directory Scanning**: today-filtered full-tree scans and targeted
//!   single-folder re-scans, with archive-path and depth pruning
//! - **Case Metadata**: XML case-document parsing with full-arch detection
//! - **File Synchronization**: CAM/Print bundle sends with duplicate
//!   resolution and per-operation statistics
//! - **Archiving**: date-partitioned destination archiving, gated to once
//!   per calendar day
//! - **Change Triggers**: debounced filesystem triggers driving notifications
//!   and once-per-day automatic sends
//!
//! ## Modules
//!
//! - [`scanner`]: directory walking and project classification
//! - [`metadata`]: case document parsing
//! - [`sync`]: send orchestration
//! - [`trigger`]: change-trigger coordination

pub mod archive;
pub mod config;
pub mod daemon;
pub mod duplicate;
pub mod health;
pub mod metadata;
pub mod scanner;
pub mod status;
pub mod sync;
pub mod trigger;

pub use config::Config;
pub use daemon::{ChangeSource, Daemon, DisabledChangeSource, NotifyChangeSource};
pub use health::HealthCheck;
pub use metadata::CaseSummary;
pub use scanner::{DirectoryScanner, ProjectRecord};
pub use status::AutoSendLog;
pub use sync::{BatchReport, SendCategory, SendReport, SyncEngine};
pub use trigger::{NullEvents, TriggerCoordinator, TriggerEvents};
