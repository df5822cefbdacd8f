//! System health checks
//!
//! Preflight checks used by the `doctor` command and before starting the
//! watch loop.

use crate::Config;
use std::path::Path;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Watch folder status
    pub watch_folder: CheckResult,
    /// CAM destination status
    pub cam_target: CheckResult,
    /// Print destination status
    pub print_target: CheckResult,
    /// State directory status (auto-send log, archive gate)
    pub state_dir: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

#[allow(dead_code)]
impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: true,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            watch_folder: Self::check_watch_folder(config),
            cam_target: Self::check_cam_target(config),
            print_target: Self::check_print_target(config),
            state_dir: Self::check_state_dir(),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.watch_folder.passed
            && self.cam_target.passed
            && self.print_target.passed
            && self.state_dir.passed
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        [
            &self.watch_folder,
            &self.cam_target,
            &self.print_target,
            &self.state_dir,
        ]
        .into_iter()
        .filter(|r| r.is_warning)
        .collect()
    }

    /// All checks with display names, in report order
    pub fn all_checks(&self) -> Vec<(&'static str, &CheckResult)> {
        vec![
            ("Watch folder", &self.watch_folder),
            ("Target (CAM)", &self.cam_target),
            ("Target (Print)", &self.print_target),
            ("State directory", &self.state_dir),
        ]
    }

    fn check_watch_folder(config: &Config) -> CheckResult {
        if config.watch_folder.is_empty() {
            return CheckResult::error_with_details(
                "Watch folder is not configured",
                "Set watch_folder in the configuration file",
            );
        }
        if !Path::new(&config.watch_folder).is_dir() {
            return CheckResult::error(format!(
                "Watch folder does not exist: {}",
                config.watch_folder
            ));
        }
        CheckResult::ok(format!("Watch folder: {}", config.watch_folder))
    }

    fn check_cam_target(config: &Config) -> CheckResult {
        match config.cam_target() {
            None => CheckResult::error_with_details(
                "Target (CAM) folder is not configured",
                "Set targets.cam in the configuration file",
            ),
            Some(target) if !Path::new(target).is_dir() => CheckResult::warning(format!(
                "Target (CAM) folder will be created on first send: {}",
                target
            )),
            Some(target) => CheckResult::ok(format!("Target (CAM): {}", target)),
        }
    }

    fn check_print_target(config: &Config) -> CheckResult {
        match config.print_target() {
            None if config.auto_send.enabled => CheckResult::error_with_details(
                "Target (Print) folder is not configured",
                "Auto-send is enabled and needs targets.print set",
            ),
            None => CheckResult::warning_with_details(
                "Target (Print) folder is not configured",
                "'Send to Print' is unavailable until targets.print is set",
            ),
            Some(target) if !Path::new(target).is_dir() => CheckResult::warning(format!(
                "Target (Print) folder will be created on first send: {}",
                target
            )),
            Some(target) => CheckResult::ok(format!("Target (Print): {}", target)),
        }
    }

    fn check_state_dir() -> CheckResult {
        let state_dir = match Config::state_dir() {
            Ok(dir) => dir,
            Err(e) => return CheckResult::error(format!("No state directory available: {}", e)),
        };

        match std::fs::create_dir_all(&state_dir) {
            Ok(()) => CheckResult::ok(format!("State directory: {}", state_dir.display())),
            Err(e) => CheckResult::error_with_details(
                format!("State directory is not writable: {}", state_dir.display()),
                e.to_string(),
            ),
        }
    }
}
