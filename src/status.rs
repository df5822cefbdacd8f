//! Auto-send status persistence
//!
//! Records which project folders were automatically sent to CAM or Print
//! today. Entries carry their calendar date; anything from a prior day is
//! treated as absent on load and pruned on the next save, so the once-per-day
//! gate resets itself at midnight without a cleanup job.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::scanner::normalize_path;
use crate::sync::SendCategory;

pub const AUTO_SEND_STATUS_FILE: &str = "autosend_status.json";

/// Per-folder, per-day send flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoSendEntry {
    pub cam_sent: bool,
    pub print_sent: bool,
    pub date: NaiveDate,
}

impl AutoSendEntry {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            cam_sent: false,
            print_sent: false,
            date,
        }
    }
}

/// The persisted auto-send log; single writer, loaded once at startup
pub struct AutoSendLog {
    path: PathBuf,
    entries: HashMap<String, AutoSendEntry>,
}

impl AutoSendLog {
    /// Load today's entries from the state directory
    pub fn open(state_dir: &Path) -> Self {
        Self::open_on(state_dir, Local::now().date_naive())
    }

    /// Load entries valid on an explicit calendar day
    pub fn open_on(state_dir: &Path, today: NaiveDate) -> Self {
        let path = state_dir.join(AUTO_SEND_STATUS_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, AutoSendEntry>>(&content) {
                Ok(loaded) => {
                    let todays: HashMap<String, AutoSendEntry> = loaded
                        .into_iter()
                        .filter(|(_, entry)| entry.date == today)
                        .collect();
                    debug!("Loaded auto-send status for {} project(s) today", todays.len());
                    todays
                }
                Err(e) => {
                    warn!(
                        "Corrupt auto-send status file {}: {}. Resetting.",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self { path, entries }
    }

    /// Has this folder already been auto-sent for the category today?
    pub fn has_been_sent(&self, folder: &Path, category: SendCategory, today: NaiveDate) -> bool {
        let key = Self::key(folder);
        match self.entries.get(&key) {
            Some(entry) if entry.date == today => match category {
                SendCategory::Cam => entry.cam_sent,
                SendCategory::Print => entry.print_sent,
            },
            _ => false,
        }
    }

    /// Mark a folder as auto-sent for the category and persist immediately
    pub fn mark_sent(&mut self, folder: &Path, category: SendCategory, today: NaiveDate) {
        let key = Self::key(folder);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| AutoSendEntry::fresh(today));
        if entry.date != today {
            *entry = AutoSendEntry::fresh(today);
        }

        match category {
            SendCategory::Cam => entry.cam_sent = true,
            SendCategory::Print => entry.print_sent = true,
        }

        if let Err(e) = self.save(today) {
            warn!("Failed to persist auto-send status: {}", e);
        }
    }

    /// Today's entries, for display
    pub fn entries_on(&self, today: NaiveDate) -> Vec<(&str, &AutoSendEntry)> {
        let mut entries: Vec<(&str, &AutoSendEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.date == today)
            .map(|(key, entry)| (key.as_str(), entry))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    fn key(folder: &Path) -> String {
        normalize_path(folder).to_string_lossy().into_owned()
    }

    fn save(&self, today: NaiveDate) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Stale entries are dropped here rather than on load, so the file
        // shrinks on the first save of each day
        let todays: HashMap<&String, &AutoSendEntry> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.date == today)
            .collect();
        let content = serde_json::to_string_pretty(&todays)?;
        std::fs::write(&self.path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_mark_and_query() {
        let state = TempDir::new().unwrap();
        let today = day("2024-03-15");
        let folder = Path::new("/lab/case1");

        let mut log = AutoSendLog::open_on(state.path(), today);
        assert!(!log.has_been_sent(folder, SendCategory::Cam, today));

        log.mark_sent(folder, SendCategory::Cam, today);
        assert!(log.has_been_sent(folder, SendCategory::Cam, today));
        assert!(!log.has_been_sent(folder, SendCategory::Print, today));
    }

    #[test]
    fn test_status_survives_reload() {
        let state = TempDir::new().unwrap();
        let today = day("2024-03-15");
        let folder = Path::new("/lab/case1");

        let mut log = AutoSendLog::open_on(state.path(), today);
        log.mark_sent(folder, SendCategory::Print, today);

        let reloaded = AutoSendLog::open_on(state.path(), today);
        assert!(reloaded.has_been_sent(folder, SendCategory::Print, today));
        assert!(!reloaded.has_been_sent(folder, SendCategory::Cam, today));
    }

    #[test]
    fn test_yesterdays_entries_expire() {
        let state = TempDir::new().unwrap();
        let yesterday = day("2024-03-14");
        let today = day("2024-03-15");
        let folder = Path::new("/lab/case1");

        let mut log = AutoSendLog::open_on(state.path(), yesterday);
        log.mark_sent(folder, SendCategory::Cam, yesterday);

        // Next morning the same file reads as never-sent
        let log = AutoSendLog::open_on(state.path(), today);
        assert!(!log.has_been_sent(folder, SendCategory::Cam, today));
    }

    #[test]
    fn test_marking_resets_stale_entry() {
        let state = TempDir::new().unwrap();
        let yesterday = day("2024-03-14");
        let today = day("2024-03-15");
        let folder = Path::new("/lab/case1");

        let mut log = AutoSendLog::open_on(state.path(), yesterday);
        log.mark_sent(folder, SendCategory::Cam, yesterday);
        log.mark_sent(folder, SendCategory::Print, today);

        // The cam flag belonged to yesterday and must not carry over
        assert!(!log.has_been_sent(folder, SendCategory::Cam, today));
        assert!(log.has_been_sent(folder, SendCategory::Print, today));
    }

    #[test]
    fn test_corrupt_file_resets() {
        let state = TempDir::new().unwrap();
        std::fs::write(state.path().join(AUTO_SEND_STATUS_FILE), "{not json").unwrap();

        let log = AutoSendLog::open_on(state.path(), day("2024-03-15"));
        assert!(log.entries_on(day("2024-03-15")).is_empty());
    }

    #[test]
    fn test_paths_are_normalized() {
        let state = TempDir::new().unwrap();
        let today = day("2024-03-15");

        let mut log = AutoSendLog::open_on(state.path(), today);
        log.mark_sent(Path::new("/lab/./case1"), SendCategory::Cam, today);
        assert!(log.has_been_sent(Path::new("/lab/case1"), SendCategory::Cam, today));
    }

    #[test]
    fn test_json_uses_camel_case_keys() {
        let state = TempDir::new().unwrap();
        let today = day("2024-03-15");

        let mut log = AutoSendLog::open_on(state.path(), today);
        log.mark_sent(Path::new("/lab/case1"), SendCategory::Cam, today);

        let content =
            std::fs::read_to_string(state.path().join(AUTO_SEND_STATUS_FILE)).unwrap();
        assert!(content.contains("\"camSent\": true"));
        assert!(content.contains("\"printSent\": false"));
        assert!(content.contains("\"date\": \"2024-03-15\""));
    }
}
