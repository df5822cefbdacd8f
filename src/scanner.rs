//! Directory scanning and project classification
//!
//! Walks the watch folder, classifies case files by extension and name
//! pattern, and groups them into [`ProjectRecord`]s. Two modes: a full-tree
//! scan restricted to folders touched today, and a targeted single-folder
//! scan used by change triggers.

use chrono::{DateTime, Local, NaiveDate};
use path_clean::PathClean;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::metadata::{self, CaseSummary};

/// File classification by extension and name pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Case document (.dentalProject)
    Project,
    /// Construction info document (.constructionInfo)
    Info,
    /// Mesh file (.stl), subclassified by filename
    Stl(StlClass),
}

/// STL subclassification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlClass {
    /// Machining mesh (*cad.stl)
    Cad,
    /// Printable model mesh (*model*.stl)
    Model,
    /// Any other mesh
    Other,
}

/// One classified file inside a case folder
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    pub base_name: String,
    pub class: FileClass,
    pub mtime: SystemTime,
}

/// Aggregated view of one case folder, rebuilt on every scan
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub folder_path: PathBuf,
    pub base_name: String,
    pub project_path: Option<PathBuf>,
    pub info_path: Option<PathBuf>,
    pub cad_stl_paths: Vec<PathBuf>,
    pub model_stl_paths: Vec<PathBuf>,
    pub other_stl_paths: Vec<PathBuf>,
    pub last_modified: SystemTime,
    pub summary: CaseSummary,
}

impl ProjectRecord {
    pub fn has_cad(&self) -> bool {
        !self.cad_stl_paths.is_empty()
    }

    pub fn has_info(&self) -> bool {
        self.info_path.is_some()
    }

    pub fn has_models(&self) -> bool {
        !self.model_stl_paths.is_empty()
    }

    /// Compact per-category presence flags for table display
    pub fn file_status(&self) -> String {
        let mark = |ok: bool| if ok { '+' } else { '-' };
        format!(
            "{}C {}I {}P",
            mark(self.has_cad()),
            mark(self.has_info()),
            mark(self.has_models())
        )
    }

    /// Display name used in logs and summaries
    pub fn display_name(&self) -> String {
        format!("{} [{}]", self.summary.patient, self.base_name)
    }
}

/// Classify a file by name; `None` means the file is not case-relevant
pub fn classify_file_name(name: &str) -> Option<FileClass> {
    let lower = name.to_lowercase();
    let (base, ext) = lower.rsplit_once('.')?;

    match ext {
        "dentalproject" => Some(FileClass::Project),
        "constructioninfo" => Some(FileClass::Info),
        "stl" => {
            if base.ends_with("cad") {
                Some(FileClass::Stl(StlClass::Cad))
            } else if base.contains("model") {
                Some(FileClass::Stl(StlClass::Model))
            } else {
                Some(FileClass::Stl(StlClass::Other))
            }
        }
        _ => None,
    }
}

/// Archive-layout detector: true for day folders of a YYYY/MM/DD nesting.
/// Month-level shapes (YYYY/NN without a day level) are recognized by the
/// original tool but deliberately never pruned; the only layout the archiver
/// produces is year/month/day.
pub fn is_likely_archive_path(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    if !is_digits(name, 2) {
        return false;
    }

    let parent = path.parent();
    let parent_name = parent
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let grandparent_name = parent
        .and_then(|p| p.parent())
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");

    is_digits(parent_name, 2) && is_digits(grandparent_name, 4)
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_digit())
}

/// Lexically normalized path, used as the key for status maps and the
/// scan idempotency guard
pub fn normalize_path(path: &Path) -> PathBuf {
    path.to_path_buf().clean()
}

fn mtime_date(mtime: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(mtime).date_naive()
}

/// Directory scanner with an optional depth limit
pub struct DirectoryScanner {
    max_depth: usize,
}

impl DirectoryScanner {
    /// `max_depth` 0 means unlimited
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Full-tree scan: every case folder under `watch_folder` with at least
    /// one qualifying file modified today, newest first.
    pub fn scan(&self, watch_folder: &Path) -> Vec<ProjectRecord> {
        self.scan_on(watch_folder, Local::now().date_naive())
    }

    /// Full-tree scan against an explicit calendar day
    pub fn scan_on(&self, watch_folder: &Path, today: NaiveDate) -> Vec<ProjectRecord> {
        if !watch_folder.is_dir() {
            warn!("Scan root is missing or not a directory: {}", watch_folder.display());
            return Vec::new();
        }

        let mut walker = WalkDir::new(watch_folder).follow_links(false);
        if self.max_depth > 0 {
            // A folder at the configured depth still yields its files (one
            // level deeper in walkdir terms); nothing below it is visited.
            walker = walker.max_depth(self.max_depth + 2);
        }

        // Collect classified files grouped by folder, in discovery order
        let mut folder_order: Vec<PathBuf> = Vec::new();
        let mut files_by_folder: std::collections::HashMap<PathBuf, Vec<FileRecord>> =
            std::collections::HashMap::new();

        let entries = walker
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && is_likely_archive_path(e.path())));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry during scan: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(record) = file_record(entry.path()) else {
                continue;
            };

            let folder = match entry.path().parent() {
                Some(parent) => parent.to_path_buf(),
                None => continue,
            };
            files_by_folder
                .entry(folder.clone())
                .or_insert_with(|| {
                    folder_order.push(folder.clone());
                    Vec::new()
                })
                .push(record);
        }

        let mut processed: HashSet<PathBuf> = HashSet::new();
        let mut projects = Vec::new();

        for folder in folder_order {
            let normalized = normalize_path(&folder);
            if !processed.insert(normalized) {
                continue;
            }

            let files = &files_by_folder[&folder];
            let todays_latest = files
                .iter()
                .filter(|f| mtime_date(f.mtime) == today)
                .map(|f| f.mtime)
                .max();
            let Some(last_modified) = todays_latest else {
                continue;
            };

            if let Some(record) = build_record(&folder, files, Some(last_modified)) {
                projects.push(record);
            }
        }

        projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        projects
    }

    /// Targeted scan of one known-changed folder: non-recursive, no
    /// modified-today requirement, always produces a record.
    pub fn scan_folder(&self, folder: &Path) -> Option<ProjectRecord> {
        let entries = match std::fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Targeted scan failed to list {}: {}", folder.display(), e);
                return None;
            }
        };

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(record) = file_record(&path) {
                files.push(record);
            }
        }

        let last_modified = files
            .iter()
            .map(|f| f.mtime)
            .max()
            .or_else(|| std::fs::metadata(folder).and_then(|m| m.modified()).ok())
            .unwrap_or_else(SystemTime::now);

        Some(synthesize_if_needed(folder, &files, last_modified))
    }
}

/// Stat and classify a single file; unreadable files are skipped silently
fn file_record(path: &Path) -> Option<FileRecord> {
    let name = path.file_name()?.to_str()?.to_string();
    let class = classify_file_name(&name)?;
    let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let base_name = name
        .rsplit_once('.')
        .map(|(base, _)| base.to_string())
        .unwrap_or_else(|| name.clone());

    Some(FileRecord {
        path: path.to_path_buf(),
        name,
        base_name,
        class,
        mtime,
    })
}

/// Build a record for a folder containing a case document; `None` when the
/// folder has no case document (full-tree scans skip such folders)
fn build_record(
    folder: &Path,
    files: &[FileRecord],
    last_modified: Option<SystemTime>,
) -> Option<ProjectRecord> {
    let project_file = files
        .iter()
        .filter(|f| f.class == FileClass::Project)
        .max_by_key(|f| f.mtime)?;

    let base_name = project_file.base_name.clone();
    let summary = metadata::parse_or_sentinel(&project_file.path, &base_name);

    Some(assemble(
        folder,
        files,
        base_name,
        Some(project_file.path.clone()),
        summary,
        last_modified.unwrap_or(project_file.mtime),
    ))
}

/// Targeted-scan record: real when a case document exists, otherwise a
/// synthesized record named after the folder with sentinel metadata
fn synthesize_if_needed(
    folder: &Path,
    files: &[FileRecord],
    last_modified: SystemTime,
) -> ProjectRecord {
    if let Some(record) = build_record(folder, files, Some(last_modified)) {
        return record;
    }

    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.to_string_lossy().into_owned());
    let summary = CaseSummary::unavailable(&folder_name);

    assemble(folder, files, folder_name, None, summary, last_modified)
}

fn assemble(
    folder: &Path,
    files: &[FileRecord],
    base_name: String,
    project_path: Option<PathBuf>,
    summary: CaseSummary,
    last_modified: SystemTime,
) -> ProjectRecord {
    // Prefer the info document matching the case document's base name
    let info_path = files
        .iter()
        .find(|f| f.class == FileClass::Info && f.base_name == base_name)
        .or_else(|| files.iter().find(|f| f.class == FileClass::Info))
        .map(|f| f.path.clone());

    let stl_paths = |class: StlClass| -> Vec<PathBuf> {
        files
            .iter()
            .filter(|f| f.class == FileClass::Stl(class))
            .map(|f| f.path.clone())
            .collect()
    };

    ProjectRecord {
        folder_path: folder.to_path_buf(),
        base_name,
        project_path,
        info_path,
        cad_stl_paths: stl_paths(StlClass::Cad),
        model_stl_paths: stl_paths(StlClass::Model),
        other_stl_paths: stl_paths(StlClass::Other),
        last_modified,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs;
    use tempfile::TempDir;

    const CASE_XML: &str = r#"<DentalProject>
  <Patient><PatientName>Doe, John</PatientName></Patient>
  <Teeth><Tooth><Number>11</Number><ReconstructionType>crown</ReconstructionType></Tooth></Teeth>
</DentalProject>"#;

    fn make_case_folder(root: &Path, name: &str) -> PathBuf {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join(format!("{}.dentalProject", name)), CASE_XML).unwrap();
        fs::write(folder.join(format!("{}.constructionInfo", name)), "info").unwrap();
        fs::write(folder.join(format!("{}cad.stl", name)), "solid").unwrap();
        fs::write(folder.join(format!("{}model.stl", name)), "solid").unwrap();
        folder
    }

    fn set_mtime_days_ago(path: &Path, days: i64) {
        let then = SystemTime::now() - std::time::Duration::from_secs(86400 * days as u64);
        filetime::set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
    }

    #[test]
    fn test_classify_file_name() {
        assert_eq!(
            classify_file_name("Case.DentalProject"),
            Some(FileClass::Project)
        );
        assert_eq!(
            classify_file_name("case.constructionInfo"),
            Some(FileClass::Info)
        );
        assert_eq!(
            classify_file_name("crown-Cad.stl"),
            Some(FileClass::Stl(StlClass::Cad))
        );
        assert_eq!(
            classify_file_name("ModelBase.stl"),
            Some(FileClass::Stl(StlClass::Model))
        );
        assert_eq!(
            classify_file_name("situ.stl"),
            Some(FileClass::Stl(StlClass::Other))
        );
        assert_eq!(classify_file_name("notes.txt"), None);
        assert_eq!(classify_file_name("noextension"), None);
    }

    #[test]
    fn test_archive_path_detection() {
        assert!(is_likely_archive_path(Path::new("/cam/2024/03/15")));
        assert!(!is_likely_archive_path(Path::new("/cam/2024/03")));
        assert!(!is_likely_archive_path(Path::new("/cam/abcd/03/15")));
        assert!(!is_likely_archive_path(Path::new("/lab/case42")));
        // Month-level nesting is recognized but not pruned
        assert!(!is_likely_archive_path(Path::new("/cam/2024/15")));
    }

    #[test]
    fn test_scan_finds_todays_projects() {
        let temp = TempDir::new().unwrap();
        make_case_folder(temp.path(), "case1");
        make_case_folder(temp.path(), "case2");

        let scanner = DirectoryScanner::new(0);
        let projects = scanner.scan(temp.path());

        assert_eq!(projects.len(), 2);
        let record = projects.iter().find(|p| p.base_name == "case1").unwrap();
        assert!(record.has_cad());
        assert!(record.has_info());
        assert!(record.has_models());
        assert_eq!(record.summary.patient, "Doe");
        assert_eq!(record.file_status(), "+C +I +P");
    }

    #[test]
    fn test_scan_excludes_stale_folders() {
        let temp = TempDir::new().unwrap();
        let folder = make_case_folder(temp.path(), "old_case");
        for entry in fs::read_dir(&folder).unwrap().flatten() {
            set_mtime_days_ago(&entry.path(), 3);
        }

        let scanner = DirectoryScanner::new(0);
        assert!(scanner.scan(temp.path()).is_empty());
    }

    #[test]
    fn test_scan_prunes_archive_paths() {
        let temp = TempDir::new().unwrap();
        let archived = temp.path().join("2024").join("03").join("15");
        fs::create_dir_all(&archived).unwrap();
        make_case_folder(&archived, "case1");
        make_case_folder(temp.path(), "fresh");

        let scanner = DirectoryScanner::new(0);
        let projects = scanner.scan(temp.path());

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].base_name, "fresh");
    }

    #[test]
    fn test_scan_depth_limit() {
        let temp = TempDir::new().unwrap();
        // depth 1 relative to the root: lab/case_a
        make_case_folder(&temp.path().join("lab"), "case_a");
        // depth 2: lab/deep/case_b is beyond max_depth 1
        make_case_folder(&temp.path().join("lab").join("deep"), "case_b");

        let scanner = DirectoryScanner::new(1);
        let projects = scanner.scan(temp.path());

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].base_name, "case_a");

        let unlimited = DirectoryScanner::new(0);
        assert_eq!(unlimited.scan(temp.path()).len(), 2);
    }

    #[test]
    fn test_scan_skips_folder_without_case_document() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("loose_meshes");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("something-cad.stl"), "solid").unwrap();

        let scanner = DirectoryScanner::new(0);
        assert!(scanner.scan(temp.path()).is_empty());
    }

    #[test]
    fn test_newest_case_document_wins() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("case");
        fs::create_dir_all(&folder).unwrap();
        let old = folder.join("v1.dentalProject");
        fs::write(&old, CASE_XML).unwrap();
        fs::write(folder.join("v2.dentalProject"), CASE_XML).unwrap();
        filetime::set_file_mtime(
            &old,
            FileTime::from_system_time(SystemTime::now() - std::time::Duration::from_secs(600)),
        )
        .unwrap();

        let scanner = DirectoryScanner::new(0);
        let projects = scanner.scan(temp.path());

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].base_name, "v2");
    }

    #[test]
    fn test_targeted_scan_synthesizes_record() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("mystery_case");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("part-cad.stl"), "solid").unwrap();

        let scanner = DirectoryScanner::new(0);
        let record = scanner.scan_folder(&folder).unwrap();

        assert_eq!(record.base_name, "mystery_case");
        assert!(record.project_path.is_none());
        assert_eq!(record.summary.patient, "mystery_case");
        assert_eq!(record.summary.work_type, "N/A");
        assert!(record.has_cad());
        assert!(!record.has_info());
    }

    #[test]
    fn test_targeted_scan_ignores_stale_filter() {
        let temp = TempDir::new().unwrap();
        let folder = make_case_folder(temp.path(), "stale");
        for entry in fs::read_dir(&folder).unwrap().flatten() {
            set_mtime_days_ago(&entry.path(), 2);
        }

        let scanner = DirectoryScanner::new(0);
        let record = scanner.scan_folder(&folder).unwrap();
        assert_eq!(record.base_name, "stale");
        assert!(record.has_models());
    }

    #[test]
    fn test_scan_missing_root_returns_empty() {
        let scanner = DirectoryScanner::new(0);
        assert!(scanner.scan(Path::new("/nonexistent/watch/root")).is_empty());
    }

    #[test]
    fn test_records_sorted_newest_first() {
        let temp = TempDir::new().unwrap();
        let a = make_case_folder(temp.path(), "alpha");
        make_case_folder(temp.path(), "beta");
        // Push alpha's files slightly into the past, still today
        for entry in fs::read_dir(&a).unwrap().flatten() {
            let then = SystemTime::now() - std::time::Duration::from_secs(120);
            filetime::set_file_mtime(&entry.path(), FileTime::from_system_time(then)).unwrap();
        }

        let scanner = DirectoryScanner::new(0);
        let projects = scanner.scan(temp.path());
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].base_name, "beta");
        assert_eq!(projects[1].base_name, "alpha");
    }
}
