//! Shared fixtures for integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use labsentry::Config;

pub const CASE_XML: &str = r#"<?xml version="1.0"?>
<DentalProject>
  <Patient>
    <PatientName>Doe, John</PatientName>
    <PatientFirstName>C-1042</PatientFirstName>
  </Patient>
  <Practice>
    <PracticeName>Smile Clinic</PracticeName>
  </Practice>
  <Teeth>
    <Tooth><Number>11</Number><ReconstructionType>crown</ReconstructionType></Tooth>
    <Tooth><Number>12</Number><ReconstructionType>crown</ReconstructionType></Tooth>
  </Teeth>
</DentalProject>"#;

/// Temp directories plus a configuration pointing at them
pub struct Lab {
    pub watch: TempDir,
    pub state: TempDir,
    pub cam: TempDir,
    pub print: TempDir,
    pub config: Config,
}

impl Lab {
    pub fn new() -> Self {
        let watch = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let cam = TempDir::new().unwrap();
        let print = TempDir::new().unwrap();

        let mut config = Config::default();
        config.watch_folder = watch.path().to_string_lossy().into_owned();
        config.targets.cam = cam.path().to_string_lossy().into_owned();
        config.targets.print = print.path().to_string_lossy().into_owned();

        Self {
            watch,
            state,
            cam,
            print,
            config,
        }
    }

    pub fn state_dir(&self) -> &Path {
        self.state.path()
    }
}

/// Create a complete case folder: case document, info document, one CAD
/// mesh, one model mesh
pub fn make_case_folder(root: &Path, name: &str) -> PathBuf {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join(format!("{}.dentalProject", name)), CASE_XML).unwrap();
    fs::write(folder.join(format!("{}.constructionInfo", name)), "info").unwrap();
    fs::write(folder.join(format!("{}-cad.stl", name)), "solid cad").unwrap();
    fs::write(folder.join(format!("{}-model.stl", name)), "solid model").unwrap();
    folder
}

/// Backdate a file's modification time by whole days
pub fn backdate(path: &Path, days: u64) {
    let then = SystemTime::now() - Duration::from_secs(86400 * days);
    filetime::set_file_mtime(path, filetime::FileTime::from_system_time(then)).unwrap();
}
