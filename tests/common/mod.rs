#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const ACCESS_LOG_CSV: &str = "\
user_id,door_id,timestamp,result
1,101,2023-01-01 10:00:00,granted
2,102,2023-01-01 10:05:00,denied
3,101,2023-01-01 10:07:00,granted
";

pub const VENDOR_LOG_CSV: &str = "\
Badge Number,Reader Name,Event Time,Access Outcome
B-1,Front,2023-01-01 10:00:00,Granted
B-2,Lobby,2023-01-01 10:05:00,Denied
";

pub fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}
