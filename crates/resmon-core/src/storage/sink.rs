//! Output files, one per metric family and host.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::collector::Family;
use crate::trace::TraceError;

/// Directory that receives the trace files of one host.
#[derive(Debug, Clone)]
pub struct OutputDir {
    dir: PathBuf,
    host_id: String,
}

impl OutputDir {
    /// Checks that `dir` exists and is a directory. Nothing is created.
    pub fn open(dir: impl Into<PathBuf>, host_id: &str) -> Result<Self, TraceError> {
        let dir = dir.into();
        let metadata = std::fs::metadata(&dir).map_err(|source| TraceError::SinkOpen {
            path: dir.display().to_string(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(TraceError::SinkOpen {
                path: dir.display().to_string(),
                source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            });
        }

        Ok(Self {
            dir,
            host_id: host_id.replace('/', "_"),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// `<dir>/<family>-<host_id>`
    pub fn path_for(&self, family: Family) -> PathBuf {
        self.dir.join(format!("{}-{}", family.name(), self.host_id))
    }

    /// Creates the trace file for `family`, truncating an existing one.
    pub fn create(&self, family: Family) -> Result<File, TraceError> {
        let path = self.path_for(family);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| TraceError::SinkOpen {
                path: path.display().to_string(),
                source,
            })?;
        debug!(path = %path.display(), "trace file opened");
        Ok(file)
    }
}
