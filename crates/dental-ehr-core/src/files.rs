//! Generated and uploaded files on disk.
//!
//! Directories are created when the store is opened, never implicitly. Expired
//! files are removed by [`FileStore::cleanup_expired`], which the host calls
//! from its own schedule (see [`crate::timers::IntervalTimer`]).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FileStorageConfig;

/// File storage errors.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
}

pub type FileResult<T> = Result<T, FileError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FileError + '_ {
    move |source| FileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reduce a name to a safe single path component.
pub fn sanitize_filename(name: &str) -> FileResult<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return Err(FileError::InvalidName(name.to_string()));
    }
    Ok(cleaned)
}

/// Files removed by a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: usize,
}

/// Download and upload directories.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: FileStorageConfig,
}

impl FileStore {
    /// Open the store, creating its directories.
    pub fn open(config: &FileStorageConfig) -> FileResult<Self> {
        for dir in [config.download_dir(), config.upload_dir()] {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        debug!(
            downloads = %config.download_dir().display(),
            uploads = %config.upload_dir().display(),
            "file store ready"
        );
        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        self.config.download_dir()
    }

    pub fn upload_dir(&self) -> &Path {
        self.config.upload_dir()
    }

    /// Write a file into the download directory, never overwriting an existing one.
    pub fn save_download(&self, filename: &str, bytes: &[u8]) -> FileResult<PathBuf> {
        self.write_unique(self.config.download_dir(), filename, bytes)
    }

    /// Write a file into the upload directory, never overwriting an existing one.
    pub fn save_upload(&self, filename: &str, bytes: &[u8]) -> FileResult<PathBuf> {
        self.write_unique(self.config.upload_dir(), filename, bytes)
    }

    fn write_unique(&self, dir: &Path, filename: &str, bytes: &[u8]) -> FileResult<PathBuf> {
        let name = sanitize_filename(filename)?;
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
            _ => (name.clone(), String::new()),
        };

        let mut path = dir.join(&name);
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{} ({}){}", stem, n, ext));
            n += 1;
        }

        fs::write(&path, bytes).map_err(io_err(&path))?;
        debug!(path = %path.display(), size = bytes.len(), "file written");
        Ok(path)
    }

    /// Remove files in both directories older than the configured max age.
    pub fn cleanup_expired(&self, now: SystemTime) -> FileResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let max_age = self.config.max_file_age();

        for dir in [self.config.download_dir(), self.config.upload_dir()] {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err(dir)(e)),
            };

            for entry in entries {
                let entry = entry.map_err(io_err(dir))?;
                let path = entry.path();
                let modified = match entry.metadata().and_then(|m| {
                    if m.is_file() {
                        m.modified().map(Some)
                    } else {
                        Ok(None)
                    }
                }) {
                    Ok(Some(modified)) => modified,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot read file age");
                        report.failed += 1;
                        continue;
                    }
                };

                let age = now.duration_since(modified).unwrap_or_default();
                if age <= max_age {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => report.removed.push(path),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot remove expired file");
                        report.failed += 1;
                    }
                }
            }
        }

        if !report.removed.is_empty() {
            info!(removed = report.removed.len(), "expired files cleaned up");
        }
        Ok(report)
    }
}
