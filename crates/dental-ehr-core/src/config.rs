//! Core runtime configuration.
//!
//! Configuration is resolved once by the host application and passed into the
//! collaborators that need it (`HttpBackend`, `FileStore`, the wizard). Nothing
//! in this crate reads environment variables or creates directories at import
//! time; directory creation happens in [`crate::files::FileStore::open`] and
//! expiry cleanup is driven by whoever owns the process's task loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Default debounce for keystroke-driven re-validation.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);
/// Default refresh interval for appointment statuses.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Default age after which temporary uploads are removed.
pub const DEFAULT_FILE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
/// Default size of the local error ring buffer.
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 10;

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// REST backend settings.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl BackendConfig {
    /// `base_url` is the service origin, e.g. `https://clinica.example`; API paths are appended.
    pub fn new(base_url: impl Into<String>) -> ConfigResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Invalid("backend base_url cannot be empty".into()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "backend base_url must be http(s): {}",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bearer token sent with every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth_token = if token.trim().is_empty() { None } else { Some(token) };
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> ConfigResult<Self> {
        if timeout.is_zero() {
            return Err(ConfigError::Invalid("request timeout must be non-zero".into()));
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Where generated and uploaded files live.
#[derive(Clone, Debug)]
pub struct FileStorageConfig {
    download_dir: PathBuf,
    upload_dir: PathBuf,
    max_file_age: Duration,
}

impl FileStorageConfig {
    /// Both directories live under `root`: `root/descargas` and `root/uploads`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            download_dir: root.join("descargas"),
            upload_dir: root.join("uploads"),
            max_file_age: DEFAULT_FILE_MAX_AGE,
        }
    }

    pub fn new(download_dir: PathBuf, upload_dir: PathBuf, max_file_age: Duration) -> ConfigResult<Self> {
        if max_file_age.is_zero() {
            return Err(ConfigError::Invalid("max_file_age must be non-zero".into()));
        }
        Ok(Self {
            download_dir,
            upload_dir,
            max_file_age,
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_file_age(&self) -> Duration {
        self.max_file_age
    }
}

/// Timers used by the wizard and the appointment poller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WizardTiming {
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for WizardTiming {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Core configuration resolved at startup.
///
/// Without a backend, records are saved to the in-process record service.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    backend: Option<BackendConfig>,
    files: FileStorageConfig,
    timing: WizardTiming,
    error_log_capacity: usize,
}

impl CoreConfig {
    pub fn new(files: FileStorageConfig) -> Self {
        Self {
            backend: None,
            files,
            timing: WizardTiming::default(),
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }

    /// Save records through the REST record service.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_timing(mut self, timing: WizardTiming) -> ConfigResult<Self> {
        if timing.debounce.is_zero() || timing.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("wizard timers must be non-zero".into()));
        }
        self.timing = timing;
        Ok(self)
    }

    pub fn with_error_log_capacity(mut self, capacity: usize) -> ConfigResult<Self> {
        if capacity == 0 {
            return Err(ConfigError::Invalid("error log capacity must be at least 1".into()));
        }
        self.error_log_capacity = capacity;
        Ok(self)
    }

    pub fn backend(&self) -> Option<&BackendConfig> {
        self.backend.as_ref()
    }

    pub fn files(&self) -> &FileStorageConfig {
        &self.files
    }

    pub fn timing(&self) -> WizardTiming {
        self.timing
    }

    pub fn error_log_capacity(&self) -> usize {
        self.error_log_capacity
    }
}
