//! Bridge configuration.
//!
//! Read from a `Py3.toml` file, then overridden by environment variables:
//!
//! ```toml
//! module = "pyscripts"
//! search_paths = ["./pyscripts"]
//! decode = "direct"
//! lock_timeout_ms = 5000
//! mirror_positional_kwargs = false
//! log_results = true
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Environment variable overriding [`BridgeConfig::module`]
pub const ENV_MODULE: &str = "PY3_MODULE";
/// Environment variable prepending to [`BridgeConfig::search_paths`]
pub const ENV_PATH: &str = "PY3_PATH";
/// Environment variable overriding [`BridgeConfig::lock_timeout_ms`]
pub const ENV_LOCK_TIMEOUT_MS: &str = "PY3_LOCK_TIMEOUT_MS";

/// How a V2 return value is turned into a matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Parse `str` results as JSON, convert matrix-shaped objects directly,
    /// fall back to the repr text for everything else
    #[default]
    Direct,
    /// Always decode the repr text
    Repr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Module imported at startup
    pub module: String,
    /// Directories prepended to `sys.path` before the import
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub decode: DecodeMode,
    /// Upper bound on waiting for the invocation lock; unbounded if unset
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
    /// Also pass V1 positional values as `{"0": v0, ...}` keywords
    #[serde(default)]
    pub mirror_positional_kwargs: bool,
    #[serde(default = "default_true")]
    pub log_results: bool,
}

fn default_true() -> bool {
    true
}

impl BridgeConfig {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            search_paths: Vec::new(),
            decode: DecodeMode::default(),
            lock_timeout_ms: None,
            mirror_positional_kwargs: false,
            log_results: true,
        }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_decode(mut self, decode: DecodeMode) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_mirror_positional_kwargs(mut self, mirror: bool) -> Self {
        self.mirror_positional_kwargs = mirror;
        self
    }

    pub fn with_log_results(mut self, log_results: bool) -> Self {
        self.log_results = log_results;
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_toml_str(text: &str) -> BridgeResult<Self> {
        let config: BridgeConfig =
            toml::from_str(text).map_err(|e| BridgeError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Apply `PY3_MODULE`, `PY3_PATH` and `PY3_LOCK_TIMEOUT_MS`.
    pub fn with_env_overrides(self) -> BridgeResult<Self> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> BridgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(module) = lookup(ENV_MODULE) {
            self.module = module;
        }

        if let Some(paths) = lookup(ENV_PATH) {
            let mut extra: Vec<PathBuf> = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            extra.append(&mut self.search_paths);
            self.search_paths = extra;
        }

        if let Some(timeout) = lookup(ENV_LOCK_TIMEOUT_MS) {
            let ms = timeout.trim().parse::<u64>().map_err(|e| {
                BridgeError::config(format!("{ENV_LOCK_TIMEOUT_MS}={timeout:?}: {e}"))
            })?;
            self.lock_timeout_ms = Some(ms);
        }

        self.validate()?;
        Ok(self)
    }

    /// The module name must be a dotted Python identifier.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.module.is_empty() {
            return Err(BridgeError::config("module name is empty"));
        }

        let valid = self.module.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        });
        if !valid {
            return Err(BridgeError::config(format!(
                "'{}' is not a valid module name",
                self.module
            )));
        }

        Ok(())
    }
}
