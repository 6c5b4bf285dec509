//! Configuration loading.
//!
//! # Hierarchy
//!
//! Configuration is resolved in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file: `badgesync.toml` in the working directory, or an explicit path
//! 3. Environment variables: `BADGESYNC_*`
//! 4. CLI flags (applied by the binary)
//!
//! # Example Config
//!
//! ```toml
//! snapshot_root = "docs/raw/custom_integrations"
//! badge_root = "docs/badges"
//! history_root = "docs/history"
//! request_timeout_secs = 30
//! max_parallel_entities = 8
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Default location of the project config file.
pub const DEFAULT_CONFIG_FILE: &str = "badgesync.toml";

const DEFAULT_DATA_URL: &str = "https://analytics.home-assistant.io/custom_integrations.json";

/// Explicit configuration record handed to every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding one `{YYYY-MM-DD}.json` raw snapshot per day.
    pub snapshot_root: PathBuf,
    /// Directory holding `{entity}/{artifact}.json` badge files.
    pub badge_root: PathBuf,
    /// Directory holding `{entity}/{artifact}.json` history series files.
    pub history_root: PathBuf,
    /// Analytics endpoint serving the current snapshot.
    pub data_url: String,
    pub request_timeout_secs: u64,
    /// Upper bound on entities reconciled at the same time.
    pub max_parallel_entities: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_root: PathBuf::from("docs/raw/custom_integrations"),
            badge_root: PathBuf::from("docs/badges"),
            history_root: PathBuf::from("docs/history"),
            data_url: DEFAULT_DATA_URL.to_string(),
            request_timeout_secs: 30,
            max_parallel_entities: 8,
        }
    }
}

/// Config file contents; every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    snapshot_root: Option<PathBuf>,
    badge_root: Option<PathBuf>,
    history_root: Option<PathBuf>,
    data_url: Option<String>,
    request_timeout_secs: Option<u64>,
    max_parallel_entities: Option<usize>,
}

impl SyncConfig {
    /// Load defaults, the config file, and environment overrides, then validate.
    ///
    /// With `explicit_path` the file must exist; otherwise `badgesync.toml`
    /// is read only when present.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the file cannot be read or parsed, an
    /// environment override does not parse, or the result fails validation.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        match explicit_path {
            Some(path) => config.merge_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    config.merge_file(path)?;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the keys present in a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the file cannot be read or parsed.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        self.merge_toml(&content).map_err(|e| match e {
            Error::InvalidConfig { reason } => {
                Error::invalid_config(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Overlay the keys present in a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the document is malformed or names an
    /// unknown key.
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(content)
            .map_err(|e| Error::invalid_config(format!("failed to parse config: {e}")))?;

        if let Some(value) = file.snapshot_root {
            self.snapshot_root = value;
        }
        if let Some(value) = file.badge_root {
            self.badge_root = value;
        }
        if let Some(value) = file.history_root {
            self.history_root = value;
        }
        if let Some(value) = file.data_url {
            self.data_url = value;
        }
        if let Some(value) = file.request_timeout_secs {
            self.request_timeout_secs = value;
        }
        if let Some(value) = file.max_parallel_entities {
            self.max_parallel_entities = value;
        }
        Ok(())
    }

    /// Apply `BADGESYNC_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if a numeric override does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BADGESYNC_SNAPSHOT_ROOT") {
            self.snapshot_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("BADGESYNC_BADGE_ROOT") {
            self.badge_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("BADGESYNC_HISTORY_ROOT") {
            self.history_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("BADGESYNC_DATA_URL") {
            self.data_url = value;
        }
        if let Some(value) = lookup("BADGESYNC_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = value.parse().map_err(|e| {
                Error::invalid_config(format!("invalid BADGESYNC_REQUEST_TIMEOUT_SECS value: {e}"))
            })?;
        }
        if let Some(value) = lookup("BADGESYNC_MAX_PARALLEL_ENTITIES") {
            self.max_parallel_entities = value.parse().map_err(|e| {
                Error::invalid_config(format!(
                    "invalid BADGESYNC_MAX_PARALLEL_ENTITIES value: {e}"
                ))
            })?;
        }
        Ok(())
    }

    /// Check invariants the components rely on.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for empty roots or paths, a zero timeout,
    /// or zero parallelism.
    pub fn validate(&self) -> Result<()> {
        let roots = [
            ("snapshot_root", &self.snapshot_root),
            ("badge_root", &self.badge_root),
            ("history_root", &self.history_root),
        ];
        if let Some((name, _)) = roots.iter().find(|(_, path)| path.as_os_str().is_empty()) {
            return Err(Error::invalid_config(format!("{name} must not be empty")));
        }
        if self.data_url.trim().is_empty() {
            return Err(Error::invalid_config("data_url must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::invalid_config("request_timeout_secs must be at least 1"));
        }
        if self.max_parallel_entities == 0 {
            return Err(Error::invalid_config(
                "max_parallel_entities must be at least 1",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_match_published_layout() {
        let config = SyncConfig::default();
        assert_eq!(config.badge_root, PathBuf::from("docs/badges"));
        assert_eq!(config.history_root, PathBuf::from("docs/history"));
        assert_eq!(
            config.snapshot_root,
            PathBuf::from("docs/raw/custom_integrations")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_only_present_keys() {
        let mut config = SyncConfig::default();
        config
            .merge_toml("badge_root = \"out/badges\"\nmax_parallel_entities = 2\n")
            .unwrap();

        assert_eq!(config.badge_root, PathBuf::from("out/badges"));
        assert_eq!(config.max_parallel_entities, 2);
        assert_eq!(config.history_root, PathBuf::from("docs/history"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut config = SyncConfig::default();
        let err = config.merge_toml("badge_dir = \"x\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = SyncConfig::default();
        config.merge_toml("history_root = \"from-file\"").unwrap();

        let env: HashMap<&str, &str> = [
            ("BADGESYNC_HISTORY_ROOT", "from-env"),
            ("BADGESYNC_REQUEST_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.history_root, PathBuf::from("from-env"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        let mut config = SyncConfig::default();
        let result = config.apply_env(|key| {
            (key == "BADGESYNC_MAX_PARALLEL_ENTITIES").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_parallelism() {
        let config = SyncConfig {
            max_parallel_entities: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "snapshot_root = \"raw\"\n").unwrap();

        let config = SyncConfig::load(Some(&path)).unwrap();
        assert_eq!(config.snapshot_root, PathBuf::from("raw"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SyncConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }
}
