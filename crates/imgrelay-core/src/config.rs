//! Application configuration types.
//!
//! The top-level [`Config`] struct carries all sub-configs for local storage,
//! the remote object store, the token codec, uploads, and maintenance. Every
//! section defaults sensibly so an empty file is valid to parse; the secrets
//! are then enforced separately by [`Config::require_secrets`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub token: TokenConfig,
    pub upload: UploadConfig,
    pub maintenance: MaintenanceConfig,
}

impl Config {
    /// Check the startup preconditions: the symmetric key/IV pair and the
    /// remote-store credentials must all be present.
    ///
    /// Returns [`Error::Config`] naming every missing setting.
    pub fn require_secrets(&self) -> Result<()> {
        let mut missing = Vec::new();

        if is_blank(&self.token.encryption_key) {
            missing.push("token.encryption_key");
        }
        if is_blank(&self.token.encryption_iv) {
            missing.push("token.encryption_iv");
        }
        if self.remote.url.trim().is_empty() {
            missing.push("remote.url");
        }
        if is_blank(&self.remote.username) {
            missing.push("remote.username");
        }
        if is_blank(&self.remote.password) {
            missing.push("remote.password");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.remote.url.is_empty()
            && !self.remote.url.starts_with("http://")
            && !self.remote.url.starts_with("https://")
        {
            warnings.push(format!(
                "remote.url '{}' does not look like an http(s) URL",
                self.remote.url
            ));
        }

        if self.remote.url.starts_with("http://") {
            warnings.push("remote.url uses plain http; credentials are sent unencrypted".into());
        }

        if self.remote.timeout_secs == 0 {
            warnings.push("remote.timeout_secs is 0; remote calls will have no timeout".into());
        }

        if self.storage.write_retries == 0 {
            warnings.push(
                "storage.write_retries is 0; lock contention will fail writes immediately".into(),
            );
        }

        if self.upload.max_name_attempts == 0 {
            warnings.push("upload.max_name_attempts is 0; treating it as 1".into());
        }

        if self.maintenance.log_retention_days == 0 {
            warnings.push(
                "maintenance.log_retention_days is 0; every access log is purged on each run"
                    .into(),
            );
        }

        for (name, secs) in [
            ("log_retention_interval_secs", self.maintenance.log_retention_interval_secs),
            ("orphan_sweep_interval_secs", self.maintenance.orphan_sweep_interval_secs),
            ("compaction_interval_secs", self.maintenance.compaction_interval_secs),
        ] {
            if secs == 0 {
                warnings.push(format!("maintenance.{name} is 0; the job will not be scheduled"));
            }
        }

        warnings
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Local database and cache directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    /// Extra attempts for writes that hit lock contention.
    pub write_retries: u32,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/imgrelay.db"),
            cache_dir: PathBuf::from("./uploads"),
            write_retries: 3,
            pool_size: 4,
        }
    }
}

/// WebDAV object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Collection under which objects are stored.
    pub prefix: String,
    pub timeout_secs: u64,
    /// Static headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Base for public URLs; defaults to `url`.
    pub public_base_url: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            prefix: "/images".into(),
            timeout_secs: 30,
            headers: BTreeMap::new(),
            public_base_url: None,
        }
    }
}

/// Token codec key material, hex encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub encryption_key: Option<String>,
    pub encryption_iv: Option<String>,
}

/// Upload behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// How many fresh names to try before giving up with a conflict.
    pub max_name_attempts: u32,
    /// Remove the caller's temp file once it is copied into the cache.
    pub remove_temp_file: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_name_attempts: 5,
            remove_temp_file: true,
        }
    }
}

/// Background maintenance job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub log_retention_days: u32,
    pub log_retention_interval_secs: u64,
    pub orphan_sweep_interval_secs: u64,
    /// Cache files younger than this are never swept.
    pub orphan_grace_secs: u64,
    pub compaction_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_retention_days: 30,
            log_retention_interval_secs: 24 * 60 * 60,
            orphan_sweep_interval_secs: 6 * 60 * 60,
            orphan_grace_secs: 60 * 60,
            compaction_interval_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Config {
        let mut config = Config::default();
        config.token.encryption_key = Some("00".repeat(32));
        config.token.encryption_iv = Some("11".repeat(16));
        config.remote.url = "https://dav.example.com/remote.php/webdav/".into();
        config.remote.username = Some("relay".into());
        config.remote.password = Some("secret".into());
        config
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.write_retries, 3);
        assert_eq!(config.remote.prefix, "/images");
        assert_eq!(config.remote.timeout_secs, 30);
        assert_eq!(config.maintenance.log_retention_days, 30);
        assert_eq!(config.maintenance.orphan_sweep_interval_secs, 21_600);
        assert!(config.maintenance.enabled);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [maintenance]
            log_retention_days = 7

            [remote.headers]
            x-post-server = "serv02"
            "#,
        )
        .unwrap();
        assert_eq!(config.maintenance.log_retention_days, 7);
        assert_eq!(config.maintenance.compaction_interval_secs, 604_800);
        assert_eq!(
            config.remote.headers.get("x-post-server").map(String::as_str),
            Some("serv02")
        );
    }

    #[test]
    fn missing_secrets_is_config_error() {
        let err = Config::default().require_secrets().unwrap_err();
        match err {
            Error::Config(msg) => {
                assert!(msg.contains("token.encryption_key"));
                assert!(msg.contains("token.encryption_iv"));
                assert!(msg.contains("remote.url"));
                assert!(msg.contains("remote.password"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let mut config = complete();
        config.remote.password = Some("   ".into());
        let err = config.require_secrets().unwrap_err();
        assert!(err.to_string().contains("remote.password"));
    }

    #[test]
    fn complete_config_passes() {
        let config = complete();
        config.require_secrets().unwrap();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validate_warns_on_zero_values() {
        let mut config = complete();
        config.storage.write_retries = 0;
        config.maintenance.compaction_interval_secs = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("write_retries")));
        assert!(warnings.iter().any(|w| w.contains("compaction_interval_secs")));
    }
}
