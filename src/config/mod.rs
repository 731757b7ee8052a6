pub use imgrelay_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Files searched, in order, when no `--config` is given.
const DEFAULT_PATHS: [&str; 4] = [
    "./imgrelay.toml",
    "./config.toml",
    "~/.config/imgrelay/config.toml",
    "/etc/imgrelay/config.toml",
];

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    finish(&mut config);
    Ok(config)
}

/// Load config from default locations or fall back to defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    let mut config = Config::default();
    finish(&mut config);
    Ok(config)
}

fn finish(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
    config.storage.db_path = expand_path(&config.storage.db_path);
    config.storage.cache_dir = expand_path(&config.storage.cache_dir);

    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

/// Apply `IMGRELAY_*` overrides. Secrets are usually supplied this way
/// rather than written to the file.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("IMGRELAY_ENCRYPTION_KEY") {
        config.token.encryption_key = Some(v);
    }
    if let Some(v) = get("IMGRELAY_ENCRYPTION_IV") {
        config.token.encryption_iv = Some(v);
    }
    if let Some(v) = get("IMGRELAY_REMOTE_URL") {
        config.remote.url = v;
    }
    if let Some(v) = get("IMGRELAY_REMOTE_USERNAME") {
        config.remote.username = Some(v);
    }
    if let Some(v) = get("IMGRELAY_REMOTE_PASSWORD") {
        config.remote.password = Some(v);
    }
    if let Some(v) = get("IMGRELAY_DB_PATH") {
        config.storage.db_path = PathBuf::from(v);
    }
    if let Some(v) = get("IMGRELAY_CACHE_DIR") {
        config.storage.cache_dir = PathBuf::from(v);
    }
}
