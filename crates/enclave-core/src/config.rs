use crate::CoreError;
use enclave_resolver::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "ENCLAVE_CONFIG";

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnclaveConfig {
    /// Library loader backend: `file` or `mock`.
    pub loader: String,
    pub host_name: String,
    /// Directories the host default domain probes for its own libraries.
    pub host_directories: Vec<PathBuf>,
    pub resolver: ResolverConfig,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            loader: "file".to_owned(),
            host_name: enclave_runtime::DEFAULT_DOMAIN_NAME.to_owned(),
            host_directories: Vec::new(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl EnclaveConfig {
    /// Load config from `$ENCLAVE_CONFIG`, else `~/.config/enclave/config.json`.
    /// A missing file yields the defaults.
    pub fn load_default() -> Result<Self, CoreError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf, CoreError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home =
        std::env::var("HOME").map_err(|_| CoreError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/enclave/config.json"))
}
