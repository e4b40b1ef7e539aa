use crate::ResolverError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings shared by every resolver a host creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Extension of managed library files, without the dot.
    pub managed_extension: String,
    /// Extension of native library files, without the dot.
    pub native_extension: String,
    /// Entry binary of the hosting process; its runtime configuration contributes
    /// probing paths. `None` means the current executable.
    pub host_entry_binary: Option<PathBuf>,
    /// Also read `*.runtimeconfig.dev.json`.
    pub include_dev_config: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            managed_extension: "dll".to_owned(),
            native_extension: std::env::consts::DLL_EXTENSION.to_owned(),
            host_entry_binary: None,
            include_dev_config: true,
        }
    }
}

impl ResolverConfig {
    pub fn entry_binary(&self) -> Option<PathBuf> {
        self.host_entry_binary
            .clone()
            .or_else(|| std::env::current_exe().ok())
    }

    pub fn validate(&self) -> Result<(), ResolverError> {
        for (field, value) in [
            ("managed_extension", &self.managed_extension),
            ("native_extension", &self.native_extension),
        ] {
            if value.trim().is_empty() {
                return Err(ResolverError::Config(format!("{field} must not be empty")));
            }
            if value.starts_with('.') {
                return Err(ResolverError::Config(format!(
                    "{field} must not start with '.': {value}"
                )));
            }
        }
        Ok(())
    }
}
