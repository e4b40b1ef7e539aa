use crate::manifest::ManifestError;
use crate::paths::runtime_config_paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A runtime configuration artifact (`<binary>.runtimeconfig[.dev].json`).
///
/// Only `runtimeOptions.additionalProbingPaths` matters for resolution.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default)]
    pub runtime_options: RuntimeOptions,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    #[serde(default)]
    pub additional_probing_paths: Vec<String>,
}

pub fn parse_runtime_config_str(input: &str) -> Result<RuntimeConfig, serde_json::Error> {
    serde_json::from_str(input)
}

/// Read a runtime configuration file. A missing file yields `Ok(None)`.
pub fn load_runtime_config(path: &Path) -> Result<Option<RuntimeConfig>, ManifestError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let config =
        parse_runtime_config_str(&content).map_err(|source| ManifestError::RuntimeConfig {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        "loaded runtime config {} ({} additional probing paths)",
        path.display(),
        config.runtime_options.additional_probing_paths.len()
    );
    Ok(Some(config))
}

/// Additional probing paths declared next to `binary`, in file-then-entry order.
pub fn additional_probing_paths(
    binary: &Path,
    include_dev: bool,
) -> Result<Vec<PathBuf>, ManifestError> {
    let mut out = Vec::new();
    for path in runtime_config_paths(binary, include_dev) {
        if let Some(config) = load_runtime_config(&path)? {
            out.extend(
                config
                    .runtime_options
                    .additional_probing_paths
                    .into_iter()
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from),
            );
        }
    }
    Ok(out)
}
