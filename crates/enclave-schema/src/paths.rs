//! Sidecar file naming.
//!
//! A component's manifest and runtime configuration live next to its main binary
//! and share its base name: `Plugin.dll` → `Plugin.deps.json`,
//! `Plugin.runtimeconfig.json`, `Plugin.runtimeconfig.dev.json`.

use crate::types::LibraryName;
use std::path::{Path, PathBuf};

pub const MANIFEST_SUFFIX: &str = ".deps.json";
pub const RUNTIME_CONFIG_SUFFIX: &str = ".runtimeconfig.json";
pub const DEV_RUNTIME_CONFIG_SUFFIX: &str = ".runtimeconfig.dev.json";

/// Directory containing `binary`; `.` for a bare file name.
pub fn component_dir(binary: &Path) -> PathBuf {
    match binary.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Logical name of a library file: its file name without extension.
pub fn simple_name(path: impl AsRef<Path>) -> Option<LibraryName> {
    LibraryName::from_file(path.as_ref())
}

pub fn sidecar_path(binary: &Path, suffix: &str) -> PathBuf {
    let stem = binary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    component_dir(binary).join(format!("{stem}{suffix}"))
}

#[inline]
pub fn manifest_path(binary: &Path) -> PathBuf {
    sidecar_path(binary, MANIFEST_SUFFIX)
}

/// Runtime configuration candidates for `binary`, in the order they are applied.
pub fn runtime_config_paths(binary: &Path, include_dev: bool) -> Vec<PathBuf> {
    let mut paths = vec![sidecar_path(binary, RUNTIME_CONFIG_SUFFIX)];
    if include_dev {
        paths.push(sidecar_path(binary, DEV_RUNTIME_CONFIG_SUFFIX));
    }
    paths
}

/// Join `rel` onto `base` without introducing a trailing separator for an empty `rel`.
pub fn join_relative(base: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}
