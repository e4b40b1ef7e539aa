//! Probing path sets.
//!
//! A probing path set is an ordered list of directories; the first directory in
//! which a candidate file exists wins. Sets never hold the same directory twice,
//! and de-duplication keeps the first occurrence, so order is what the caller
//! supplied.

use crate::config::ResolverConfig;
use enclave_schema::paths::join_relative;
use enclave_schema::{additional_probing_paths, component_dir, ManifestError};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbingPathSet(Vec<PathBuf>);

impl ProbingPathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `dir` unless it is already present. Returns whether it was added.
    pub fn push(&mut self, dir: PathBuf) -> bool {
        if self.0.contains(&dir) {
            return false;
        }
        self.0.push(dir);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First candidate, in probing order, that exists on disk as a file.
    pub fn first_existing(&self, candidate: impl Fn(&Path) -> PathBuf) -> Option<PathBuf> {
        self.iter().map(candidate).find(|path| path.is_file())
    }
}

impl Extend<PathBuf> for ProbingPathSet {
    fn extend<I: IntoIterator<Item = PathBuf>>(&mut self, iter: I) {
        for dir in iter {
            self.push(dir);
        }
    }
}

impl FromIterator<PathBuf> for ProbingPathSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// General probing paths for `component`: its own directory, then the
/// `additionalProbingPaths` of the component's runtime configuration, then those
/// of the host entry binary's.
pub fn general_probing_paths(
    component: &Path,
    config: &ResolverConfig,
) -> Result<ProbingPathSet, ManifestError> {
    let mut set = ProbingPathSet::new();
    set.push(component_dir(component));
    set.extend(additional_probing_paths(component, config.include_dev_config)?);

    if let Some(entry) = config.entry_binary() {
        if entry != component {
            set.extend(additional_probing_paths(&entry, config.include_dev_config)?);
        }
    }

    debug!(
        "probing paths for {}: {:?}",
        component.display(),
        set.as_slice()
    );
    Ok(set)
}

/// Probing paths for native or resource assets: the component directory, then
/// every general probing path joined with each asset directory.
pub fn asset_probing_paths(
    component_dir: &Path,
    general: &ProbingPathSet,
    asset_dirs: &[PathBuf],
) -> ProbingPathSet {
    let mut set = ProbingPathSet::new();
    set.push(component_dir.to_path_buf());
    for base in general.iter() {
        for dir in asset_dirs {
            set.push(join_relative(base, dir));
        }
    }
    set
}
