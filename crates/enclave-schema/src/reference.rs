use crate::paths::join_relative;
use crate::types::{LibraryName, PackageId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One loadable file shipped by a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryReference {
    pub package: PackageId,
    /// Path of the file relative to the package root. Never empty.
    pub relative_path: String,
    /// Root of the owning package relative to a probing path. `None` means the
    /// probing path itself is the package root.
    pub package_root: Option<String>,
}

impl LibraryReference {
    /// `<probing_path>[/<package_root>]/<relative_path>`
    pub fn candidate_path(&self, probing_path: &Path) -> PathBuf {
        let mut candidate = probing_path.to_path_buf();
        if let Some(root) = &self.package_root {
            candidate.push(root);
        }
        candidate.push(&self.relative_path);
        candidate
    }

    /// Directory holding the file, relative to a probing path.
    pub fn relative_dir(&self) -> PathBuf {
        let parent = Path::new(&self.relative_path)
            .parent()
            .unwrap_or_else(|| Path::new(""));
        match &self.package_root {
            Some(root) => join_relative(Path::new(root), parent),
            None => parent.to_path_buf(),
        }
    }
}

/// A managed library: a [`LibraryReference`] addressable by its simple name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedLibraryReference {
    pub library: LibraryReference,
    /// File name of `relative_path` without extension, derived once at parse time.
    pub simple_name: LibraryName,
}

/// A localized satellite library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceReference {
    pub library: LibraryReference,
    pub locale: String,
}

impl ResourceReference {
    /// Directory that contains the `<locale>/` directory, relative to a probing path.
    ///
    /// Satellites are laid out as `<dir>/<locale>/<name>.<ext>`; when the asset does
    /// not follow that layout its own directory is returned.
    pub fn probing_dir(&self) -> PathBuf {
        let dir = self.library.relative_dir();
        if dir.file_name().is_some_and(|name| name == self.locale.as_str()) {
            dir.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            dir
        }
    }
}
