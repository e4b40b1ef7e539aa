//! Identifier newtypes. Both serialize as plain JSON strings.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::path::Path;

/// Logical name of a library: the file name of its binary without extension.
///
/// Comparison is exact. Two binaries differing only by case are different
/// libraries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryName(String);

/// Identity of a package as keyed in a manifest, usually `name/version`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl LibraryName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// `Newtonsoft.Json` for `lib/netstandard2.0/Newtonsoft.Json.dll`.
    pub fn from_file(path: &Path) -> Option<Self> {
        path.file_stem()
            .map(|stem| Self(stem.to_string_lossy().into_owned()))
            .filter(|name| !name.0.is_empty())
    }

    /// `<name>.<extension>`, the file a probe looks for.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl PackageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Package name without the version suffix.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or(&self.0, |(name, _)| name)
    }

    pub fn version(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, version)| version)
    }

    /// Key used to match `targets` entries against `libraries` entries.
    pub fn lookup_key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! str_like {
    ($($name:ident),+) => {$(
        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    )+};
}

str_like!(LibraryName, PackageId);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn library_name_from_nested_file() {
        let name =
            LibraryName::from_file(Path::new("lib/netstandard2.0/Newtonsoft.Json.dll")).unwrap();
        assert_eq!(name, "Newtonsoft.Json");
        assert_eq!(name.file_name("dll"), "Newtonsoft.Json.dll");
        assert!(LibraryName::from_file(Path::new("")).is_none());
    }

    #[test]
    fn library_name_borrows_as_str_key() {
        let mut map = HashMap::new();
        map.insert(LibraryName::new("D"), 1);
        assert_eq!(map.get("D"), Some(&1));
        assert_eq!(map.get("d"), None);
    }

    #[test]
    fn package_id_parts() {
        let id = PackageId::new("Pkg-D/1.0.0");
        assert_eq!(id.name(), "Pkg-D");
        assert_eq!(id.version(), Some("1.0.0"));
        assert_eq!(id.lookup_key(), "pkg-d/1.0.0");
        assert_eq!(PackageId::new("runtime.native").version(), None);
    }

    #[test]
    fn package_id_is_a_plain_json_string() {
        let id = PackageId::new("pkg-d/1.0.0");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pkg-d/1.0.0\"");
        let back: PackageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
