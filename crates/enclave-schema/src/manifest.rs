use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("runtime target '{0}' is not listed under targets")]
    MissingTarget(String),
    #[error("manifest lists {0} targets but no runtimeTarget to choose between them")]
    AmbiguousTarget(usize),
    #[error("package '{package}' lists an asset with an empty path")]
    EmptyAssetPath { package: String },
    #[error("resource asset '{path}' of package '{package}' has an empty locale")]
    EmptyLocale { package: String, path: String },
    #[error("invalid runtime configuration {}: {source}", path.display())]
    RuntimeConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Entries of a JSON object in document order.
///
/// Manifest semantics depend on declaration order (first occurrence wins), which a
/// hash map would lose. Duplicate keys are kept as separate entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedEntries<T>(pub Vec<(String, T)>);

impl<T> Default for OrderedEntries<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> OrderedEntries<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// First entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OrderedEntries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = OrderedEntries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// A component's dependency manifest (`<component>.deps.json`).
///
/// Only the sections that drive resolution are modelled; everything else in the
/// document (compilation options, signatures, hashes) is ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyManifest {
    #[serde(default)]
    pub runtime_target: Option<RuntimeTarget>,
    /// runtime identifier → package identity → asset groups
    pub targets: OrderedEntries<OrderedEntries<TargetPackage>>,
    /// package identity → package metadata
    pub libraries: OrderedEntries<LibraryEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuntimeTarget {
    pub name: String,
}

/// Asset groups one package contributes to a runtime target.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TargetPackage {
    #[serde(default)]
    pub runtime: OrderedEntries<RuntimeAsset>,
    #[serde(default)]
    pub native: OrderedEntries<RuntimeAsset>,
    #[serde(default)]
    pub resources: OrderedEntries<ResourceAsset>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeAsset {
    #[serde(default)]
    pub assembly_version: Option<String>,
    #[serde(default)]
    pub file_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResourceAsset {
    pub locale: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LibraryEntry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Root of the package relative to a probing path.
    #[serde(default)]
    pub path: Option<String>,
}

impl DependencyManifest {
    /// The target whose assets apply to this process.
    ///
    /// `runtimeTarget.name` selects the entry; a manifest without `runtimeTarget`
    /// is accepted only when it lists a single target.
    pub fn target(&self) -> Result<(&str, &OrderedEntries<TargetPackage>), ManifestError> {
        match &self.runtime_target {
            Some(rt) => self
                .targets
                .get(&rt.name)
                .map(|packages| (rt.name.as_str(), packages))
                .ok_or_else(|| ManifestError::MissingTarget(rt.name.clone())),
            None => match self.targets.0.as_slice() {
                [(name, packages)] => Ok((name.as_str(), packages)),
                other => Err(ManifestError::AmbiguousTarget(other.len())),
            },
        }
    }
}

pub fn parse_manifest_str(input: &str) -> Result<DependencyManifest, ManifestError> {
    Ok(serde_json::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<DependencyManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
