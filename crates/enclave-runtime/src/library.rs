use crate::loader::NativeImage;
use enclave_schema::LibraryName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A request for a managed library by logical name, optionally for one culture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryRequest {
    pub name: LibraryName,
    pub culture: Option<String>,
}

impl LibraryRequest {
    pub fn new(name: impl Into<LibraryName>) -> Self {
        Self {
            name: name.into(),
            culture: None,
        }
    }

    /// A request for the satellite of `name` for `culture`. An empty culture
    /// means the neutral library.
    pub fn localized(name: impl Into<LibraryName>, culture: impl Into<String>) -> Self {
        let culture = culture.into();
        let culture = culture.trim();
        Self {
            name: name.into(),
            culture: (!culture.is_empty()).then(|| culture.to_owned()),
        }
    }

    pub fn culture(&self) -> Option<&str> {
        self.culture.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Key under which the materialized library is recorded in a domain table.
    pub(crate) fn key(&self) -> String {
        match self.culture() {
            Some(culture) => format!("{culture}/{}", self.name),
            None => self.name.to_string(),
        }
    }
}

impl fmt::Display for LibraryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.culture() {
            Some(culture) => write!(f, "{} [{culture}]", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Identity of the domain that materialized a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainRef {
    pub id: u64,
    pub name: String,
}

impl fmt::Display for DomainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// A managed library materialized by exactly one domain.
///
/// Handles are shared as `Arc`; two handles denote the same instance iff
/// `Arc::ptr_eq` holds.
#[derive(Debug)]
pub struct LoadedLibrary {
    pub(crate) name: LibraryName,
    pub(crate) culture: Option<String>,
    pub(crate) location: PathBuf,
    pub(crate) domain: DomainRef,
    pub(crate) digest: String,
    pub(crate) size: u64,
    pub(crate) references: Vec<LibraryName>,
}

impl LoadedLibrary {
    pub fn name(&self) -> &LibraryName {
        &self.name
    }

    pub fn culture(&self) -> Option<&str> {
        self.culture.as_deref()
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The domain that materialized this instance.
    pub fn domain(&self) -> &DomainRef {
        &self.domain
    }

    /// blake3 digest of the library image, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Logical names this library declares as dependencies.
    pub fn references(&self) -> &[LibraryName] {
        &self.references
    }

    /// Short display identity: `name@digest[..12]`.
    pub fn identity(&self) -> String {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        format!("{}@{short}", self.name)
    }
}

/// A native library materialized by exactly one domain.
#[derive(Debug)]
pub struct NativeLibrary {
    pub(crate) name: LibraryName,
    pub(crate) location: PathBuf,
    pub(crate) domain: DomainRef,
    pub(crate) image: NativeImage,
}

impl NativeLibrary {
    pub fn name(&self) -> &LibraryName {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn domain(&self) -> &DomainRef {
        &self.domain
    }

    pub fn image(&self) -> &NativeImage {
        &self.image
    }
}

pub type NativeHandle = Arc<NativeLibrary>;
