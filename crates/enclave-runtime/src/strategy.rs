use crate::domain::IsolationDomain;
use crate::library::{LibraryRequest, LoadedLibrary, NativeHandle};
use crate::DomainError;
use enclave_schema::LibraryName;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Outcome of asking one strategy for a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Handled(T),
    /// Not this strategy's library; the domain asks the next one.
    Unhandled,
}

impl<T> Resolution<T> {
    pub fn is_handled(&self) -> bool {
        matches!(self, Resolution::Handled(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Resolution::Handled(value) => Some(value),
            Resolution::Unhandled => None,
        }
    }
}

impl<T> From<Option<T>> for Resolution<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Resolution::Unhandled, Resolution::Handled)
    }
}

/// A resolution hook a domain consults, in installation order, for names it has
/// not materialized yet.
///
/// Implementations locate a file and hand it back to `domain` for
/// materialization (`load_from_path` and friends), so the resulting instance is
/// owned by the domain that asked.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn load_managed(
        &self,
        domain: &IsolationDomain,
        request: &LibraryRequest,
    ) -> Result<Resolution<Arc<LoadedLibrary>>, DomainError>;

    fn load_native(
        &self,
        _domain: &IsolationDomain,
        _name: &LibraryName,
    ) -> Result<Resolution<NativeHandle>, DomainError> {
        Ok(Resolution::Unhandled)
    }

    /// Logical names this strategy answers for once injected into a host domain.
    fn claimed_names(&self) -> Vec<LibraryName> {
        Vec::new()
    }

    /// Whether `request` would be handled, without materializing anything.
    /// A host domain uses this to detect two injected strategies able to
    /// answer the same request.
    fn can_resolve(&self, _request: &LibraryRequest) -> bool {
        false
    }
}

/// Probes a fixed list of directories for `<name>.<ext>`; satellites are looked
/// up as `<dir>/<culture>/<name>.<ext>`.
///
/// This is how a host domain resolves the names it ships with.
#[derive(Debug, Clone)]
pub struct DirectoryStrategy {
    name: String,
    directories: Vec<PathBuf>,
    managed_extension: String,
    native_extension: String,
}

impl DirectoryStrategy {
    pub fn new(name: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directories,
            managed_extension: "dll".to_owned(),
            native_extension: std::env::consts::DLL_EXTENSION.to_owned(),
        }
    }

    #[must_use]
    pub fn with_extensions(mut self, managed: &str, native: &str) -> Self {
        managed.clone_into(&mut self.managed_extension);
        native.clone_into(&mut self.native_extension);
        self
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    fn locate(&self, request: &LibraryRequest) -> Option<PathBuf> {
        let file = request.name.file_name(&self.managed_extension);
        self.directories
            .iter()
            .map(|dir| match request.culture() {
                Some(culture) => dir.join(culture).join(&file),
                None => dir.join(&file),
            })
            .find(|candidate| candidate.is_file())
    }
}

impl ResolutionStrategy for DirectoryStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_managed(
        &self,
        domain: &IsolationDomain,
        request: &LibraryRequest,
    ) -> Result<Resolution<Arc<LoadedLibrary>>, DomainError> {
        let Some(candidate) = self.locate(request) else {
            return Ok(Resolution::Unhandled);
        };
        debug!("{}: found {request} at {}", self.name, candidate.display());
        let library = match request.culture() {
            Some(culture) => domain.load_localized_from_path(culture, &candidate)?,
            None => domain.load_from_path(&candidate)?,
        };
        Ok(Resolution::Handled(library))
    }

    fn can_resolve(&self, request: &LibraryRequest) -> bool {
        self.locate(request).is_some()
    }

    fn load_native(
        &self,
        domain: &IsolationDomain,
        name: &LibraryName,
    ) -> Result<Resolution<NativeHandle>, DomainError> {
        let file = name.file_name(&self.native_extension);
        for dir in &self.directories {
            let candidate = dir.join(&file);
            if candidate.is_file() {
                return domain
                    .load_native_from_path(&candidate)
                    .map(Resolution::Handled);
            }
        }
        Ok(Resolution::Unhandled)
    }
}
