use crate::DomainError;
use enclave_schema::LibraryName;
use std::fmt;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// What a loader reports for a managed library image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedImage {
    pub digest: String,
    pub size: u64,
    /// Logical names of libraries this image depends on.
    pub references: Vec<LibraryName>,
}

/// A materialized native image.
pub enum NativeImage {
    /// Opened through the platform loader. Never closed: code mapped into the
    /// process stays mapped for its lifetime.
    Dynamic(ManuallyDrop<libloading::Library>),
    /// Recorded without being mapped into the process.
    Detached,
}

impl fmt::Debug for NativeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeImage::Dynamic(_) => f.write_str("NativeImage::Dynamic"),
            NativeImage::Detached => f.write_str("NativeImage::Detached"),
        }
    }
}

/// Turns a file on disk into a library image. Domains own the naming and
/// sharing rules; loaders only materialize bytes.
pub trait LibraryLoader: Send + Sync {
    fn name(&self) -> &str;

    fn load_managed(&self, path: &Path) -> Result<ManagedImage, DomainError>;

    fn load_native(&self, path: &Path) -> Result<NativeImage, DomainError>;
}

/// Reads managed images from disk and opens native images with the platform loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl LibraryLoader for FileLoader {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load_managed(&self, path: &Path) -> Result<ManagedImage, DomainError> {
        let bytes = std::fs::read(path).map_err(|e| DomainError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let digest = blake3::hash(&bytes).to_hex().to_string();
        debug!("read {} ({} bytes, {digest})", path.display(), bytes.len());
        Ok(ManagedImage {
            digest,
            size: bytes.len() as u64,
            references: Vec::new(),
        })
    }

    fn load_native(&self, path: &Path) -> Result<NativeImage, DomainError> {
        let library = open_dynamic(path)?;
        debug!("opened native library {}", path.display());
        Ok(NativeImage::Dynamic(ManuallyDrop::new(library)))
    }
}

#[allow(unsafe_code)]
fn open_dynamic(path: &Path) -> Result<libloading::Library, DomainError> {
    // SAFETY: opening a library runs its initialisers; the path was selected by
    // resolution for exactly this purpose.
    unsafe { libloading::Library::new(path) }.map_err(|e| DomainError::LoadFailed {
        path: PathBuf::from(path),
        reason: e.to_string(),
    })
}

pub fn select_loader(name: &str) -> Result<Arc<dyn LibraryLoader>, DomainError> {
    match name {
        "file" => Ok(Arc::new(FileLoader)),
        "mock" => Ok(Arc::new(crate::mock::MockLoader::new())),
        other => Err(DomainError::LoaderUnavailable(other.to_owned())),
    }
}
