use crate::loader::{LibraryLoader, ManagedImage, NativeImage};
use crate::DomainError;
use enclave_schema::{simple_name, LibraryName};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-memory loader for tests.
///
/// Files must exist, but their bytes are never interpreted: digests are derived
/// from the path, and references come from `with_references`. Every load is
/// recorded so tests can assert how often a file was materialized.
pub struct MockLoader {
    references: HashMap<String, Vec<LibraryName>>,
    loads: Mutex<Vec<PathBuf>>,
}

impl Default for MockLoader {
    fn default() -> Self {
        Self {
            references: HashMap::new(),
            loads: Mutex::new(Vec::new()),
        }
    }
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that the library named `library` references `references`.
    #[must_use]
    pub fn with_references(mut self, library: &str, references: &[&str]) -> Self {
        self.references.insert(
            library.to_owned(),
            references.iter().map(|r| LibraryName::new(*r)).collect(),
        );
        self
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.loads
            .lock()
            .map(|loads| loads.clone())
            .unwrap_or_default()
    }

    pub fn load_count(&self, path: &Path) -> usize {
        self.loads
            .lock()
            .map(|loads| loads.iter().filter(|p| p.as_path() == path).count())
            .unwrap_or(0)
    }

    fn record(&self, path: &Path) -> Result<(), DomainError> {
        if !path.is_file() {
            return Err(DomainError::LoadFailed {
                path: path.to_path_buf(),
                reason: "no such file".to_owned(),
            });
        }
        let mut loads = self.loads.lock().map_err(|e| DomainError::LoadFailed {
            path: path.to_path_buf(),
            reason: format!("mutex poisoned: {e}"),
        })?;
        loads.push(path.to_path_buf());
        Ok(())
    }
}

impl LibraryLoader for MockLoader {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn load_managed(&self, path: &Path) -> Result<ManagedImage, DomainError> {
        self.record(path)?;
        let digest = blake3::hash(format!("mock-library:{}", path.display()).as_bytes())
            .to_hex()
            .to_string();
        let references = simple_name(path)
            .and_then(|name| self.references.get(name.as_str()).cloned())
            .unwrap_or_default();
        Ok(ManagedImage {
            digest,
            size: 0,
            references,
        })
    }

    fn load_native(&self, path: &Path) -> Result<NativeImage, DomainError> {
        self.record(path)?;
        Ok(NativeImage::Detached)
    }
}
