use crate::CoreError;
use enclave_resolver::ComponentDependencyResolver;
use enclave_runtime::{
    DomainState, IsolationDomain, LibraryRequest, LoadPolicy, LoadedLibrary, NativeHandle,
};
use enclave_schema::LibraryName;
use std::path::Path;
use std::sync::Arc;

/// A component's isolation domain together with the resolver wired into it.
///
/// Under shared injection the underlying domain is the host default domain.
pub struct Domain {
    pub(crate) inner: Arc<IsolationDomain>,
    pub(crate) resolver: Arc<ComponentDependencyResolver>,
    pub(crate) policy: LoadPolicy,
}

impl Domain {
    /// Request a library by logical name; usually the component's entry library.
    pub fn load_entry_library(
        &self,
        name: &str,
    ) -> Result<Option<Arc<LoadedLibrary>>, CoreError> {
        Ok(self.inner.load_library(&LibraryRequest::new(name))?)
    }

    pub fn load_localized_library(
        &self,
        name: &str,
        culture: &str,
    ) -> Result<Option<Arc<LoadedLibrary>>, CoreError> {
        Ok(self
            .inner
            .load_library(&LibraryRequest::localized(name, culture))?)
    }

    pub fn load_native_library(&self, name: &str) -> Result<Option<NativeHandle>, CoreError> {
        Ok(self.inner.load_native_library(&LibraryName::new(name))?)
    }

    /// Materialize the library at `path` in this domain.
    pub fn load_from_path(&self, path: &Path) -> Result<Arc<LoadedLibrary>, CoreError> {
        Ok(self.inner.load_from_path(path)?)
    }

    /// Tear the domain down. Fails for shared injection, whose domain is the host's.
    pub fn teardown(&self) -> Result<(), CoreError> {
        Ok(self.inner.teardown()?)
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn state(&self) -> DomainState {
        self.inner.state()
    }

    pub fn resolver(&self) -> &ComponentDependencyResolver {
        &self.resolver
    }

    pub fn isolation_domain(&self) -> &Arc<IsolationDomain> {
        &self.inner
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("domain", self.inner.domain_ref())
            .field("policy", &self.policy)
            .field("component", &self.resolver.component())
            .finish()
    }
}
