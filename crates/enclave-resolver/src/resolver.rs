use crate::config::ResolverConfig;
use crate::probing::{asset_probing_paths, general_probing_paths, ProbingPathSet};
use crate::service::{query_service, DependencyService};
use crate::ResolverError;
use enclave_runtime::{
    DomainError, IsolationDomain, LibraryRequest, LoadedLibrary, NativeHandle, Resolution,
    ResolutionStrategy,
};
use enclave_schema::{
    component_dir, manifest_path, parse_manifest_file, simple_name, LibraryName,
    LibraryReference, ManagedLibraryReference, ManifestError, ResourceReference,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManagedAsset {
    /// Manifest entry, located by probing.
    Probed(ManagedLibraryReference),
    /// A file in the component directory, returned if it exists.
    Local(PathBuf),
    /// A path reported by a dependency service, returned as given.
    Service(PathBuf),
}

/// Resolves the libraries of one component.
///
/// Built once from the component's manifest (or a dependency service) and
/// immutable afterwards. Misses are `None`; only construction can fail.
#[derive(Debug)]
pub struct ComponentDependencyResolver {
    component: PathBuf,
    component_dir: PathBuf,
    label: String,
    index: HashMap<LibraryName, ManagedAsset>,
    self_describing: bool,
    probing_paths: ProbingPathSet,
    native_probing_paths: ProbingPathSet,
    resource_probing_paths: ProbingPathSet,
    managed_extension: String,
    native_extension: String,
}

impl ComponentDependencyResolver {
    /// Build a resolver from the manifest next to `component`.
    ///
    /// A missing manifest makes the component self-describing: only files in its
    /// own directory resolve. A malformed manifest or runtime configuration fails.
    pub fn from_manifest(
        component: impl AsRef<Path>,
        config: &ResolverConfig,
    ) -> Result<Self, ResolverError> {
        config.validate()?;
        let component = component.as_ref();
        let probing_paths =
            general_probing_paths(component, config).map_err(manifest_error(component))?;
        let mut resolver = Self::empty(component, config, probing_paths);

        let manifest_file = manifest_path(component);
        if manifest_file.is_file() {
            let deps = parse_manifest_file(&manifest_file)
                .and_then(|manifest| manifest.normalize())
                .map_err(manifest_error(component))?;
            info!(
                "loaded manifest {} ({} managed, {} native, {} resource assets)",
                manifest_file.display(),
                deps.managed.len(),
                deps.native.len(),
                deps.resources.len()
            );

            let native_dirs: Vec<PathBuf> =
                deps.native.iter().map(LibraryReference::relative_dir).collect();
            let resource_dirs: Vec<PathBuf> = deps
                .resources
                .iter()
                .map(ResourceReference::probing_dir)
                .collect();
            resolver.native_probing_paths = asset_probing_paths(
                &resolver.component_dir,
                &resolver.probing_paths,
                &native_dirs,
            );
            resolver.resource_probing_paths = asset_probing_paths(
                &resolver.component_dir,
                &resolver.probing_paths,
                &resource_dirs,
            );
            for reference in deps.managed {
                resolver.insert(reference.simple_name.clone(), ManagedAsset::Probed(reference));
            }
        } else {
            debug!(
                "no manifest at {}, {} is self-describing",
                manifest_file.display(),
                component.display()
            );
            resolver.self_describing = true;
            resolver.register_local_libraries()?;
        }

        resolver.register_component();
        Ok(resolver)
    }

    /// Build a resolver from a dependency resolution service.
    pub fn from_service(
        component: impl AsRef<Path>,
        service: &dyn DependencyService,
        config: &ResolverConfig,
    ) -> Result<Self, ResolverError> {
        config.validate()?;
        let component = component.as_ref();
        let result = query_service(service, component)?;
        let dir = component_dir(component);
        let mut resolver = Self::empty(component, config, std::iter::once(dir).collect());
        resolver.native_probing_paths = result.native_search_paths.into_iter().collect();
        resolver.resource_probing_paths = result.resource_search_paths.into_iter().collect();
        for path in result.assembly_paths {
            if let Some(name) = simple_name(&path) {
                resolver.insert(name, ManagedAsset::Service(path));
            }
        }
        resolver.register_component();
        info!(
            "{} resolved {} ({} managed libraries)",
            service.name(),
            component.display(),
            resolver.index.len()
        );
        Ok(resolver)
    }

    /// Add a dependency service's answer after what the resolver already knows.
    /// Existing names keep their location; search directories are appended.
    pub fn merge_service(&mut self, service: &dyn DependencyService) -> Result<(), ResolverError> {
        let result = query_service(service, &self.component)?;
        for path in result.assembly_paths {
            if let Some(name) = simple_name(&path) {
                self.insert(name, ManagedAsset::Service(path));
            }
        }
        self.native_probing_paths.extend(result.native_search_paths);
        self.resource_probing_paths
            .extend(result.resource_search_paths);
        Ok(())
    }

    fn empty(component: &Path, config: &ResolverConfig, probing_paths: ProbingPathSet) -> Self {
        let dir = component_dir(component);
        let label = simple_name(component).map_or_else(
            || format!("component:{}", component.display()),
            |name| format!("component:{name}"),
        );
        Self {
            component: component.to_path_buf(),
            component_dir: dir.clone(),
            label,
            index: HashMap::new(),
            self_describing: false,
            probing_paths,
            native_probing_paths: std::iter::once(dir.clone()).collect(),
            resource_probing_paths: std::iter::once(dir).collect(),
            managed_extension: config.managed_extension.clone(),
            native_extension: config.native_extension.clone(),
        }
    }

    /// First occurrence of a name wins.
    fn insert(&mut self, name: LibraryName, asset: ManagedAsset) {
        match self.index.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(asset);
            }
            Entry::Occupied(existing) => {
                debug!(
                    "{}: ignoring duplicate {} ({:?}), keeping {:?}",
                    self.label,
                    existing.key(),
                    asset,
                    existing.get()
                );
            }
        }
    }

    /// Index every library next to the main binary. A self-describing component
    /// answers for these names, so they are what it claims once injected.
    fn register_local_libraries(&mut self) -> Result<(), ResolverError> {
        let entries = match fs::read_dir(&self.component_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == self.managed_extension.as_str())
            {
                found.push(path);
            }
        }
        found.sort();
        debug!("{}: {} local libraries", self.label, found.len());
        for path in found {
            if let Some(name) = simple_name(&path) {
                self.insert(name, ManagedAsset::Local(path));
            }
        }
        Ok(())
    }

    fn register_component(&mut self) {
        if let Some(name) = simple_name(&self.component) {
            if !self.index.contains_key(name.as_str()) {
                let component = self.component.clone();
                self.index.insert(name, ManagedAsset::Local(component));
            }
        }
    }

    /// Locate a managed library.
    ///
    /// With a culture, only `<resource path>/<culture>/<name>.<ext>` is probed and
    /// the index is not consulted.
    pub fn resolve_managed_library(&self, name: &str, culture: Option<&str>) -> Option<PathBuf> {
        if let Some(culture) = culture.map(str::trim).filter(|c| !c.is_empty()) {
            let file = format!("{name}.{}", self.managed_extension);
            return self
                .resource_probing_paths
                .first_existing(|dir| dir.join(culture).join(&file));
        }

        match self.index.get(name) {
            Some(ManagedAsset::Probed(reference)) => self
                .probing_paths
                .first_existing(|dir| reference.library.candidate_path(dir)),
            Some(ManagedAsset::Local(path)) => path.is_file().then(|| path.clone()),
            Some(ManagedAsset::Service(path)) => Some(path.clone()),
            None if self.self_describing => {
                let candidate = self
                    .component_dir
                    .join(format!("{name}.{}", self.managed_extension));
                candidate.is_file().then_some(candidate)
            }
            None => None,
        }
    }

    /// Locate a native library: `<native path>/<name>.<native ext>`, first hit wins.
    pub fn resolve_native_library(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{name}.{}", self.native_extension);
        self.native_probing_paths
            .first_existing(|dir| dir.join(&file))
    }

    /// Resolve `request` and have `domain` materialize it. `Ok(None)` defers to
    /// the domain's next strategy.
    pub fn load_managed_library(
        &self,
        domain: &IsolationDomain,
        request: &LibraryRequest,
    ) -> Result<Option<Arc<LoadedLibrary>>, DomainError> {
        let Some(path) = self.resolve_managed_library(request.name.as_str(), request.culture())
        else {
            debug!("{}: {request} not found", self.label);
            return Ok(None);
        };
        let library = match request.culture() {
            Some(culture) => domain.load_localized_from_path(culture, &path)?,
            None => domain.load_from_path(&path)?,
        };
        Ok(Some(library))
    }

    pub fn load_native_library(
        &self,
        domain: &IsolationDomain,
        name: &str,
    ) -> Result<Option<NativeHandle>, DomainError> {
        let Some(path) = self.resolve_native_library(name) else {
            debug!("{}: native {name} not found", self.label);
            return Ok(None);
        };
        domain.load_native_from_path(&path).map(Some)
    }

    pub fn component(&self) -> &Path {
        &self.component
    }

    pub fn component_dir(&self) -> &Path {
        &self.component_dir
    }

    /// Logical name of the component's main binary.
    pub fn component_name(&self) -> Option<LibraryName> {
        simple_name(&self.component)
    }

    pub fn is_self_describing(&self) -> bool {
        self.self_describing
    }

    pub fn probing_paths(&self) -> &ProbingPathSet {
        &self.probing_paths
    }

    pub fn native_probing_paths(&self) -> &ProbingPathSet {
        &self.native_probing_paths
    }

    pub fn resource_probing_paths(&self) -> &ProbingPathSet {
        &self.resource_probing_paths
    }

    /// Indexed logical names, sorted.
    pub fn managed_names(&self) -> Vec<LibraryName> {
        let mut names: Vec<LibraryName> = self.index.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ResolutionStrategy for ComponentDependencyResolver {
    fn name(&self) -> &str {
        &self.label
    }

    fn load_managed(
        &self,
        domain: &IsolationDomain,
        request: &LibraryRequest,
    ) -> Result<Resolution<Arc<LoadedLibrary>>, DomainError> {
        self.load_managed_library(domain, request)
            .map(Resolution::from)
    }

    fn load_native(
        &self,
        domain: &IsolationDomain,
        name: &LibraryName,
    ) -> Result<Resolution<NativeHandle>, DomainError> {
        self.load_native_library(domain, name.as_str())
            .map(Resolution::from)
    }

    fn claimed_names(&self) -> Vec<LibraryName> {
        self.managed_names()
    }

    fn can_resolve(&self, request: &LibraryRequest) -> bool {
        self.resolve_managed_library(request.name.as_str(), request.culture())
            .is_some()
    }
}

fn manifest_error(component: &Path) -> impl Fn(ManifestError) -> ResolverError + '_ {
    move |source| ResolverError::Manifest {
        component: component.to_path_buf(),
        source,
    }
}
