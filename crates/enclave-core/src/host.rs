use crate::config::EnclaveConfig;
use crate::domain::Domain;
use crate::CoreError;
use enclave_resolver::{ComponentDependencyResolver, DependencyService};
use enclave_runtime::{
    default_host, select_loader, DirectoryStrategy, DomainError, IsolationDomain, LoadObserver,
    LoadPolicy, LoadedLibrary, ResolutionStrategy,
};
use enclave_schema::LibraryName;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// How a configured dependency service relates to manifest parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Resolve from the service only.
    Replace,
    /// Parse the manifest, then add the service's answer for names it lacks.
    Supplement,
}

/// A component materialized into its domain.
#[derive(Debug)]
pub struct LoadedComponent {
    pub domain: Domain,
    pub library: Arc<LoadedLibrary>,
}

/// Loads components under one host default domain.
pub struct ComponentHost {
    host: Arc<IsolationDomain>,
    config: EnclaveConfig,
    service: Option<(Arc<dyn DependencyService>, ServiceMode)>,
}

impl ComponentHost {
    /// A host around the process-wide default domain with default settings.
    pub fn process_default() -> Self {
        Self {
            host: default_host(),
            config: EnclaveConfig::default(),
            service: None,
        }
    }

    /// A host with its own default domain, built from `config`.
    pub fn with_config(config: EnclaveConfig) -> Result<Self, CoreError> {
        let loader = select_loader(&config.loader)?;
        let host = IsolationDomain::host(config.host_name.clone(), loader);
        if !config.host_directories.is_empty() {
            host.inject(Arc::new(
                DirectoryStrategy::new("host-directories", config.host_directories.clone())
                    .with_extensions(
                        &config.resolver.managed_extension,
                        &config.resolver.native_extension,
                    ),
            ))?;
        }
        info!(
            "component host {} ready ({} loader)",
            host.domain_ref(),
            host.loader_name()
        );
        Ok(Self {
            host,
            config,
            service: None,
        })
    }

    /// A host around an existing host domain.
    pub fn with_host(host: Arc<IsolationDomain>, config: EnclaveConfig) -> Result<Self, CoreError> {
        if !host.is_host() {
            return Err(DomainError::NotHost(host.name().to_owned()).into());
        }
        Ok(Self {
            host,
            config,
            service: None,
        })
    }

    #[must_use]
    pub fn with_dependency_service(
        mut self,
        service: Arc<dyn DependencyService>,
        mode: ServiceMode,
    ) -> Self {
        self.service = Some((service, mode));
        self
    }

    pub fn host(&self) -> &Arc<IsolationDomain> {
        &self.host
    }

    pub fn config(&self) -> &EnclaveConfig {
        &self.config
    }

    /// Observe the host; domains created afterwards inherit the observer.
    pub fn add_observer(&self, observer: Arc<dyn LoadObserver>) {
        self.host.add_observer(observer);
    }

    pub fn create_resolver(
        &self,
        component: impl AsRef<Path>,
    ) -> Result<ComponentDependencyResolver, CoreError> {
        let component = component.as_ref();
        let resolver = match &self.service {
            Some((service, ServiceMode::Replace)) => ComponentDependencyResolver::from_service(
                component,
                service.as_ref(),
                &self.config.resolver,
            )?,
            Some((service, ServiceMode::Supplement)) => {
                let mut resolver =
                    ComponentDependencyResolver::from_manifest(component, &self.config.resolver)?;
                resolver.merge_service(service.as_ref())?;
                resolver
            }
            None => ComponentDependencyResolver::from_manifest(component, &self.config.resolver)?,
        };
        Ok(resolver)
    }

    /// Wire `resolver` into a domain under `policy`.
    ///
    /// Shared injection creates no domain: the resolver is injected into the host
    /// and the returned `Domain` wraps the host. Shared exclusions only apply to
    /// full isolation.
    pub fn create_isolation_domain<I, S>(
        &self,
        policy: LoadPolicy,
        resolver: ComponentDependencyResolver,
        shared_exclusions: I,
    ) -> Result<Domain, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<LibraryName>,
    {
        let resolver = Arc::new(resolver);
        let exclusions: Vec<LibraryName> = shared_exclusions.into_iter().map(Into::into).collect();
        let strategy: Arc<dyn ResolutionStrategy> = resolver.clone();

        let inner = match policy {
            LoadPolicy::SharedInjection => {
                if !exclusions.is_empty() {
                    warn!(
                        "shared exclusions ignored for {}: shared injection uses the host namespace",
                        resolver.component().display()
                    );
                }
                self.host.inject(strategy)?;
                Arc::clone(&self.host)
            }
            LoadPolicy::FullyIsolated | LoadPolicy::PreferParent => {
                let name = resolver
                    .component_name()
                    .map_or_else(|| "component".to_owned(), LibraryName::into_inner);
                let domain = IsolationDomain::new(name, policy, &self.host)?;
                domain.bind(vec![strategy], exclusions)?;
                domain
            }
        };

        Ok(Domain {
            inner,
            resolver,
            policy,
        })
    }

    /// Build a resolver and a domain for `component`, then materialize its main
    /// binary (and the references it declares) in that domain.
    pub fn load_component<I, S>(
        &self,
        component: impl AsRef<Path>,
        policy: LoadPolicy,
        shared_exclusions: I,
    ) -> Result<LoadedComponent, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<LibraryName>,
    {
        let component = component.as_ref();
        let resolver = self.create_resolver(component)?;
        let domain = self.create_isolation_domain(policy, resolver, shared_exclusions)?;
        let library = domain.load_from_path(component)?;
        info!(
            "loaded component {} into {} ({policy})",
            library.identity(),
            domain.isolation_domain().domain_ref()
        );
        Ok(LoadedComponent { domain, library })
    }
}
