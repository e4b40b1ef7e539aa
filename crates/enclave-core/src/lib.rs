//! Component hosting for Enclave.
//!
//! This crate ties the manifest model, the resolver, and isolation domains into
//! the consumer-facing API: `create_resolver` builds a resolver for a component,
//! `create_isolation_domain` wires it into a domain under a load policy, and
//! `Domain::load_entry_library` requests the component's entry point.
//! `ComponentHost` does the same against a configurable host default domain.

pub mod config;
pub mod domain;
pub mod host;
pub mod logging;

pub use config::EnclaveConfig;
pub use domain::Domain;
pub use host::{ComponentHost, LoadedComponent, ServiceMode};
pub use logging::init_logging;

pub use enclave_resolver::{ComponentDependencyResolver, ResolverConfig};
pub use enclave_runtime::{LibraryRequest, LoadPolicy, LoadedLibrary, NativeHandle};

use enclave_schema::LibraryName;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] enclave_schema::ManifestError),
    #[error("resolver error: {0}")]
    Resolver(#[from] enclave_resolver::ResolverError),
    #[error("domain error: {0}")]
    Domain(#[from] enclave_runtime::DomainError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Build a resolver for the component whose main binary is `component`, with
/// default resolver settings.
pub fn create_resolver(
    component: impl AsRef<Path>,
) -> Result<ComponentDependencyResolver, CoreError> {
    Ok(ComponentDependencyResolver::from_manifest(
        component,
        &ResolverConfig::default(),
    )?)
}

/// Wire `resolver` into a domain under the process-wide host default domain.
pub fn create_isolation_domain<I, S>(
    policy: LoadPolicy,
    resolver: ComponentDependencyResolver,
    shared_exclusions: I,
) -> Result<Domain, CoreError>
where
    I: IntoIterator<Item = S>,
    S: Into<LibraryName>,
{
    ComponentHost::process_default().create_isolation_domain(policy, resolver, shared_exclusions)
}
