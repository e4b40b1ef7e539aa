//! Dependency resolution for Enclave components.
//!
//! A `ComponentDependencyResolver` is built once per component, either from the
//! component's dependency manifest or from an external dependency resolution
//! service, and answers managed and native lookups by ordered path probing. It
//! plugs into an isolation domain as a `ResolutionStrategy`.

pub mod config;
#[cfg(unix)]
pub mod hostpolicy;
pub mod probing;
pub mod resolver;
pub mod service;

pub use config::ResolverConfig;
#[cfg(unix)]
pub use hostpolicy::HostPolicyService;
pub use probing::{asset_probing_paths, general_probing_paths, ProbingPathSet};
pub use resolver::ComponentDependencyResolver;
pub use service::{
    query_service, split_path_list, DependencyService, ServiceResult, StaticDependencyService,
};

use enclave_schema::ManifestError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("resolver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid dependency manifest for component '{}': {source}", component.display())]
    Manifest {
        component: PathBuf,
        #[source]
        source: ManifestError,
    },
    #[error(
        "failed to prepare dependency resolution for component '{}': service status {status:#x}",
        component.display()
    )]
    DependencyService { component: PathBuf, status: i32 },
    #[error("dependency resolution service returned no result for component '{}'", component.display())]
    ServiceNoResult { component: PathBuf },
    #[error("dependency resolution service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid resolver configuration: {0}")]
    Config(String),
}
