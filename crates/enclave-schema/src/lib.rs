//! Dependency manifest model and runtime configuration for Enclave.
//!
//! This crate defines the schema layer: parsing a component's dependency manifest
//! (`DependencyManifest`), flattening it into ordered library references with
//! backfilled package roots (`ComponentDependencies`), reading
//! `additionalProbingPaths` from runtime configuration artifacts, and naming the
//! sidecar files that sit next to a component's main binary.

pub mod manifest;
pub mod normalize;
pub mod paths;
pub mod reference;
pub mod runtime_config;
pub mod types;

pub use manifest::{
    parse_manifest_file, parse_manifest_str, DependencyManifest, LibraryEntry, ManifestError,
    OrderedEntries, ResourceAsset, RuntimeAsset, RuntimeTarget, TargetPackage,
};
pub use normalize::ComponentDependencies;
pub use paths::{component_dir, manifest_path, runtime_config_paths, simple_name};
pub use reference::{LibraryReference, ManagedLibraryReference, ResourceReference};
pub use runtime_config::{
    additional_probing_paths, load_runtime_config, parse_runtime_config_str, RuntimeConfig,
    RuntimeOptions,
};
pub use types::{LibraryName, PackageId};
