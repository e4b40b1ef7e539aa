//! Isolation domains and library materialization for Enclave.
//!
//! This crate implements the execution layer: `IsolationDomain` namespaces with
//! their load policies (full isolation, prefer-parent, shared injection into the
//! host default domain), the lifecycle state machine, the `ResolutionStrategy`
//! seam that resolvers plug into, pluggable `LibraryLoader` backends (file-backed
//! with `libloading` for native code, and a mock), and load diagnostics.

pub mod diagnostics;
pub mod domain;
pub mod host;
pub mod library;
pub mod lifecycle;
pub mod loader;
pub mod mock;
pub mod strategy;

pub use diagnostics::{LoadKind, LoadObserver, LoadOutcome, LoadRecord, RecordingObserver};
pub use domain::{IsolationDomain, LoadPolicy};
pub use host::{default_host, DEFAULT_DOMAIN_NAME};
pub use library::{DomainRef, LibraryRequest, LoadedLibrary, NativeHandle, NativeLibrary};
pub use lifecycle::{validate_transition, DomainState};
pub use loader::{select_loader, FileLoader, LibraryLoader, ManagedImage, NativeImage};
pub use mock::MockLoader;
pub use strategy::{DirectoryStrategy, Resolution, ResolutionStrategy};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("domain '{0}' has been torn down")]
    Disposed(String),
    #[error("library '{name}' is already claimed by '{claimed_by}' in the host domain")]
    AmbiguousSharing { name: String, claimed_by: String },
    #[error("invalid domain state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("the host default domain '{0}' cannot be torn down")]
    HostTeardown(String),
    #[error("domain '{0}' is not a host domain")]
    NotHost(String),
    #[error("load policy '{0}' does not create a separate domain")]
    UnsupportedPolicy(LoadPolicy),
    #[error("loader '{0}' is not available")]
    LoaderUnavailable(String),
    #[error("failed to load {}: {reason}", path.display())]
    LoadFailed { path: PathBuf, reason: String },
}
