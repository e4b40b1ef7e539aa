//! Native resolution service adapter.
//!
//! A dependency resolution service is an external facility that resolves a
//! component's dependency closure on its own. It reports three path lists, each
//! joined with the platform path separator: managed library paths, native search
//! directories, and resource search directories.

use crate::ResolverError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The service's answer, split into paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceResult {
    pub assembly_paths: Vec<PathBuf>,
    pub native_search_paths: Vec<PathBuf>,
    pub resource_search_paths: Vec<PathBuf>,
}

impl ServiceResult {
    pub fn from_lists(assembly_paths: &str, native_search_paths: &str, resource_search_paths: &str) -> Self {
        Self {
            assembly_paths: split_path_list(assembly_paths),
            native_search_paths: split_path_list(native_search_paths),
            resource_search_paths: split_path_list(resource_search_paths),
        }
    }
}

/// Split a platform-separator-joined path list, dropping empty entries.
pub fn split_path_list(list: &str) -> Vec<PathBuf> {
    std::env::split_paths(list)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}

pub trait DependencyService: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve the dependencies of the component whose main binary is
    /// `component`. On success the service calls `on_result` once with the
    /// managed, native, and resource path lists and returns zero.
    fn resolve_component_dependencies(
        &self,
        component: &Path,
        on_result: &mut dyn FnMut(&str, &str, &str),
    ) -> i32;
}

/// Ask `service` for the dependencies of `component`.
///
/// A non-zero status is a hard failure carrying the status code.
pub fn query_service(
    service: &dyn DependencyService,
    component: &Path,
) -> Result<ServiceResult, ResolverError> {
    let mut captured = None;
    let status = service.resolve_component_dependencies(component, &mut |assembly, native, resource| {
        captured = Some(ServiceResult::from_lists(assembly, native, resource));
    });

    if status != 0 {
        warn!(
            "{} failed for {} with status {status:#x}",
            service.name(),
            component.display()
        );
        return Err(ResolverError::DependencyService {
            component: component.to_path_buf(),
            status,
        });
    }

    let result = captured.ok_or_else(|| ResolverError::ServiceNoResult {
        component: component.to_path_buf(),
    })?;
    debug!(
        "{} resolved {}: {} managed paths, {} native dirs, {} resource dirs",
        service.name(),
        component.display(),
        result.assembly_paths.len(),
        result.native_search_paths.len(),
        result.resource_search_paths.len()
    );
    Ok(result)
}

/// A service with a fixed answer, for embedding hosts that already know the
/// dependency closure and for tests.
#[derive(Debug, Clone)]
pub struct StaticDependencyService {
    name: String,
    assembly_paths: String,
    native_search_paths: String,
    resource_search_paths: String,
    status: i32,
}

impl StaticDependencyService {
    pub fn from_lists(
        assembly_paths: impl Into<String>,
        native_search_paths: impl Into<String>,
        resource_search_paths: impl Into<String>,
    ) -> Self {
        Self {
            name: "static".to_owned(),
            assembly_paths: assembly_paths.into(),
            native_search_paths: native_search_paths.into(),
            resource_search_paths: resource_search_paths.into(),
            status: 0,
        }
    }

    pub fn from_paths(
        assembly_paths: &[PathBuf],
        native_search_paths: &[PathBuf],
        resource_search_paths: &[PathBuf],
    ) -> Result<Self, ResolverError> {
        Ok(Self::from_lists(
            join_path_list(assembly_paths)?,
            join_path_list(native_search_paths)?,
            join_path_list(resource_search_paths)?,
        ))
    }

    /// A service that always fails with `status`.
    pub fn failing(status: i32) -> Self {
        Self {
            status,
            ..Self::from_lists("", "", "")
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl DependencyService for StaticDependencyService {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_component_dependencies(
        &self,
        _component: &Path,
        on_result: &mut dyn FnMut(&str, &str, &str),
    ) -> i32 {
        if self.status == 0 {
            on_result(
                &self.assembly_paths,
                &self.native_search_paths,
                &self.resource_search_paths,
            );
        }
        self.status
    }
}

fn join_path_list(paths: &[PathBuf]) -> Result<String, ResolverError> {
    let joined = std::env::join_paths(paths)
        .map_err(|e| ResolverError::Config(format!("cannot join path list: {e}")))?;
    joined
        .into_string()
        .map_err(|raw| ResolverError::Config(format!("path list is not UTF-8: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl DependencyService for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        fn resolve_component_dependencies(
            &self,
            _component: &Path,
            _on_result: &mut dyn FnMut(&str, &str, &str),
        ) -> i32 {
            0
        }
    }

    #[test]
    fn split_drops_empty_entries() {
        let sep = if cfg!(windows) { ";" } else { ":" };
        let list = format!("/a/A.dll{sep}{sep}/b/B.dll{sep}");
        assert_eq!(
            split_path_list(&list),
            vec![PathBuf::from("/a/A.dll"), PathBuf::from("/b/B.dll")]
        );
        assert!(split_path_list("").is_empty());
    }

    #[test]
    fn query_returns_split_lists() {
        let service = StaticDependencyService::from_paths(
            &[PathBuf::from("/c/C.dll"), PathBuf::from("/n/D.dll")],
            &[PathBuf::from("/c/native")],
            &[],
        )
        .unwrap();
        let result = query_service(&service, Path::new("/c/C.dll")).unwrap();
        assert_eq!(result.assembly_paths.len(), 2);
        assert_eq!(result.native_search_paths, vec![PathBuf::from("/c/native")]);
        assert!(result.resource_search_paths.is_empty());
    }

    #[test]
    fn non_zero_status_is_fatal() {
        let service = StaticDependencyService::failing(0x8000_8092_u32 as i32).with_name("hostpolicy");
        let err = query_service(&service, Path::new("/c/C.dll")).unwrap_err();
        assert!(matches!(
            err,
            ResolverError::DependencyService { status, .. } if status == 0x8000_8092_u32 as i32
        ));
    }

    #[test]
    fn missing_callback_is_an_error() {
        let err = query_service(&Silent, Path::new("/c/C.dll")).unwrap_err();
        assert!(matches!(err, ResolverError::ServiceNoResult { .. }));
    }
}
