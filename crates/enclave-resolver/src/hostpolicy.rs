//! Dependency resolution through the platform host-policy library.
//!
//! The library exports
//! `int corehost_resolve_component_dependencies(const char *component, result_fn cb)`
//! where `cb(assembly_paths, native_search_paths, resource_search_paths)` is
//! invoked synchronously on the calling thread before the function returns.

use crate::service::DependencyService;
use crate::ResolverError;
use libloading::Library;
use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RESOLVE_SYMBOL: &[u8] = b"corehost_resolve_component_dependencies\0";

/// Status reported when the component path cannot be passed across the boundary.
#[allow(clippy::cast_possible_wrap)]
pub const STATUS_INVALID_ARGUMENT: i32 = 0x8000_8081_u32 as i32;
/// Status reported when the resolve entry point cannot be found.
#[allow(clippy::cast_possible_wrap)]
pub const STATUS_ENTRY_POINT_MISSING: i32 = 0x8000_8082_u32 as i32;

type ResultFn = extern "C" fn(*const c_char, *const c_char, *const c_char);
type ResolveFn = unsafe extern "C" fn(*const c_char, ResultFn) -> i32;

thread_local! {
    static CAPTURED: RefCell<Option<(String, String, String)>> = const { RefCell::new(None) };
}

#[allow(unsafe_code)]
extern "C" fn capture_result(
    assembly_paths: *const c_char,
    native_search_paths: *const c_char,
    resource_search_paths: *const c_char,
) {
    let read = |ptr: *const c_char| {
        if ptr.is_null() {
            String::new()
        } else {
            // SAFETY: the service passes NUL-terminated strings that stay valid
            // for the duration of the callback.
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
    };
    let lists = (
        read(assembly_paths),
        read(native_search_paths),
        read(resource_search_paths),
    );
    CAPTURED.with(|captured| *captured.borrow_mut() = Some(lists));
}

/// The host-policy library, opened with `libloading`.
pub struct HostPolicyService {
    library: Library,
    path: PathBuf,
}

impl HostPolicyService {
    /// Platform file name of the host-policy library.
    pub fn library_file_name() -> String {
        format!(
            "{}hostpolicy{}",
            std::env::consts::DLL_PREFIX,
            std::env::consts::DLL_SUFFIX
        )
    }

    #[allow(unsafe_code)]
    pub fn open(path: &Path) -> Result<Self, ResolverError> {
        // SAFETY: loading the host-policy library runs its initialisers, which
        // have no preconditions on the caller.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            ResolverError::ServiceUnavailable(format!("{}: {e}", path.display()))
        })?;
        // SAFETY: only checks that the symbol exists; the signature is not used here.
        unsafe { library.get::<ResolveFn>(RESOLVE_SYMBOL) }.map_err(|e| {
            ResolverError::ServiceUnavailable(format!("{}: {e}", path.display()))
        })?;
        debug!("opened host policy library {}", path.display());
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Open the host-policy library from the first directory in `dirs` that holds it.
    pub fn locate(dirs: &[PathBuf]) -> Result<Self, ResolverError> {
        let file = Self::library_file_name();
        let path = dirs
            .iter()
            .map(|dir| dir.join(&file))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ResolverError::ServiceUnavailable(format!("{file} not found")))?;
        Self::open(&path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DependencyService for HostPolicyService {
    fn name(&self) -> &'static str {
        "hostpolicy"
    }

    #[allow(unsafe_code)]
    fn resolve_component_dependencies(
        &self,
        component: &Path,
        on_result: &mut dyn FnMut(&str, &str, &str),
    ) -> i32 {
        let Ok(component) = CString::new(component.as_os_str().as_bytes()) else {
            return STATUS_INVALID_ARGUMENT;
        };
        // SAFETY: the symbol has the C signature declared by `ResolveFn`.
        let resolve = match unsafe { self.library.get::<ResolveFn>(RESOLVE_SYMBOL) } {
            Ok(resolve) => resolve,
            Err(e) => {
                warn!("{}: {e}", self.path.display());
                return STATUS_ENTRY_POINT_MISSING;
            }
        };

        CAPTURED.with(|captured| captured.borrow_mut().take());
        // SAFETY: `component` outlives the call and `capture_result` matches `ResultFn`.
        let status = unsafe { resolve(component.as_ptr(), capture_result) };
        if let Some((assembly, native, resource)) =
            CAPTURED.with(|captured| captured.borrow_mut().take())
        {
            on_result(&assembly, &native, &resource);
        }
        status
    }
}
