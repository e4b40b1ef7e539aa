use crate::domain::IsolationDomain;
use crate::loader::FileLoader;
use std::sync::{Arc, OnceLock};

pub const DEFAULT_DOMAIN_NAME: &str = "Default";

static DEFAULT_HOST: OnceLock<Arc<IsolationDomain>> = OnceLock::new();

/// The process-wide host default domain, created with the file loader on first use.
///
/// It lives for the whole process and cannot be torn down.
pub fn default_host() -> Arc<IsolationDomain> {
    Arc::clone(
        DEFAULT_HOST.get_or_init(|| IsolationDomain::host(DEFAULT_DOMAIN_NAME, Arc::new(FileLoader))),
    )
}
