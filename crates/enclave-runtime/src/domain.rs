use crate::diagnostics::{LoadKind, LoadObserver, LoadOutcome, LoadRecord};
use crate::library::{DomainRef, LibraryRequest, LoadedLibrary, NativeHandle, NativeLibrary};
use crate::lifecycle::{validate_transition, DomainState};
use crate::loader::LibraryLoader;
use crate::strategy::{Resolution, ResolutionStrategy};
use crate::DomainError;
use enclave_schema::{simple_name, LibraryName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::{debug, info, warn};

static NEXT_DOMAIN_ID: AtomicU64 = AtomicU64::new(1);

/// How a component's libraries relate to the host default domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// Own instance of every library the component resolves; only the shared
    /// exclusions are taken from the parent.
    FullyIsolated,
    /// Reuse whatever the parent can provide; fall back to the component's own
    /// resolver.
    PreferParent,
    /// No separate domain: the component's resolver is injected into the host.
    SharedInjection,
}

impl std::fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadPolicy::FullyIsolated => write!(f, "fully-isolated"),
            LoadPolicy::PreferParent => write!(f, "prefer-parent"),
            LoadPolicy::SharedInjection => write!(f, "shared-injection"),
        }
    }
}

/// The policies a child domain can hold. Shared injection never creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildPolicy {
    FullyIsolated,
    PreferParent,
}

impl From<ChildPolicy> for LoadPolicy {
    fn from(policy: ChildPolicy) -> Self {
        match policy {
            ChildPolicy::FullyIsolated => LoadPolicy::FullyIsolated,
            ChildPolicy::PreferParent => LoadPolicy::PreferParent,
        }
    }
}

/// What the host knows about which injected strategy answers which request.
#[derive(Default)]
struct Claims {
    /// Logical name → strategy that declared it at injection.
    names: BTreeMap<LibraryName, String>,
    /// Request key → request the host resolved, and the strategy that did.
    answered: BTreeMap<String, (LibraryRequest, String)>,
}

enum Lineage {
    Host,
    Child {
        policy: ChildPolicy,
        parent: Arc<IsolationDomain>,
    },
}

/// A namespace in which each logical library name maps to at most one
/// materialized instance.
///
/// Lookups consult the domain's own table first. Misses follow the domain's
/// policy: the host asks its strategies in installation order; a fully isolated
/// child asks its parent for shared exclusions and its strategies for anything
/// else; a prefer-parent child asks its parent first and its strategies second.
pub struct IsolationDomain {
    domain: DomainRef,
    lineage: Lineage,
    loader: Arc<dyn LibraryLoader>,
    state: Mutex<DomainState>,
    strategies: RwLock<Vec<Arc<dyn ResolutionStrategy>>>,
    shared_exclusions: RwLock<BTreeSet<LibraryName>>,
    managed: Mutex<HashMap<String, Arc<LoadedLibrary>>>,
    native: Mutex<HashMap<String, NativeHandle>>,
    /// Host only.
    claims: Mutex<Claims>,
    observers: RwLock<Vec<Arc<dyn LoadObserver>>>,
}

impl IsolationDomain {
    /// Create a host default domain. Hosts start bound; they receive
    /// strategies through [`IsolationDomain::inject`].
    pub fn host(name: impl Into<String>, loader: Arc<dyn LibraryLoader>) -> Arc<Self> {
        let domain = Self::build(name.into(), Lineage::Host, loader, DomainState::Bound, Vec::new());
        info!("created host domain {}", domain.domain);
        Arc::new(domain)
    }

    /// Create a child domain under `parent`. The child shares the parent's loader
    /// and starts with the parent's observers.
    pub fn new(
        name: impl Into<String>,
        policy: LoadPolicy,
        parent: &Arc<IsolationDomain>,
    ) -> Result<Arc<Self>, DomainError> {
        let child_policy = match policy {
            LoadPolicy::FullyIsolated => ChildPolicy::FullyIsolated,
            LoadPolicy::PreferParent => ChildPolicy::PreferParent,
            LoadPolicy::SharedInjection => return Err(DomainError::UnsupportedPolicy(policy)),
        };
        parent.ensure_live()?;
        let observers = read(&parent.observers).clone();
        let domain = Self::build(
            name.into(),
            Lineage::Child {
                policy: child_policy,
                parent: Arc::clone(parent),
            },
            Arc::clone(&parent.loader),
            DomainState::Constructed,
            observers,
        );
        debug!(
            "created domain {} ({policy}) under {}",
            domain.domain, parent.domain
        );
        Ok(Arc::new(domain))
    }

    fn build(
        name: String,
        lineage: Lineage,
        loader: Arc<dyn LibraryLoader>,
        state: DomainState,
        observers: Vec<Arc<dyn LoadObserver>>,
    ) -> Self {
        Self {
            domain: DomainRef {
                id: NEXT_DOMAIN_ID.fetch_add(1, Ordering::Relaxed),
                name,
            },
            lineage,
            loader,
            state: Mutex::new(state),
            strategies: RwLock::new(Vec::new()),
            shared_exclusions: RwLock::new(BTreeSet::new()),
            managed: Mutex::new(HashMap::new()),
            native: Mutex::new(HashMap::new()),
            claims: Mutex::new(Claims::default()),
            observers: RwLock::new(observers),
        }
    }

    /// Install the resolution strategies and the names that must always come
    /// from the parent. Must happen before any library request.
    pub fn bind(
        &self,
        strategies: Vec<Arc<dyn ResolutionStrategy>>,
        shared_exclusions: impl IntoIterator<Item = LibraryName>,
    ) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        if *state == DomainState::TornDown {
            return Err(DomainError::Disposed(self.domain.name.clone()));
        }
        validate_transition(*state, DomainState::Bound)?;

        let names: Vec<String> = strategies.iter().map(|s| s.name().to_owned()).collect();
        *write(&self.strategies) = strategies;
        *write(&self.shared_exclusions) = shared_exclusions.into_iter().collect();
        *state = DomainState::Bound;
        debug!("bound {} to [{}]", self.domain, names.join(", "));
        Ok(())
    }

    /// Register a strategy with the host domain.
    ///
    /// Fails with `AmbiguousSharing` when the strategy could answer a request
    /// another strategy already answers:
    /// - a name it claims is claimed by an injected strategy;
    /// - a name it claims resolves through an installed strategy;
    /// - it can resolve a request the host already resolved elsewhere.
    ///
    /// The checks and the installation happen under one lock, so concurrent
    /// injections cannot both claim a name.
    pub fn inject(&self, strategy: Arc<dyn ResolutionStrategy>) -> Result<(), DomainError> {
        if !self.is_host() {
            return Err(DomainError::NotHost(self.domain.name.clone()));
        }
        self.ensure_live()?;

        let mut claims = lock(&self.claims);
        let names = strategy.claimed_names();
        if let Some(conflict) = self.sharing_conflict(&claims, strategy.as_ref(), &names) {
            return Err(conflict);
        }
        let claimed = names.len();
        for name in names {
            claims.names.insert(name, strategy.name().to_owned());
        }
        info!(
            "injected {} into {} ({claimed} names)",
            strategy.name(),
            self.domain
        );
        write(&self.strategies).push(strategy);
        Ok(())
    }

    pub fn add_observer(&self, observer: Arc<dyn LoadObserver>) {
        write(&self.observers).push(observer);
    }

    pub fn name(&self) -> &str {
        &self.domain.name
    }

    pub fn id(&self) -> u64 {
        self.domain.id
    }

    pub fn domain_ref(&self) -> &DomainRef {
        &self.domain
    }

    pub fn is_host(&self) -> bool {
        matches!(self.lineage, Lineage::Host)
    }

    /// `None` for a host domain.
    pub fn policy(&self) -> Option<LoadPolicy> {
        match &self.lineage {
            Lineage::Host => None,
            Lineage::Child { policy, .. } => Some((*policy).into()),
        }
    }

    pub fn parent(&self) -> Option<&Arc<IsolationDomain>> {
        match &self.lineage {
            Lineage::Host => None,
            Lineage::Child { parent, .. } => Some(parent),
        }
    }

    pub fn state(&self) -> DomainState {
        *lock(&self.state)
    }

    pub fn loader_name(&self) -> &str {
        self.loader.name()
    }

    pub fn shared_exclusions(&self) -> Vec<LibraryName> {
        read(&self.shared_exclusions).iter().cloned().collect()
    }

    pub fn strategy_names(&self) -> Vec<String> {
        read(&self.strategies)
            .iter()
            .map(|s| s.name().to_owned())
            .collect()
    }

    /// Host only: claimed logical names and the strategy answering for each.
    pub fn claims(&self) -> BTreeMap<LibraryName, String> {
        lock(&self.claims).names.clone()
    }

    /// Host only: keys of the requests the host resolved through a strategy,
    /// with the strategy that answered each.
    pub fn answered(&self) -> BTreeMap<String, String> {
        lock(&self.claims)
            .answered
            .iter()
            .map(|(key, (_, by))| (key.clone(), by.clone()))
            .collect()
    }

    /// Instance already materialized in (or shared into) this domain, without
    /// resolving.
    pub fn find_loaded(&self, request: &LibraryRequest) -> Option<Arc<LoadedLibrary>> {
        lock(&self.managed).get(&request.key()).cloned()
    }

    pub fn loaded_count(&self) -> usize {
        lock(&self.managed).len()
    }

    /// Resolve a managed library through this domain.
    ///
    /// `Ok(None)` means no strategy (and, where the policy allows, no parent)
    /// can provide the name.
    pub fn load_library(
        &self,
        request: &LibraryRequest,
    ) -> Result<Option<Arc<LoadedLibrary>>, DomainError> {
        self.ensure_live()?;
        let key = request.key();
        if let Some(existing) = lock(&self.managed).get(&key) {
            return Ok(Some(Arc::clone(existing)));
        }

        let resolved = match &self.lineage {
            Lineage::Host => self.consult_managed(request)?,
            Lineage::Child { policy, parent } => match policy {
                ChildPolicy::FullyIsolated if self.is_excluded(&request.name) => {
                    debug!("{}: {request} is shared, deferring to {}", self.domain, parent.domain);
                    self.share_managed(parent, request)?
                }
                ChildPolicy::FullyIsolated => self.consult_managed(request)?,
                ChildPolicy::PreferParent => {
                    match self.share_managed(parent, request)? {
                        Some(library) => Some(library),
                        None => self.consult_managed(request)?,
                    }
                }
            },
        };

        match resolved {
            Some(library) => Ok(Some(Arc::clone(
                lock(&self.managed).entry(key).or_insert(library),
            ))),
            None => {
                self.emit(LoadRecord::new(
                    key,
                    LoadKind::Managed,
                    None,
                    self.domain.to_string(),
                    LoadOutcome::NotFound,
                ));
                Ok(None)
            }
        }
    }

    /// Resolve a native library through this domain.
    pub fn load_native_library(
        &self,
        name: &LibraryName,
    ) -> Result<Option<NativeHandle>, DomainError> {
        self.ensure_live()?;
        if let Some(existing) = lock(&self.native).get(name.as_str()) {
            return Ok(Some(Arc::clone(existing)));
        }

        let resolved = match &self.lineage {
            Lineage::Host => self.consult_native(name)?,
            Lineage::Child { policy, parent } => match policy {
                ChildPolicy::FullyIsolated if self.is_excluded(name) => {
                    self.share_native(parent, name)?
                }
                ChildPolicy::FullyIsolated => self.consult_native(name)?,
                ChildPolicy::PreferParent => {
                    match self.share_native(parent, name)? {
                        Some(native) => Some(native),
                        None => self.consult_native(name)?,
                    }
                }
            },
        };

        match resolved {
            Some(native) => Ok(Some(Arc::clone(
                lock(&self.native)
                    .entry(name.to_string())
                    .or_insert(native),
            ))),
            None => {
                self.emit(LoadRecord::new(
                    name.as_str(),
                    LoadKind::Native,
                    None,
                    self.domain.to_string(),
                    LoadOutcome::NotFound,
                ));
                Ok(None)
            }
        }
    }

    /// Materialize the managed library at `path` in this domain, named by its
    /// file stem. A name that is already materialized returns the existing
    /// instance.
    pub fn load_from_path(&self, path: &Path) -> Result<Arc<LoadedLibrary>, DomainError> {
        let name = Self::name_of(path)?;
        self.materialize(&LibraryRequest::new(name), path)
    }

    /// Materialize the satellite library at `path` for `culture`.
    pub fn load_localized_from_path(
        &self,
        culture: &str,
        path: &Path,
    ) -> Result<Arc<LoadedLibrary>, DomainError> {
        let name = Self::name_of(path)?;
        self.materialize(&LibraryRequest::localized(name, culture), path)
    }

    /// Materialize the native library at `path` in this domain.
    pub fn load_native_from_path(&self, path: &Path) -> Result<NativeHandle, DomainError> {
        self.ensure_live()?;
        let name = Self::name_of(path)?;
        if let Some(existing) = lock(&self.native).get(name.as_str()) {
            return Ok(Arc::clone(existing));
        }

        let image = match self.loader.load_native(path) {
            Ok(image) => image,
            Err(e) => {
                self.emit_failure(name.as_str(), LoadKind::Native, path, &e);
                return Err(e);
            }
        };
        self.mark_active()?;
        let candidate = Arc::new(NativeLibrary {
            name: name.clone(),
            location: path.to_path_buf(),
            domain: self.domain.clone(),
            image,
        });
        let native = Arc::clone(
            lock(&self.native)
                .entry(name.to_string())
                .or_insert_with(|| Arc::clone(&candidate)),
        );
        if Arc::ptr_eq(&native, &candidate) {
            self.emit(LoadRecord::new(
                name.as_str(),
                LoadKind::Native,
                Some(path.to_path_buf()),
                self.domain.to_string(),
                LoadOutcome::Materialized,
            ));
        }
        Ok(native)
    }

    /// Release this domain's tables and strategies. Every later request fails
    /// with `Disposed`. Materialized code is not unloaded; handles held by
    /// callers stay valid.
    pub fn teardown(&self) -> Result<(), DomainError> {
        if self.is_host() {
            return Err(DomainError::HostTeardown(self.domain.name.clone()));
        }
        {
            let mut state = lock(&self.state);
            if *state == DomainState::TornDown {
                return Err(DomainError::Disposed(self.domain.name.clone()));
            }
            validate_transition(*state, DomainState::TornDown)?;
            *state = DomainState::TornDown;
        }

        let released = {
            let mut managed = lock(&self.managed);
            let count = managed.len();
            managed.clear();
            count
        };
        lock(&self.native).clear();
        write(&self.strategies).clear();
        info!("tore down {} ({released} managed libraries released)", self.domain);
        Ok(())
    }

    fn materialize(
        &self,
        request: &LibraryRequest,
        path: &Path,
    ) -> Result<Arc<LoadedLibrary>, DomainError> {
        self.ensure_live()?;
        let key = request.key();
        if let Some(existing) = lock(&self.managed).get(&key).cloned() {
            if existing.location() != path {
                debug!(
                    "{}: {key} already materialized from {}, ignoring {}",
                    self.domain,
                    existing.location().display(),
                    path.display()
                );
            }
            return Ok(existing);
        }

        let image = match self.loader.load_managed(path) {
            Ok(image) => image,
            Err(e) => {
                self.emit_failure(&key, LoadKind::Managed, path, &e);
                return Err(e);
            }
        };
        self.mark_active()?;
        let candidate = Arc::new(LoadedLibrary {
            name: request.name.clone(),
            culture: request.culture().map(str::to_owned),
            location: path.to_path_buf(),
            domain: self.domain.clone(),
            digest: image.digest,
            size: image.size,
            references: image.references,
        });
        // Inserted before references are requested so that cycles terminate.
        let library = Arc::clone(
            lock(&self.managed)
                .entry(key)
                .or_insert_with(|| Arc::clone(&candidate)),
        );
        if !Arc::ptr_eq(&library, &candidate) {
            return Ok(library);
        }

        self.emit(LoadRecord::new(
            library.identity(),
            LoadKind::Managed,
            Some(path.to_path_buf()),
            self.domain.to_string(),
            LoadOutcome::Materialized,
        ));
        self.load_references(&library);
        Ok(library)
    }

    fn load_references(&self, library: &LoadedLibrary) {
        for reference in library.references() {
            let request = LibraryRequest::new(reference.clone());
            match self.load_library(&request) {
                Ok(Some(_)) => {}
                Ok(None) => warn!(
                    "{}: reference {reference} of {} could not be resolved",
                    self.domain,
                    library.name()
                ),
                Err(e) => warn!(
                    "{}: reference {reference} of {} failed to load: {e}",
                    self.domain,
                    library.name()
                ),
            }
        }
    }

    fn consult_managed(
        &self,
        request: &LibraryRequest,
    ) -> Result<Option<Arc<LoadedLibrary>>, DomainError> {
        let strategies = read(&self.strategies).clone();
        for strategy in &strategies {
            if let Resolution::Handled(library) = strategy.load_managed(self, request)? {
                debug!("{}: {request} resolved by {}", self.domain, strategy.name());
                if self.is_host() {
                    lock(&self.claims)
                        .answered
                        .entry(request.key())
                        .or_insert_with(|| (request.clone(), strategy.name().to_owned()));
                }
                return Ok(Some(library));
            }
        }
        Ok(None)
    }

    fn sharing_conflict(
        &self,
        claims: &Claims,
        strategy: &dyn ResolutionStrategy,
        names: &[LibraryName],
    ) -> Option<DomainError> {
        let conflict = |name: &str, claimed_by: &str| DomainError::AmbiguousSharing {
            name: name.to_owned(),
            claimed_by: claimed_by.to_owned(),
        };

        if let Some((name, by)) = names
            .iter()
            .find_map(|name| claims.names.get(name).map(|by| (name, by)))
        {
            return Some(conflict(name.as_str(), by.as_str()));
        }

        let installed = read(&self.strategies).clone();
        for name in names {
            let request = LibraryRequest::new(name.clone());
            if let Some(other) = installed.iter().find(|s| s.can_resolve(&request)) {
                return Some(conflict(name.as_str(), other.name()));
            }
        }

        claims
            .answered
            .iter()
            .find(|(_, (request, _))| strategy.can_resolve(request))
            .map(|(key, (_, by))| conflict(key.as_str(), by.as_str()))
    }

    fn consult_native(&self, name: &LibraryName) -> Result<Option<NativeHandle>, DomainError> {
        let strategies = read(&self.strategies).clone();
        for strategy in &strategies {
            if let Resolution::Handled(native) = strategy.load_native(self, name)? {
                debug!("{}: native {name} resolved by {}", self.domain, strategy.name());
                return Ok(Some(native));
            }
        }
        Ok(None)
    }

    fn share_managed(
        &self,
        parent: &IsolationDomain,
        request: &LibraryRequest,
    ) -> Result<Option<Arc<LoadedLibrary>>, DomainError> {
        let shared = parent.load_library(request)?;
        if let Some(library) = &shared {
            self.emit(LoadRecord::new(
                library.identity(),
                LoadKind::Managed,
                Some(library.location().to_path_buf()),
                self.domain.to_string(),
                LoadOutcome::Shared {
                    from: library.domain().to_string(),
                },
            ));
        }
        Ok(shared)
    }

    fn share_native(
        &self,
        parent: &IsolationDomain,
        name: &LibraryName,
    ) -> Result<Option<NativeHandle>, DomainError> {
        let shared = parent.load_native_library(name)?;
        if let Some(native) = &shared {
            self.emit(LoadRecord::new(
                name.as_str(),
                LoadKind::Native,
                Some(native.location().to_path_buf()),
                self.domain.to_string(),
                LoadOutcome::Shared {
                    from: native.domain().to_string(),
                },
            ));
        }
        Ok(shared)
    }

    fn is_excluded(&self, name: &LibraryName) -> bool {
        read(&self.shared_exclusions).contains(name)
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if *lock(&self.state) == DomainState::TornDown {
            return Err(DomainError::Disposed(self.domain.name.clone()));
        }
        Ok(())
    }

    fn mark_active(&self) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        match *state {
            DomainState::Active => Ok(()),
            DomainState::TornDown => Err(DomainError::Disposed(self.domain.name.clone())),
            current => {
                validate_transition(current, DomainState::Active)?;
                *state = DomainState::Active;
                Ok(())
            }
        }
    }

    fn name_of(path: &Path) -> Result<LibraryName, DomainError> {
        simple_name(path).ok_or_else(|| DomainError::LoadFailed {
            path: path.to_path_buf(),
            reason: "path has no file name".to_owned(),
        })
    }

    fn emit_failure(&self, library: &str, kind: LoadKind, path: &Path, error: &DomainError) {
        self.emit(LoadRecord::new(
            library,
            kind,
            Some(path.to_path_buf()),
            self.domain.to_string(),
            LoadOutcome::Failed {
                reason: error.to_string(),
            },
        ));
    }

    fn emit(&self, record: LoadRecord) {
        match record.outcome {
            LoadOutcome::Failed { .. } => warn!("{record}"),
            _ => debug!("{record}"),
        }
        let observers = read(&self.observers).clone();
        for observer in &observers {
            observer.on_load(&record);
        }
    }
}

impl std::fmt::Debug for IsolationDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationDomain")
            .field("domain", &self.domain)
            .field("policy", &self.policy())
            .field("state", &self.state())
            .field("strategies", &self.strategy_names())
            .finish_non_exhaustive()
    }
}

// Tables only ever grow or are cleared whole, so a poisoned lock still guards
// consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
