use enclave_core::{
    create_isolation_domain, create_resolver, ComponentHost, CoreError, EnclaveConfig,
    LibraryRequest, LoadPolicy, ResolverConfig, ServiceMode,
};
use enclave_resolver::{ComponentDependencyResolver, ResolverError, StaticDependencyService};
use enclave_runtime::{
    DomainError, IsolationDomain, LoadOutcome, LoadedLibrary, MockLoader, RecordingObserver,
    Resolution, ResolutionStrategy,
};
use enclave_schema::LibraryName;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const NO_EXCLUSIONS: [&str; 0] = [];

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
}

fn resolver_config() -> ResolverConfig {
    ResolverConfig {
        host_entry_binary: Some(PathBuf::from("/nonexistent/entry/Host.dll")),
        ..Default::default()
    }
}

/// A standalone host whose default domain probes `host_dir`.
fn host_with_directory(host_dir: &Path) -> ComponentHost {
    ComponentHost::with_config(EnclaveConfig {
        host_name: "TestHost".to_owned(),
        host_directories: vec![host_dir.to_path_buf()],
        resolver: resolver_config(),
        ..Default::default()
    })
    .unwrap()
}

fn write_manifest(component: &Path, packages: &[(&str, &str, Option<&str>)]) {
    let mut targets = serde_json::Map::new();
    let mut libraries = serde_json::Map::new();
    for (package, runtime, root) in packages {
        targets.insert(
            (*package).to_owned(),
            serde_json::json!({ "runtime": { *runtime: {} } }),
        );
        let mut entry = serde_json::json!({ "type": "package" });
        if let Some(root) = root {
            entry["path"] = serde_json::Value::from(*root);
        }
        libraries.insert((*package).to_owned(), entry);
    }
    let manifest = serde_json::json!({
        "runtimeTarget": { "name": "t" },
        "targets": { "t": targets },
        "libraries": libraries,
    });
    let stem = component.file_stem().unwrap().to_string_lossy();
    fs::write(
        component.with_file_name(format!("{stem}.deps.json")),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
}

/// Counts how often the wrapped resolver is consulted.
struct CountingStrategy {
    inner: Arc<ComponentDependencyResolver>,
    calls: AtomicUsize,
}

impl ResolutionStrategy for CountingStrategy {
    fn name(&self) -> &str {
        "counting"
    }

    fn load_managed(
        &self,
        domain: &IsolationDomain,
        request: &LibraryRequest,
    ) -> Result<Resolution<Arc<LoadedLibrary>>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.load_managed(domain, request)
    }
}

#[test]
fn resolution_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("C.dll");
    touch(&component);
    write_manifest(&component, &[("dep/1.0", "lib/Dep.dll", Some("dep/1.0"))]);
    touch(&dir.path().join("dep/1.0/lib/Dep.dll"));

    let resolver = ComponentDependencyResolver::from_manifest(&component, &resolver_config()).unwrap();
    let first = resolver.resolve_managed_library("Dep", None);
    let second = resolver.resolve_managed_library("Dep", None);
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[test]
fn earlier_probing_path_wins() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugin");
    let probe_a = dir.path().join("probe-a");
    let probe_b = dir.path().join("probe-b");
    let component = plugin_dir.join("C.dll");
    touch(&component);
    write_manifest(&component, &[("dep/1.0", "lib/Dep.dll", Some("dep/1.0"))]);
    fs::write(
        plugin_dir.join("C.runtimeconfig.json"),
        serde_json::json!({
            "runtimeOptions": { "additionalProbingPaths": [probe_a, probe_b] }
        })
        .to_string(),
    )
    .unwrap();
    touch(&probe_a.join("dep/1.0/lib/Dep.dll"));
    touch(&probe_b.join("dep/1.0/lib/Dep.dll"));

    let resolver = ComponentDependencyResolver::from_manifest(&component, &resolver_config()).unwrap();
    assert_eq!(
        resolver.probing_paths().as_slice(),
        &[plugin_dir.clone(), probe_a.clone(), probe_b.clone()]
    );
    assert_eq!(
        resolver.resolve_managed_library("Dep", None),
        Some(probe_a.join("dep/1.0/lib/Dep.dll"))
    );

    fs::remove_file(probe_a.join("dep/1.0/lib/Dep.dll")).unwrap();
    assert_eq!(
        resolver.resolve_managed_library("Dep", None),
        Some(probe_b.join("dep/1.0/lib/Dep.dll"))
    );
}

#[test]
fn missing_manifest_resolves_only_component_directory() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("C.dll");
    touch(&component);
    touch(&dir.path().join("Neighbour.dll"));
    touch(&dir.path().join("nested/Hidden.dll"));

    let resolver = create_resolver(&component).unwrap();
    assert!(resolver.is_self_describing());
    assert_eq!(
        resolver.resolve_managed_library("Neighbour", None),
        Some(dir.path().join("Neighbour.dll"))
    );
    assert_eq!(resolver.resolve_managed_library("Hidden", None), None);
    assert_eq!(resolver.resolve_managed_library("Absent", None), None);
}

#[test]
fn full_isolation_never_returns_foreign_instances() {
    let dir = tempfile::tempdir().unwrap();
    let host_dir = dir.path().join("host");
    touch(&host_dir.join("Shared.dll"));
    let host = host_with_directory(&host_dir);
    let host_copy = host
        .host()
        .load_library(&LibraryRequest::new("Shared"))
        .unwrap()
        .unwrap();

    let mut domains = Vec::new();
    for name in ["One", "Two"] {
        let component = dir.path().join(name).join(format!("{name}.dll"));
        touch(&component);
        touch(&component.with_file_name("Shared.dll"));
        let resolver = host.create_resolver(&component).unwrap();
        domains.push(
            host.create_isolation_domain(LoadPolicy::FullyIsolated, resolver, NO_EXCLUSIONS)
                .unwrap(),
        );
    }

    let one = domains[0].load_entry_library("Shared").unwrap().unwrap();
    let two = domains[1].load_entry_library("Shared").unwrap().unwrap();
    assert!(!Arc::ptr_eq(&one, &host_copy));
    assert!(!Arc::ptr_eq(&two, &host_copy));
    assert!(!Arc::ptr_eq(&one, &two));
    assert_eq!(one.domain(), domains[0].isolation_domain().domain_ref());
    assert_eq!(two.domain(), domains[1].isolation_domain().domain_ref());
    assert_eq!(one.location(), dir.path().join("One/Shared.dll"));
}

#[test]
fn shared_exclusion_aliases_host_instance() {
    let dir = tempfile::tempdir().unwrap();
    let host_dir = dir.path().join("host");
    touch(&host_dir.join("Contracts.dll"));
    let host = host_with_directory(&host_dir);
    let host_copy = host
        .host()
        .load_library(&LibraryRequest::new("Contracts"))
        .unwrap()
        .unwrap();

    let component = dir.path().join("plugin/Plugin.dll");
    touch(&component);
    touch(&component.with_file_name("Contracts.dll"));
    let resolver = host.create_resolver(&component).unwrap();
    let domain = host
        .create_isolation_domain(LoadPolicy::FullyIsolated, resolver, ["Contracts"])
        .unwrap();

    let shared = domain.load_entry_library("Contracts").unwrap().unwrap();
    assert!(Arc::ptr_eq(&shared, &host_copy));
    let own = domain.load_entry_library("Plugin").unwrap().unwrap();
    assert_eq!(own.domain(), domain.isolation_domain().domain_ref());
}

#[test]
fn prefer_parent_skips_resolver_for_host_names() {
    let dir = tempfile::tempdir().unwrap();
    let host_dir = dir.path().join("host");
    touch(&host_dir.join("Framework.dll"));
    let host = host_with_directory(&host_dir);

    let component = dir.path().join("plugin/Plugin.dll");
    touch(&component);
    touch(&component.with_file_name("Framework.dll"));
    touch(&component.with_file_name("Private.dll"));
    let counting = Arc::new(CountingStrategy {
        inner: Arc::new(host.create_resolver(&component).unwrap()),
        calls: AtomicUsize::new(0),
    });
    let domain = IsolationDomain::new("Plugin", LoadPolicy::PreferParent, host.host()).unwrap();
    let strategy: Arc<dyn ResolutionStrategy> = counting.clone();
    domain.bind(vec![strategy], Vec::new()).unwrap();

    let framework = domain
        .load_library(&LibraryRequest::new("Framework"))
        .unwrap()
        .unwrap();
    assert_eq!(framework.domain(), host.host().domain_ref());
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

    let private = domain
        .load_library(&LibraryRequest::new("Private"))
        .unwrap()
        .unwrap();
    assert_eq!(private.domain(), domain.domain_ref());
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn culture_lookup_uses_resource_paths_only() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("C.dll");
    touch(&component);
    write_manifest(&component, &[("strings/1.0", "lib/Strings.dll", Some("strings/1.0"))]);
    touch(&dir.path().join("strings/1.0/lib/Strings.dll"));

    let host = host_with_directory(&dir.path().join("empty-host"));
    let resolver = host.create_resolver(&component).unwrap();
    assert_eq!(resolver.resolve_managed_library("Strings", Some("fr")), None);

    touch(&dir.path().join("fr/Strings.dll"));
    assert_eq!(
        resolver.resolve_managed_library("Strings", Some("fr")),
        Some(dir.path().join("fr/Strings.dll"))
    );

    let domain = host
        .create_isolation_domain(LoadPolicy::FullyIsolated, resolver, NO_EXCLUSIONS)
        .unwrap();
    let neutral = domain.load_entry_library("Strings").unwrap().unwrap();
    let french = domain.load_localized_library("Strings", "fr").unwrap().unwrap();
    assert!(!Arc::ptr_eq(&neutral, &french));
    assert_eq!(french.culture(), Some("fr"));
    assert!(domain.load_localized_library("Strings", "de").unwrap().is_none());
}

#[test]
fn teardown_fails_every_later_request() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("plugin/Plugin.dll");
    touch(&component);
    let host = host_with_directory(&dir.path().join("host"));
    let resolver = host.create_resolver(&component).unwrap();
    let domain = host
        .create_isolation_domain(LoadPolicy::FullyIsolated, resolver, NO_EXCLUSIONS)
        .unwrap();
    let held = domain.load_entry_library("Plugin").unwrap().unwrap();

    domain.teardown().unwrap();
    for name in ["Plugin", "NeverExisted"] {
        assert!(matches!(
            domain.load_entry_library(name),
            Err(CoreError::Domain(DomainError::Disposed(_)))
        ));
    }
    assert!(matches!(
        domain.load_native_library("anything"),
        Err(CoreError::Domain(DomainError::Disposed(_)))
    ));
    assert!(matches!(
        domain.teardown(),
        Err(CoreError::Domain(DomainError::Disposed(_)))
    ));
    assert_eq!(held.location(), component);
}

#[test]
fn package_root_scenario_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let c_dir = dir.path().join("C");
    let component = c_dir.join("C.bin");
    touch(&component);
    write_manifest(&component, &[("pkg-d", "libs/D.bin", Some("lib/pkg-d/1.0"))]);

    let host = ComponentHost::with_config(EnclaveConfig {
        resolver: ResolverConfig {
            managed_extension: "bin".to_owned(),
            ..resolver_config()
        },
        ..Default::default()
    })
    .unwrap();
    let resolver = host.create_resolver(&component).unwrap();
    assert_eq!(resolver.probing_paths().as_slice(), &[c_dir.clone()]);
    assert_eq!(resolver.resolve_managed_library("D", None), None);

    let domain = host
        .create_isolation_domain(LoadPolicy::FullyIsolated, resolver, NO_EXCLUSIONS)
        .unwrap();
    assert!(domain.load_entry_library("D").unwrap().is_none());

    let expected = c_dir.join("lib/pkg-d/1.0/libs/D.bin");
    touch(&expected);
    assert_eq!(
        domain.resolver().resolve_managed_library("D", None),
        Some(expected.clone())
    );
    let d = domain.load_entry_library("D").unwrap().unwrap();
    assert_eq!(d.location(), expected);
    assert_eq!(d.digest().len(), 64);
}

#[test]
fn shared_injection_lands_in_host_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let host = host_with_directory(&dir.path().join("host"));

    let first = dir.path().join("first/First.dll");
    touch(&first);
    touch(&first.with_file_name("Common.dll"));
    let injected = host
        .create_isolation_domain(
            LoadPolicy::SharedInjection,
            host.create_resolver(&first).unwrap(),
            NO_EXCLUSIONS,
        )
        .unwrap();
    assert!(injected.isolation_domain().is_host());

    let common = injected.load_entry_library("Common").unwrap().unwrap();
    assert_eq!(common.domain(), host.host().domain_ref());
    let via_host = host
        .host()
        .load_library(&LibraryRequest::new("Common"))
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&common, &via_host));

    let second = dir.path().join("second/Second.dll");
    touch(&second);
    write_manifest(&second, &[("first/1.0", "First.dll", None)]);
    let err = host
        .create_isolation_domain(
            LoadPolicy::SharedInjection,
            host.create_resolver(&second).unwrap(),
            NO_EXCLUSIONS,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Domain(DomainError::AmbiguousSharing { ref name, .. }) if name == "First"
    ));

    assert!(matches!(
        injected.teardown(),
        Err(CoreError::Domain(DomainError::HostTeardown(_)))
    ));
}

#[test]
fn injected_components_cannot_share_a_local_library() {
    let dir = tempfile::tempdir().unwrap();
    let host = host_with_directory(&dir.path().join("host"));

    let a = dir.path().join("a/A.dll");
    touch(&a);
    touch(&a.with_file_name("Common.dll"));
    let b = dir.path().join("b/B.dll");
    touch(&b);
    touch(&b.with_file_name("Common.dll"));

    let injected = host
        .create_isolation_domain(
            LoadPolicy::SharedInjection,
            host.create_resolver(&a).unwrap(),
            NO_EXCLUSIONS,
        )
        .unwrap();
    assert_eq!(
        host.host().claims().get("Common").map(String::as_str),
        Some("component:A")
    );

    let err = host
        .create_isolation_domain(
            LoadPolicy::SharedInjection,
            host.create_resolver(&b).unwrap(),
            NO_EXCLUSIONS,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Domain(DomainError::AmbiguousSharing { ref name, ref claimed_by })
            if name == "Common" && claimed_by == "component:A"
    ));
    assert!(!host.host().claims().contains_key("B"));

    let common = injected.load_entry_library("Common").unwrap().unwrap();
    assert_eq!(common.location(), dir.path().join("a/Common.dll"));
}

#[test]
fn injected_component_cannot_answer_resolved_satellite() {
    let dir = tempfile::tempdir().unwrap();
    let host = host_with_directory(&dir.path().join("host"));

    let a = dir.path().join("a/A.dll");
    touch(&a);
    touch(&a.with_file_name("fr/Strings.dll"));
    let injected = host
        .create_isolation_domain(
            LoadPolicy::SharedInjection,
            host.create_resolver(&a).unwrap(),
            NO_EXCLUSIONS,
        )
        .unwrap();
    let french = injected
        .load_localized_library("Strings", "fr")
        .unwrap()
        .unwrap();
    assert_eq!(french.domain(), host.host().domain_ref());

    let c = dir.path().join("c/C.dll");
    touch(&c);
    touch(&c.with_file_name("fr/Strings.dll"));
    let err = host
        .create_isolation_domain(
            LoadPolicy::SharedInjection,
            host.create_resolver(&c).unwrap(),
            NO_EXCLUSIONS,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Domain(DomainError::AmbiguousSharing { ref name, .. }) if name == "fr/Strings"
    ));
}

#[test]
fn load_component_follows_references_through_policy() {
    let dir = tempfile::tempdir().unwrap();
    let host_dir = dir.path().join("host");
    touch(&host_dir.join("Logging.dll"));
    let loader = MockLoader::new()
        .with_references("Plugin", &["Logging", "Helpers", "Missing"])
        .with_references("Helpers", &["Plugin"]);
    let host_domain = IsolationDomain::host("MockHost", Arc::new(loader));
    host_domain
        .inject(Arc::new(enclave_runtime::DirectoryStrategy::new(
            "host-dir",
            vec![host_dir.clone()],
        )))
        .unwrap();
    let host = ComponentHost::with_host(
        host_domain,
        EnclaveConfig {
            resolver: resolver_config(),
            ..Default::default()
        },
    )
    .unwrap();
    let observer = Arc::new(RecordingObserver::new());
    host.add_observer(observer.clone());

    let component = dir.path().join("plugin/Plugin.dll");
    touch(&component);
    touch(&component.with_file_name("Helpers.dll"));
    touch(&component.with_file_name("Logging.dll"));

    let loaded = host
        .load_component(&component, LoadPolicy::FullyIsolated, ["Logging"])
        .unwrap();
    let domain = loaded.domain.isolation_domain();

    let logging = domain.find_loaded(&LibraryRequest::new("Logging")).unwrap();
    assert_eq!(logging.domain(), host.host().domain_ref());
    let helpers = domain.find_loaded(&LibraryRequest::new("Helpers")).unwrap();
    assert_eq!(helpers.domain(), domain.domain_ref());
    assert!(domain.find_loaded(&LibraryRequest::new("Missing")).is_none());

    let again = loaded.domain.load_entry_library("Plugin").unwrap().unwrap();
    assert!(Arc::ptr_eq(&again, &loaded.library));

    assert!(observer.count(&LoadOutcome::Materialized) >= 2);
    assert!(observer
        .records()
        .iter()
        .any(|r| matches!(r.outcome, LoadOutcome::Shared { .. }) && r.library.starts_with("Logging@")));
    assert!(observer
        .records()
        .iter()
        .any(|r| r.outcome == LoadOutcome::NotFound && r.library == "Missing"));
}

#[test]
fn service_mode_uses_service_answer() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("svc/Svc.dll");
    touch(&component);
    let elsewhere = dir.path().join("elsewhere/Dep.dll");
    touch(&elsewhere);

    let service = StaticDependencyService::from_paths(
        &[component.clone(), elsewhere.clone()],
        &[dir.path().join("native")],
        &[],
    )
    .unwrap();
    let host = ComponentHost::with_config(EnclaveConfig {
        loader: "mock".to_owned(),
        resolver: resolver_config(),
        ..Default::default()
    })
    .unwrap()
    .with_dependency_service(Arc::new(service), ServiceMode::Replace);

    let resolver = host.create_resolver(&component).unwrap();
    assert!(!resolver.is_self_describing());
    let domain = host
        .create_isolation_domain(LoadPolicy::PreferParent, resolver, NO_EXCLUSIONS)
        .unwrap();
    let dep = domain.load_entry_library("Dep").unwrap().unwrap();
    assert_eq!(dep.location(), elsewhere);
}

#[test]
fn failing_service_aborts_resolver_construction() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("C.dll");
    touch(&component);
    let host = host_with_directory(&dir.path().join("host"))
        .with_dependency_service(Arc::new(StaticDependencyService::failing(3)), ServiceMode::Supplement);

    assert!(matches!(
        host.create_resolver(&component),
        Err(CoreError::Resolver(ResolverError::DependencyService { status: 3, .. }))
    ));
}

#[test]
fn malformed_manifest_aborts_resolver_construction() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("Broken.dll");
    touch(&component);
    fs::write(dir.path().join("Broken.deps.json"), r#"{ "targets": 42 }"#).unwrap();

    let err = create_resolver(&component).unwrap_err();
    assert!(matches!(err, CoreError::Resolver(ResolverError::Manifest { .. })));
    assert!(err.to_string().contains("Broken.dll"));
}

#[test]
fn process_default_api_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let component = dir.path().join("ProcessWidePlugin.dll");
    touch(&component);

    let resolver = create_resolver(&component).unwrap();
    let domain = create_isolation_domain(
        LoadPolicy::FullyIsolated,
        resolver,
        [LibraryName::new("System.Private.CoreLib")],
    )
    .unwrap();
    let entry = domain
        .load_entry_library("ProcessWidePlugin")
        .unwrap()
        .unwrap();
    assert_eq!(entry.location(), component);
    assert_eq!(
        domain.isolation_domain().parent().unwrap().name(),
        enclave_runtime::DEFAULT_DOMAIN_NAME
    );
    domain.teardown().unwrap();
}
