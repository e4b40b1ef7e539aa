use crate::manifest::{DependencyManifest, ManifestError};
use crate::paths::simple_name;
use crate::reference::{LibraryReference, ManagedLibraryReference, ResourceReference};
use crate::types::PackageId;
use std::collections::HashMap;

/// Flattened asset lists of the selected runtime target, in declaration order.
///
/// Package roots are already backfilled from the `libraries` section. Duplicate
/// simple names are kept here; picking one is the resolver's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDependencies {
    pub managed: Vec<ManagedLibraryReference>,
    pub native: Vec<LibraryReference>,
    pub resources: Vec<ResourceReference>,
}

impl ComponentDependencies {
    pub fn is_empty(&self) -> bool {
        self.managed.is_empty() && self.native.is_empty() && self.resources.is_empty()
    }
}

impl DependencyManifest {
    /// Flatten the selected target into asset references and attach package roots.
    pub fn normalize(&self) -> Result<ComponentDependencies, ManifestError> {
        let (_, packages) = self.target()?;
        let roots = self.package_roots();
        let mut deps = ComponentDependencies::default();

        for (package, groups) in packages.iter() {
            let root = roots
                .get(&PackageId::new(package).lookup_key())
                .cloned()
                .flatten();

            for (path, _) in groups.runtime.iter() {
                let library = library_reference(package, path, root.as_deref())?;
                let simple_name = simple_name(path).ok_or_else(|| ManifestError::EmptyAssetPath {
                    package: package.to_owned(),
                })?;
                deps.managed.push(ManagedLibraryReference {
                    library,
                    simple_name,
                });
            }

            for (path, _) in groups.native.iter() {
                deps.native
                    .push(library_reference(package, path, root.as_deref())?);
            }

            for (path, asset) in groups.resources.iter() {
                let locale = asset.locale.trim();
                if locale.is_empty() {
                    return Err(ManifestError::EmptyLocale {
                        package: package.to_owned(),
                        path: path.to_owned(),
                    });
                }
                deps.resources.push(ResourceReference {
                    library: library_reference(package, path, root.as_deref())?,
                    locale: locale.to_owned(),
                });
            }
        }

        Ok(deps)
    }

    /// Lower-cased package identity → package root. The first entry wins among
    /// keys that differ only by case.
    fn package_roots(&self) -> HashMap<String, Option<String>> {
        let mut roots = HashMap::with_capacity(self.libraries.len());
        for (package, entry) in self.libraries.iter() {
            let root = entry
                .path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned);
            roots
                .entry(PackageId::new(package).lookup_key())
                .or_insert(root);
        }
        roots
    }
}

fn library_reference(
    package: &str,
    path: &str,
    root: Option<&str>,
) -> Result<LibraryReference, ManifestError> {
    if path.trim().is_empty() {
        return Err(ManifestError::EmptyAssetPath {
            package: package.to_owned(),
        });
    }
    Ok(LibraryReference {
        package: PackageId::new(package),
        relative_path: path.to_owned(),
        package_root: root.map(str::to_owned),
    })
}
