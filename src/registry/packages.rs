//! Declared packages and their installed-metadata projection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::metadata::MetadataSource;
use crate::parser::{
    canonicalize_name, pyproject, requirements_txt, setup_cfg, EnvironmentMarker,
    MarkerEnvironment, ParseResult, PyProject, Requirement,
};

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Name as first declared.
    pub declared_name: String,
    /// PEP 503 normalized name; the identity of the record.
    pub normalized_name: String,
    pub is_installed: bool,
    pub version: Option<String>,
    pub provided_modules: BTreeSet<String>,
    /// Names this package plugs into through entry-point groups.
    pub extends: BTreeSet<String>,
    pub executables: BTreeSet<String>,
    #[serde(serialize_with = "serialize_markers")]
    pub environment_markers: Vec<EnvironmentMarker>,
    /// At least one declaration carried no environment marker.
    pub declared_unconditionally: bool,
    pub is_user_ignored: bool,
}

fn serialize_markers<S>(markers: &[EnvironmentMarker], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(markers.iter().map(ToString::to_string))
}

impl Package {
    fn not_installed(declared_name: &str, normalized_name: String) -> Self {
        Self {
            declared_name: declared_name.to_string(),
            normalized_name,
            is_installed: false,
            version: None,
            provided_modules: BTreeSet::new(),
            extends: BTreeSet::new(),
            executables: BTreeSet::new(),
            environment_markers: Vec::new(),
            declared_unconditionally: false,
            is_user_ignored: false,
        }
    }

    /// Returns true if importing `module` counts as using this package.
    ///
    /// Without installed metadata the module name itself is compared, so
    /// `typing_extensions` still belongs to `typing-extensions`.
    pub fn provides(&self, module: &str) -> bool {
        self.provided_modules.contains(module) || canonicalize_name(module) == self.normalized_name
    }

    /// Returns true if every declaration is guarded by a marker that is
    /// false in `env`.
    pub fn is_marker_excluded(&self, env: &MarkerEnvironment) -> bool {
        !self.declared_unconditionally
            && !self.environment_markers.is_empty()
            && !self.environment_markers.iter().any(|m| m.evaluate(env))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.declared_name, version),
            None => write!(f, "{}", self.declared_name),
        }
    }
}

/// Table of declared packages keyed by normalized name.
///
/// Every intake path funnels through [`PackageTable::resolve`], so declaring
/// `PyYAML`, `pyyaml` and `py_yaml` in different places yields one record.
///
/// # Example
///
/// ```
/// use bonded::metadata::{Distribution, StaticMetadata};
/// use bonded::registry::PackageTable;
///
/// let metadata = StaticMetadata::new()
///     .with(Distribution::new("PyYAML").with_modules(["yaml"]));
/// let mut packages = PackageTable::new(Box::new(metadata));
///
/// packages.add_declared(["PyYAML>=6", "py.yaml", "missing-pkg"]).unwrap();
///
/// assert_eq!(packages.len(), 2);
/// assert!(packages.get("pyyaml").unwrap().provides("yaml"));
/// assert!(!packages.get("missing_pkg").unwrap().is_installed);
/// ```
pub struct PackageTable {
    metadata: Box<dyn MetadataSource>,
    packages: BTreeMap<String, Package>,
}

impl fmt::Debug for PackageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageTable")
            .field("packages", &self.packages)
            .finish_non_exhaustive()
    }
}

impl PackageTable {
    pub fn new(metadata: Box<dyn MetadataSource>) -> Self {
        Self {
            metadata,
            packages: BTreeMap::new(),
        }
    }

    /// Returns the record for `name`, building it from installed metadata on
    /// first use. Never fails: without metadata the package is marked as not
    /// installed.
    pub fn resolve(&mut self, name: &str) -> &mut Package {
        let normalized = canonicalize_name(name);
        let metadata = &self.metadata;
        self.packages.entry(normalized.clone()).or_insert_with(|| {
            match metadata.distribution(&normalized) {
                Some(dist) => {
                    debug!(
                        "Resolved {} to {} ({} modules)",
                        name,
                        dist.name,
                        dist.modules.len()
                    );
                    Package {
                        declared_name: name.to_string(),
                        is_installed: true,
                        extends: dist.extends(),
                        executables: dist.executables(),
                        version: dist.version,
                        provided_modules: dist.modules,
                        ..Package::not_installed(name, normalized.clone())
                    }
                }
                None => {
                    debug!("No installed metadata for {}", name);
                    Package::not_installed(name, normalized.clone())
                }
            }
        })
    }

    /// Records one parsed declaration.
    pub fn add_requirement(&mut self, requirement: &Requirement) -> &mut Package {
        let package = self.resolve(&requirement.name);
        match &requirement.marker {
            Some(marker) => {
                if !package.environment_markers.contains(marker) {
                    package.environment_markers.push(marker.clone());
                }
            }
            None => package.declared_unconditionally = true,
        }
        package
    }

    /// Declares packages given directly by the user.
    pub fn add_declared<I, S>(&mut self, specs: I) -> ParseResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in specs {
            let requirement = Requirement::parse(spec.as_ref())?;
            self.add_requirement(&requirement);
        }
        Ok(())
    }

    /// Declares every dependency of an already parsed `pyproject.toml`.
    pub fn add_pyproject(&mut self, pyproject: &PyProject) {
        self.add_lenient(pyproject.requirement_specs(), "pyproject.toml");
    }

    /// Reads a `pyproject.toml` and declares its dependencies.
    pub fn update_from_pyproject(&mut self, path: &Path) -> ParseResult<PyProject> {
        let pyproject = pyproject::parse_file(path)?;
        self.add_pyproject(&pyproject);
        Ok(pyproject)
    }

    /// Reads a `setup.cfg` and declares its dependencies.
    pub fn update_from_setup_cfg(&mut self, path: &Path) -> ParseResult<()> {
        let specs = setup_cfg::parse_file(path)?;
        self.add_lenient(&specs, "setup.cfg");
        Ok(())
    }

    /// Reads a pip requirements file, following its includes.
    pub fn update_from_pip_requirements(&mut self, path: &Path) -> ParseResult<()> {
        let specs = requirements_txt::read_requirements(path)?;
        self.add_lenient(&specs, &path.display().to_string());
        Ok(())
    }

    /// Declares specifiers from a manifest, skipping the ones that do not parse.
    fn add_lenient<I, S>(&mut self, specs: I, origin: &str)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in specs {
            match Requirement::parse(spec.as_ref()) {
                Ok(requirement) => {
                    self.add_requirement(&requirement);
                }
                Err(err) => warn!("Skipping dependency in {}: {}", origin, err),
            }
        }
    }

    /// Looks up a package by any spelling of its name.
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(&canonicalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        self.packages.values_mut()
    }

    /// Marks packages the user asked to ignore. Unknown names are ignored.
    pub fn mark_ignored<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            if let Some(package) = self.packages.get_mut(&canonicalize_name(name.as_ref())) {
                package.is_user_ignored = true;
            }
        }
    }

    /// Every module provided by some declared package.
    pub fn provided_modules(&self) -> BTreeSet<&str> {
        self.packages
            .values()
            .flat_map(|p| p.provided_modules.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::metadata::{Distribution, StaticMetadata};

    fn metadata() -> Box<StaticMetadata> {
        Box::new(
            StaticMetadata::new()
                .with(
                    Distribution::new("PyYAML")
                        .with_version("6.0")
                        .with_modules(["yaml", "_yaml"]),
                )
                .with(
                    Distribution::new("black")
                        .with_modules(["black", "blackd"])
                        .with_entry_point("console_scripts", "black", "black:main"),
                )
                .with(
                    Distribution::new("pytest-cov")
                        .with_modules(["pytest_cov"])
                        .with_entry_point("pytest11", "pytest_cov", "pytest_cov.plugin"),
                ),
        )
    }

    #[test]
    fn test_resolve_installed() {
        let mut table = PackageTable::new(metadata());
        let black = table.resolve("Black");
        assert!(black.is_installed);
        assert_eq!(black.declared_name, "Black");
        assert!(black.executables.contains("black"));
        assert!(black.extends.is_empty());

        let cov = table.resolve("pytest_cov");
        assert!(cov.extends.contains("pytest11"));
    }

    #[test]
    fn test_resolve_not_installed() {
        let mut table = PackageTable::new(metadata());
        let missing = table.resolve("does-not-exist");
        assert!(!missing.is_installed);
        assert!(missing.provided_modules.is_empty());
        assert!(missing.provides("does-not-exist"));
    }

    #[test]
    fn test_idempotent_across_spellings_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let reqs = dir.path().join("requirements.txt");
        fs::write(&reqs, "py_yaml\n").unwrap();
        let toml = dir.path().join("pyproject.toml");
        fs::write(&toml, "[project]\ndependencies = [\"Py.Yaml>=5\"]\n").unwrap();

        let mut table = PackageTable::new(metadata());
        table.add_declared(["PyYAML"]).unwrap();
        table.update_from_pip_requirements(&reqs).unwrap();
        table.update_from_pyproject(&toml).unwrap();

        assert_eq!(table.len(), 1);
        let pkg = table.get("pyyaml").unwrap();
        assert_eq!(pkg.declared_name, "PyYAML");
        assert!(std::ptr::eq(pkg, table.get("PY-yaml").unwrap()));
    }

    #[test]
    fn test_markers_are_accumulated() {
        let mut table = PackageTable::new(metadata());
        table
            .add_declared(["black; sys_platform == 'win32'"])
            .unwrap();
        let black = table.get("black").unwrap();
        assert!(!black.declared_unconditionally);
        assert_eq!(black.environment_markers.len(), 1);

        let mut linux = MarkerEnvironment::for_host("3.12");
        linux.sys_platform = "linux".to_string();
        assert!(black.is_marker_excluded(&linux));

        let mut windows = linux.clone();
        windows.sys_platform = "win32".to_string();
        assert!(!black.is_marker_excluded(&windows));

        table.add_declared(["black"]).unwrap();
        assert!(!table.get("black").unwrap().is_marker_excluded(&linux));
    }

    #[test]
    fn test_add_declared_rejects_garbage() {
        let mut table = PackageTable::new(metadata());
        assert!(table.add_declared(["!!!"]).is_err());
    }

    #[test]
    fn test_setup_cfg_intake() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.cfg");
        fs::write(
            &path,
            "[options]\ninstall_requires =\n    black\n[options.extras_require]\ntest = pytest-cov\n",
        )
        .unwrap();

        let mut table = PackageTable::new(metadata());
        table.update_from_setup_cfg(&path).unwrap();
        assert!(table.contains("black"));
        assert!(table.contains("pytest-cov"));
    }

    #[test]
    fn test_mark_ignored() {
        let mut table = PackageTable::new(metadata());
        table.add_declared(["black"]).unwrap();
        table.mark_ignored(["Black", "unknown"]);
        assert!(table.get("black").unwrap().is_user_ignored);
        assert_eq!(table.len(), 1);
    }
}
