//! Reconciliation of import evidence with declared packages.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use super::Confidence;
use crate::analysis::ExecutableInspection;
use crate::graph::ExtensionGraph;
use crate::parser::{canonicalize_name, MarkerEnvironment};
use crate::registry::{Module, ModuleRegistry, Package, PackageTable};

/// Entry-point group pytest loads plugins from.
pub const PYTEST_PLUGIN_GROUP: &str = "pytest11";

/// Which kind of evidence decided a package verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Usage {
    Import,
    Extension,
    Executable,
    Override,
    Skipped,
    NotInstalled,
    Unused,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Usage::Import => "import",
            Usage::Extension => "extension",
            Usage::Executable => "executable",
            Usage::Override => "override",
            Usage::Skipped => "skipped",
            Usage::NotInstalled => "not installed",
            Usage::Unused => "unused",
        };
        write!(f, "{name}")
    }
}

/// Verdict for one registered module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleVerdict {
    pub confidence: Confidence,
    /// The module is imported or is the build backend.
    pub has_evidence: bool,
    /// Normalized names of the declared packages providing the module.
    pub owners: BTreeSet<String>,
}

impl ModuleVerdict {
    /// Used by the project without any declared package backing it.
    pub fn is_broken(&self) -> bool {
        self.has_evidence && !self.confidence.passes()
    }
}

/// Per-kind usage confidence of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PackageEvidence {
    pub module: Confidence,
    pub extension: Confidence,
    pub executable: Confidence,
    pub override_rule: Confidence,
}

impl PackageEvidence {
    fn best(&self) -> (Confidence, Usage) {
        [
            (self.module, Usage::Import),
            (self.extension, Usage::Extension),
            (self.executable, Usage::Executable),
            (self.override_rule, Usage::Override),
        ]
        .into_iter()
        .filter(|(confidence, _)| confidence.passes())
        // first strongest wins on ties
        .fold((Confidence::None, Usage::Unused), |best, candidate| {
            if candidate.0 > best.0 {
                candidate
            } else {
                best
            }
        })
    }
}

/// Verdict for one declared package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVerdict {
    pub confidence: Confidence,
    pub usage: Usage,
    pub evidence: PackageEvidence,
    pub is_installed: bool,
}

impl PackageVerdict {
    pub fn passes(&self) -> bool {
        self.confidence.passes()
    }
}

/// Snapshot of every verdict produced by one evaluation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Verdicts {
    pub modules: BTreeMap<String, ModuleVerdict>,
    /// Keyed by normalized package name.
    pub packages: BTreeMap<String, PackageVerdict>,
    /// Fixed-point iterations performed, across override restarts.
    pub rounds: usize,
    /// Groups of packages extending each other in a loop.
    pub extension_cycles: Vec<Vec<String>>,
}

impl Verdicts {
    pub fn module(&self, name: &str) -> Confidence {
        self.modules
            .get(name)
            .map(|v| v.confidence)
            .unwrap_or_default()
    }

    /// Confidence of a package, looked up by any spelling of its name.
    pub fn package(&self, name: &str) -> Confidence {
        self.packages
            .get(&canonicalize_name(name))
            .map(|v| v.confidence)
            .unwrap_or_default()
    }

    /// Modules the project uses that no declared package provides.
    pub fn module_report(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|(_, verdict)| verdict.is_broken())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Declared packages with no evidence of use.
    pub fn package_report(&self) -> Vec<&str> {
        self.packages
            .iter()
            .filter(|(_, verdict)| !verdict.passes())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn passes(&self) -> bool {
        self.module_report().is_empty() && self.package_report().is_empty()
    }

    fn passing_packages(&self) -> usize {
        self.packages.values().filter(|v| v.passes()).count()
    }
}

/// Evaluation of the bonds between a project's modules and its packages.
///
/// # Example
///
/// ```
/// use bonded::evaluation::{Confidence, Evaluation};
/// use bonded::metadata::{Distribution, StaticMetadata};
/// use bonded::registry::{ModuleRegistry, PackageTable};
///
/// let metadata = StaticMetadata::new()
///     .with(Distribution::new("requests").with_modules(["requests"]))
///     .with(Distribution::new("black").with_modules(["black"]));
/// let mut packages = PackageTable::new(Box::new(metadata));
/// packages.add_declared(["requests", "black"]).unwrap();
///
/// let mut modules = ModuleRegistry::new();
/// modules.entry("requests").found_via_static_statement = true;
///
/// let verdicts = Evaluation::new(&modules, &packages).run();
/// assert_eq!(verdicts.package("requests"), Confidence::VeryHigh);
/// assert_eq!(verdicts.package_report(), vec!["black"]);
/// assert!(!verdicts.passes());
/// ```
#[derive(Debug)]
pub struct Evaluation<'a> {
    modules: &'a ModuleRegistry,
    packages: &'a PackageTable,
    executables: Option<&'a ExecutableInspection>,
    environment: MarkerEnvironment,
}

impl<'a> Evaluation<'a> {
    pub fn new(modules: &'a ModuleRegistry, packages: &'a PackageTable) -> Self {
        Self {
            modules,
            packages,
            executables: None,
            environment: MarkerEnvironment::default(),
        }
    }

    pub fn with_executables(mut self, executables: &'a ExecutableInspection) -> Self {
        self.executables = Some(executables);
        self
    }

    pub fn with_environment(mut self, environment: MarkerEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Confidence that `module` is legitimately used.
    pub fn evaluate_module(&self, module: &Module) -> Confidence {
        if module.is_skipped() {
            return Confidence::Skipped;
        }
        if !self.packages.iter().any(|p| p.provides(&module.name)) {
            return Confidence::None;
        }
        evidence_confidence(module)
    }

    fn module_usage(&self, package: &Package) -> Confidence {
        self.modules
            .iter()
            .filter(|m| package.provides(&m.name))
            .map(evidence_confidence)
            .max()
            .unwrap_or_default()
    }

    fn executable_usage(&self, package: &Package) -> Confidence {
        let Some(executables) = self.executables else {
            return Confidence::None;
        };
        if package.executables.iter().any(|e| executables.is_used(e)) {
            Confidence::Medium
        } else {
            Confidence::None
        }
    }

    fn override_usage(&self, package: &Package, current: &Verdicts) -> Confidence {
        // wheel only extends distutils, which setuptools stands in for
        if package.normalized_name == "wheel"
            && self
                .modules
                .get("setuptools")
                .is_some_and(Module::has_evidence)
        {
            return Confidence::High;
        }
        if package.extends.contains(PYTEST_PLUGIN_GROUP) && current.package("pytest").passes() {
            return Confidence::High;
        }
        Confidence::None
    }

    fn package_verdict(&self, package: &Package, evidence: PackageEvidence) -> PackageVerdict {
        let (confidence, usage) = if package.is_user_ignored
            || package.is_marker_excluded(&self.environment)
        {
            (Confidence::Skipped, Usage::Skipped)
        } else if !package.is_installed {
            (Confidence::None, Usage::NotInstalled)
        } else {
            evidence.best()
        };
        PackageVerdict {
            confidence,
            usage,
            evidence,
            is_installed: package.is_installed,
        }
    }

    fn package_verdicts(&self, evidence: &BTreeMap<String, PackageEvidence>) -> BTreeMap<String, PackageVerdict> {
        self.packages
            .iter()
            .map(|package| {
                let found = evidence
                    .get(&package.normalized_name)
                    .copied()
                    .unwrap_or_default();
                (
                    package.normalized_name.clone(),
                    self.package_verdict(package, found),
                )
            })
            .collect()
    }

    /// Runs the extension fixed point and the override rules to completion.
    pub fn run(&self) -> Verdicts {
        let graph = ExtensionGraph::from_packages(self.packages);

        let modules: BTreeMap<String, ModuleVerdict> = self
            .modules
            .iter()
            .map(|module| {
                let owners = self
                    .packages
                    .iter()
                    .filter(|p| p.provides(&module.name))
                    .map(|p| p.normalized_name.clone())
                    .collect();
                let verdict = ModuleVerdict {
                    confidence: self.evaluate_module(module),
                    has_evidence: module.has_evidence(),
                    owners,
                };
                (module.name.clone(), verdict)
            })
            .collect();

        let mut evidence: BTreeMap<String, PackageEvidence> = self
            .packages
            .iter()
            .map(|package| {
                let found = PackageEvidence {
                    module: self.module_usage(package),
                    executable: self.executable_usage(package),
                    ..PackageEvidence::default()
                };
                (package.normalized_name.clone(), found)
            })
            .collect();

        let mut verdicts = Verdicts {
            packages: self.package_verdicts(&evidence),
            modules,
            rounds: 0,
            extension_cycles: graph.detect_cycles(),
        };

        loop {
            // extension usage can only grow, so the passing count is bounded
            loop {
                for package in self.packages.iter() {
                    let name = package.normalized_name.as_str();
                    let extension = graph
                        .targets(name)
                        .into_iter()
                        .filter(|target| *target != name)
                        .map(|target| verdicts.module(target).max(verdicts.package(target)))
                        .max()
                        .unwrap_or_default();
                    if let Some(found) = evidence.get_mut(name) {
                        found.extension = extension;
                    }
                }

                let passing_before = verdicts.passing_packages();
                verdicts.packages = self.package_verdicts(&evidence);
                verdicts.rounds += 1;
                debug!(
                    "Round {}: {} of {} packages used",
                    verdicts.rounds,
                    verdicts.passing_packages(),
                    verdicts.packages.len()
                );
                if verdicts.passing_packages() == passing_before {
                    break;
                }
            }

            let mut flipped = false;
            for package in self.packages.iter() {
                let rule = self.override_usage(package, &verdicts);
                let Some(found) = evidence.get_mut(&package.normalized_name) else {
                    continue;
                };
                if rule > found.override_rule {
                    found.override_rule = rule;
                    let was_passing = verdicts
                        .packages
                        .get(&package.normalized_name)
                        .is_some_and(PackageVerdict::passes);
                    if !was_passing && rule.passes() {
                        debug!("Package {} is used by override", package.normalized_name);
                        flipped = true;
                    }
                }
            }
            verdicts.packages = self.package_verdicts(&evidence);
            if !flipped {
                break;
            }
        }

        info!(
            "Evaluated {} modules and {} packages in {} rounds",
            verdicts.modules.len(),
            verdicts.packages.len(),
            verdicts.rounds
        );
        verdicts
    }
}

/// Confidence from a module's own evidence, ignoring whether it is skipped.
fn evidence_confidence(module: &Module) -> Confidence {
    let mut confidence = Confidence::None;
    if module.found_via_static_statement {
        confidence = confidence.max(Confidence::VeryHigh);
    }
    if module.found_via_dynamic_call || module.found_as_build_backend {
        confidence = confidence.max(Confidence::High);
    }
    confidence
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::metadata::{Distribution, StaticMetadata};

    fn table(metadata: StaticMetadata, declared: &[&str]) -> PackageTable {
        let mut packages = PackageTable::new(Box::new(metadata));
        packages.add_declared(declared).unwrap();
        packages
    }

    fn imports(names: &[&str]) -> ModuleRegistry {
        let mut modules = ModuleRegistry::new();
        for name in names {
            modules.entry(name).found_via_static_statement = true;
        }
        modules
    }

    fn pkg(name: &str) -> Distribution {
        Distribution::new(name).with_modules([name.replace('-', "_")])
    }

    #[test]
    fn test_declared_and_imported_package_passes() {
        let packages = table(StaticMetadata::new().with(pkg("requests")), &["requests"]);
        let modules = imports(&["requests"]);

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert!(verdicts.passes());
        assert!(verdicts.package_report().is_empty());
        assert_eq!(verdicts.packages["requests"].usage, Usage::Import);
    }

    #[test]
    fn test_unused_package_is_reported() {
        let black = pkg("black").with_entry_point("console_scripts", "black", "black:main");
        let packages = table(StaticMetadata::new().with(black), &["black"]);
        let modules = imports(&["os"]);
        let executables = ExecutableInspection::new(["black"]);

        let verdicts = Evaluation::new(&modules, &packages)
            .with_executables(&executables)
            .run();
        assert_eq!(verdicts.package_report(), vec!["black"]);
        assert_eq!(verdicts.packages["black"].usage, Usage::Unused);
    }

    #[test]
    fn test_undeclared_module_is_reported() {
        let packages = table(StaticMetadata::new().with(pkg("requests")), &["requests"]);
        let modules = imports(&["requests", "numpy"]);

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert_eq!(verdicts.module_report(), vec!["numpy"]);
        assert_eq!(verdicts.module("numpy"), Confidence::None);
        assert!(!verdicts.passes());
    }

    #[test]
    fn test_wheel_used_through_setuptools() {
        let metadata = StaticMetadata::new().with(
            pkg("wheel").with_entry_point("distutils.commands", "bdist_wheel", "wheel.bdist:cmd"),
        );
        let packages = table(metadata, &["wheel"]);
        let mut modules = imports(&["setuptools"]);
        modules.entry("setuptools").is_user_ignored = true;

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert_eq!(verdicts.package("wheel"), Confidence::High);
        assert_eq!(verdicts.packages["wheel"].usage, Usage::Override);
    }

    #[test]
    fn test_build_backend_counts_as_use() {
        let packages = table(StaticMetadata::new().with(pkg("setuptools")), &["setuptools"]);
        let mut modules = ModuleRegistry::new();
        modules.entry("setuptools").found_as_build_backend = true;

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert_eq!(verdicts.module("setuptools"), Confidence::High);
        assert_eq!(verdicts.package("setuptools"), Confidence::High);
        assert!(verdicts.passes());
    }

    #[test]
    fn test_executable_usage_is_medium() {
        let ruff = Distribution::new("ruff").with_entry_point("console_scripts", "ruff", "ruff:main");
        let packages = table(StaticMetadata::new().with(ruff), &["ruff"]);
        let modules = ModuleRegistry::new();
        let mut executables = ExecutableInspection::new(["ruff"]);
        executables.inspect_source(Path::new("Makefile"), b"lint:\n\truff check .\n");

        let verdicts = Evaluation::new(&modules, &packages)
            .with_executables(&executables)
            .run();
        assert_eq!(verdicts.package("ruff"), Confidence::Medium);
        assert_eq!(verdicts.packages["ruff"].usage, Usage::Executable);
    }

    #[test]
    fn test_pytest_plugin_follows_pytest() {
        let metadata = StaticMetadata::new()
            .with(pkg("pytest"))
            .with(pkg("pytest-cov").with_entry_point("pytest11", "cov", "pytest_cov.plugin"));
        let packages = table(metadata, &["pytest", "pytest-cov"]);

        let verdicts = Evaluation::new(&imports(&["pytest"]), &packages).run();
        assert_eq!(verdicts.package("pytest-cov"), Confidence::High);

        let verdicts = Evaluation::new(&imports(&[]), &packages).run();
        assert_eq!(verdicts.package_report(), vec!["pytest", "pytest-cov"]);
    }

    #[test]
    fn test_extension_chain_reaches_fixed_point() {
        // a -> b -> c -> d, only d is imported
        let metadata = StaticMetadata::new()
            .with(pkg("a").with_entry_point("b.plugins", "x", "a:x"))
            .with(pkg("b").with_entry_point("c.plugins", "x", "b:x"))
            .with(pkg("c").with_entry_point("d.plugins", "x", "c:x"))
            .with(pkg("d"));
        let packages = table(metadata, &["a", "b", "c", "d"]);
        let modules = imports(&["d"]);

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert!(verdicts.passes());
        assert_eq!(verdicts.packages["a"].usage, Usage::Extension);
        assert!(verdicts.rounds <= packages.len() + 1);
    }

    #[test]
    fn test_extension_cycle_terminates_and_is_stable() {
        let metadata = StaticMetadata::new()
            .with(pkg("a").with_entry_point("b", "x", "a:x"))
            .with(pkg("b").with_entry_point("c", "x", "b:x"))
            .with(pkg("c").with_entry_point("a", "x", "c:x"))
            .with(pkg("e").with_entry_point("a", "x", "e:x"));
        let packages = table(metadata, &["a", "b", "c", "e"]);

        let unused = Evaluation::new(&imports(&[]), &packages).run();
        assert_eq!(unused.package_report(), vec!["a", "b", "c", "e"]);
        assert_eq!(
            unused.extension_cycles,
            vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]
        );
        assert!(unused.rounds <= packages.len() + 1);

        let used = Evaluation::new(&imports(&["c"]), &packages).run();
        assert!(used.passes());
        assert!(used.rounds <= packages.len() + 1);

        let again = Evaluation::new(&imports(&["c"]), &packages).run();
        assert_eq!(again.package_report(), used.package_report());
    }

    #[test]
    fn test_extension_through_module_target() {
        let metadata = StaticMetadata::new()
            .with(pkg("flake8"))
            .with(pkg("flake8-bugbear").with_entry_point("flake8.extension", "B", "bugbear:C"));
        let packages = table(metadata, &["flake8", "flake8-bugbear"]);
        let modules = imports(&["flake8"]);

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert_eq!(verdicts.package("flake8-bugbear"), Confidence::VeryHigh);
    }

    #[test]
    fn test_marker_excluded_package_is_skipped() {
        let metadata = StaticMetadata::new().with(pkg("pywin32"));
        let mut packages = PackageTable::new(Box::new(metadata));
        packages
            .add_declared(["pywin32; sys_platform == 'win32'"])
            .unwrap();
        let mut linux = MarkerEnvironment::for_host("3.12");
        linux.sys_platform = "linux".to_string();

        let verdicts = Evaluation::new(&imports(&[]), &packages)
            .with_environment(linux)
            .run();
        assert_eq!(verdicts.package("pywin32"), Confidence::Skipped);
        assert!(verdicts.passes());
    }

    #[test]
    fn test_not_installed_package_fails() {
        let packages = table(StaticMetadata::new(), &["ghost"]);
        let verdicts = Evaluation::new(&imports(&["ghost"]), &packages).run();
        let ghost = &verdicts.packages["ghost"];
        assert_eq!(ghost.usage, Usage::NotInstalled);
        assert!(!ghost.is_installed);
        assert_eq!(verdicts.package_report(), vec!["ghost"]);
        assert!(verdicts.module_report().is_empty());
    }

    #[test]
    fn test_skipped_modules_never_reported() {
        let packages = table(StaticMetadata::new(), &[]);
        let mut modules = imports(&["os", "myproject", "conftest"]);
        modules.entry("os").is_standard_library = true;
        modules.entry("myproject").is_project_local = true;
        modules.entry("conftest").is_user_ignored = true;

        let verdicts = Evaluation::new(&modules, &packages).run();
        assert!(verdicts.passes());
        assert_eq!(verdicts.module("os"), Confidence::Skipped);
    }

    #[test]
    fn test_ignored_package_is_skipped() {
        let mut packages = table(StaticMetadata::new().with(pkg("black")), &["black"]);
        packages.mark_ignored(["black"]);
        let verdicts = Evaluation::new(&imports(&[]), &packages).run();
        assert_eq!(verdicts.packages["black"].usage, Usage::Skipped);
        assert!(verdicts.passes());
    }
}
