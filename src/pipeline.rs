//! One complete bond check.
//!
//! Declares packages, scans the project, evaluates the bonds and flattens
//! the verdicts into a [`Report`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::analysis::{inspect_imports, ExecutableInspection};
use crate::config::{find_project_modules, ConfigResult, Settings};
use crate::evaluation::{classify_modules, Evaluation};
use crate::export::Report;
use crate::metadata::{discover_roots, MetadataSource, SitePackages};
use crate::parser::markers::DEFAULT_PYTHON_VERSION;
use crate::parser::{canonicalize_name, MarkerEnvironment};
use crate::registry::{ModuleRegistry, PackageTable};

/// Runs a check against the installed `site-packages`.
///
/// Configured `site-packages` directories are used when given, otherwise the
/// active or project-local virtualenv is looked up.
pub fn run(settings: &Settings) -> ConfigResult<Report> {
    let roots = if settings.site_packages.is_empty() {
        discover_roots(&settings.search_path)
    } else {
        settings.site_packages.clone()
    };
    let site_packages = SitePackages::open(roots);
    let python_version = site_packages.python_version();
    run_with(settings, Box::new(site_packages), python_version.as_deref())
}

/// Runs a check against any metadata source.
pub fn run_with(
    settings: &Settings,
    metadata: Box<dyn MetadataSource>,
    python_version: Option<&str>,
) -> ConfigResult<Report> {
    let mut project_modules = settings.project_modules.clone();
    project_modules.extend(find_project_modules(
        &settings.search_path,
        &settings.excludes,
    ));

    let manifest = settings.manifest.as_ref();
    if let Some(name) = manifest.and_then(|m| m.project_name()) {
        let own = metadata.provided_modules(&canonicalize_name(name));
        debug!("Project distribution {} provides {:?}", name, own);
        project_modules.extend(own);
    }
    let backend = manifest.and_then(|m| m.build_backend_module());
    if let Some(backend) = backend {
        if manifest.is_some_and(|m| m.has_backend_path()) {
            project_modules.insert(backend.to_string());
        }
    }

    let mut packages = PackageTable::new(metadata);
    packages.add_declared(&settings.packages)?;
    if let Some(manifest) = manifest {
        packages.add_pyproject(manifest);
    }
    if let Some(setup) = &settings.setup {
        packages.update_from_setup_cfg(setup)?;
    }
    for requirements in &settings.requirements {
        packages.update_from_pip_requirements(requirements)?;
    }
    packages.mark_ignored(&settings.ignore_packages);
    info!("Declared {} packages", packages.len());

    let mut modules = ModuleRegistry::new();
    let summary = inspect_imports(&mut modules, settings.python_files());
    if let Some(backend) = backend {
        modules.entry(backend).found_as_build_backend = true;
    }
    classify_modules(&mut modules, &project_modules, &settings.ignore_modules);

    let names: BTreeSet<String> = packages
        .iter()
        .flat_map(|p| p.executables.iter().cloned())
        .collect();
    let manifests: BTreeSet<PathBuf> = settings.manifest_paths().map(canonical).collect();
    let mut executables = ExecutableInspection::new(names);
    executables.inspect_files(
        settings
            .project_files()
            .into_iter()
            .filter(|file| !manifests.contains(&canonical(file))),
    );

    let environment =
        MarkerEnvironment::for_host(python_version.unwrap_or(DEFAULT_PYTHON_VERSION));
    let verdicts = Evaluation::new(&modules, &packages)
        .with_executables(&executables)
        .with_environment(environment)
        .run();

    Ok(Report::new(&modules, &packages, &executables, &verdicts)
        .with_scan_failures(&summary.failures))
}

fn canonical(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::{ConfigError, Overrides};
    use crate::evaluation::{Confidence, Usage};
    use crate::metadata::{Distribution, StaticMetadata, CONSOLE_SCRIPTS_GROUP};

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn settings(root: &Path, overrides: Overrides) -> Settings {
        Settings::load(Overrides {
            search_path: Some(root.to_path_buf()),
            ..overrides
        })
        .unwrap()
    }

    fn metadata() -> StaticMetadata {
        StaticMetadata::new()
            .with(Distribution::new("requests").with_modules(["requests"]))
            .with(Distribution::new("numpy").with_modules(["numpy"]))
            .with(
                Distribution::new("black")
                    .with_modules(["black", "blackd"])
                    .with_entry_point(CONSOLE_SCRIPTS_GROUP, "black", "black:patched_main"),
            )
            .with(
                Distribution::new("setuptools")
                    .with_modules(["setuptools", "pkg_resources", "_distutils_hack"]),
            )
            .with(
                Distribution::new("wheel")
                    .with_modules(["wheel"])
                    .with_entry_point("distutils.commands", "bdist_wheel", "wheel.bdist:bdist_wheel"),
            )
            .with(Distribution::new("demo-app").with_modules(["demo_app"]))
    }

    fn check(root: &Path, overrides: Overrides) -> Report {
        run_with(&settings(root, overrides), Box::new(metadata()), None).unwrap()
    }

    fn unused(report: &Report) -> Vec<&str> {
        report.unused_packages().map(|p| p.name.as_str()).collect()
    }

    fn unbacked(report: &Report) -> Vec<&str> {
        report.unbacked_modules().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_unused_package_and_unbacked_module() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname = \"demo-app\"\ndependencies = [\"requests\", \"black\"]\n",
        );
        write(dir.path(), "app.py", "import requests\nimport numpy as np\nimport os\n");

        let report = check(dir.path(), Overrides::default());
        assert!(!report.passes);
        assert_eq!(unused(&report), vec!["black"]);
        assert_eq!(unbacked(&report), vec!["numpy"]);
    }

    #[test]
    fn test_manifests_are_not_executable_use() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\ndependencies = [\"black\"]\n\n[tool.black]\nline-length = 99\n",
        );
        write(dir.path(), "requirements-dev.txt", "black\n");
        write(dir.path(), "app.py", "");

        let report = check(
            dir.path(),
            Overrides {
                requirements: vec![dir.path().join("requirements-dev.txt")],
                ..Overrides::default()
            },
        );
        assert_eq!(unused(&report), vec!["black"]);
    }

    #[test]
    fn test_executable_use_counts() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\ndependencies = [\"requests\", \"black\"]\n",
        );
        write(dir.path(), "app.py", "import requests\n");
        write(dir.path(), "tox.ini", "[testenv:lint]\ncommands = black --check .\n");

        let report = check(dir.path(), Overrides::default());
        assert!(report.passes, "{:?}", report);
        let black = report.packages.iter().find(|p| p.name == "black").unwrap();
        assert_eq!(black.usage, Usage::Executable);
        assert_eq!(black.confidence, Confidence::Medium);
        assert_eq!(black.executions.len(), 1);
        assert!(black.executions[0].ends_with("tox.ini:2"));
    }

    #[test]
    fn test_project_local_modules_need_no_package() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname = \"demo-app\"\ndependencies = [\"requests\"]\n",
        );
        write(dir.path(), "mypkg/__init__.py", "");
        write(dir.path(), "mypkg/core.py", "from mypkg import util\nimport helpers\n");
        write(dir.path(), "helpers.py", "import requests\nimport demo_app\n");

        let report = check(dir.path(), Overrides::default());
        assert!(report.passes, "{:?}", report);
        assert!(report.third_party_modules().all(|m| m.name == "requests"));
    }

    #[test]
    fn test_build_backend_and_wheel_override() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            r#"
[build-system]
requires = ["setuptools>=61", "wheel"]
build-backend = "setuptools.build_meta"
"#,
        );
        write(dir.path(), "app.py", "print('hello')\n");

        let report = check(dir.path(), Overrides::default());
        assert!(report.passes, "{:?}", report);
        let wheel = report.packages.iter().find(|p| p.name == "wheel").unwrap();
        assert_eq!(wheel.usage, Usage::Override);
        let setuptools = report.modules.iter().find(|m| m.name == "setuptools").unwrap();
        assert!(setuptools.build_backend);
    }

    #[test]
    fn test_local_build_backend() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            r#"
[build-system]
requires = []
build-backend = "backend:build"
backend-path = ["_build"]
"#,
        );
        write(dir.path(), "app.py", "");

        let report = check(dir.path(), Overrides::default());
        assert!(report.passes, "{:?}", report);
    }

    #[test]
    fn test_ignored_packages_and_modules() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "import numpy\nimport secret_sauce\n");

        let report = check(
            dir.path(),
            Overrides {
                pyproject: Some(PathBuf::new()),
                packages: vec!["black".to_string(), "numpy".to_string()],
                ignore_packages: vec!["Black".to_string()],
                ignore_modules: vec!["secret_sauce".to_string()],
                ..Overrides::default()
            },
        );
        assert!(report.passes, "{:?}", report);
    }

    #[test]
    fn test_not_installed_package_is_unused() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "import ghost\n");
        write(dir.path(), "requirements.txt", "ghost==1.0\n");

        let report = check(
            dir.path(),
            Overrides {
                pyproject: Some(PathBuf::new()),
                requirements: vec![dir.path().join("requirements.txt")],
                ..Overrides::default()
            },
        );
        assert_eq!(unused(&report), vec!["ghost"]);
        assert!(!report.packages[0].installed);
        assert_eq!(report.packages[0].usage, Usage::NotInstalled);
        assert!(unbacked(&report).is_empty());
    }

    #[test]
    fn test_setup_cfg_requirements() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "setup.cfg",
            "[options]\ninstall_requires =\n    requests>=2\n    numpy ; sys_platform == 'nonexistent'\n",
        );
        write(dir.path(), "app.py", "import requests\n");

        let report = check(
            dir.path(),
            Overrides {
                pyproject: Some(PathBuf::new()),
                setup: Some(dir.path().join("setup.cfg")),
                ..Overrides::default()
            },
        );
        assert!(report.passes, "{:?}", report);
        let numpy = report.packages.iter().find(|p| p.name == "numpy").unwrap();
        assert_eq!(numpy.usage, Usage::Skipped);
    }

    #[test]
    fn test_unparsable_file_is_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.py", "import requests\nx = [1, 2, 3\n");
        write(dir.path(), "app.py", "import numpy\n");

        let report = check(
            dir.path(),
            Overrides {
                pyproject: Some(PathBuf::new()),
                packages: vec!["numpy".to_string()],
                ..Overrides::default()
            },
        );
        assert!(report.passes, "{:?}", report);
        assert_eq!(report.scan_failures.len(), 1);
        assert!(report.scan_failures[0].contains("broken.py"));
    }

    #[test]
    fn test_excluded_files_are_not_scanned() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", "import requests\n");
        write(dir.path(), "dev/bench.py", "import numpy\n");

        let report = check(
            dir.path(),
            Overrides {
                pyproject: Some(PathBuf::new()),
                packages: vec!["requests".to_string()],
                exclude: vec!["dev/".to_string()],
                ..Overrides::default()
            },
        );
        assert!(report.passes, "{:?}", report);
    }

    #[test]
    fn test_invalid_declared_package_is_an_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings(
            dir.path(),
            Overrides {
                pyproject: Some(PathBuf::new()),
                packages: vec![">=1.0".to_string()],
                ..Overrides::default()
            },
        );
        let err = run_with(&settings, Box::new(metadata()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
