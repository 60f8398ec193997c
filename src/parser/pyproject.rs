//! Parser for `pyproject.toml` files.
//!
//! Extracts the declared dependencies (`[project]`), the build system
//! (`[build-system]`) and the tool's own settings (`[tool.bonded]`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::error::{ParseError, ParseResult};

/// The parts of a `pyproject.toml` that matter for bond checking.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PyProject {
    pub project: Option<ProjectTable>,

    #[serde(rename = "build-system")]
    pub build_system: Option<BuildSystemTable>,

    pub tool: Option<ToolTable>,
}

/// `[project]` table (PEP 621).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectTable {
    pub name: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(rename = "optional-dependencies", default)]
    pub optional_dependencies: BTreeMap<String, Vec<String>>,
}

/// `[build-system]` table (PEP 517 / 518).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSystemTable {
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(rename = "build-backend")]
    pub build_backend: Option<String>,

    #[serde(rename = "backend-path", default)]
    pub backend_path: Vec<String>,
}

/// `[tool]` table; only `[tool.bonded]` is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolTable {
    pub bonded: Option<BondedTable>,
}

/// Settings stored under `[tool.bonded]`.
///
/// Every field mirrors a command line option; command line values win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BondedTable {
    pub search_path: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub packages: Option<Vec<String>>,
    pub requirements: Option<Vec<String>>,
    #[serde(alias = "ignore_modules")]
    pub ignore_modules: Option<Vec<String>>,
    #[serde(alias = "ignore_packages")]
    pub ignore_packages: Option<Vec<String>>,
    #[serde(alias = "project_modules")]
    pub project_modules: Option<Vec<String>>,
    #[serde(alias = "site_packages")]
    pub site_packages: Option<Vec<String>>,
    pub report: Option<String>,
    pub setup: Option<String>,
    pub verbose: Option<u8>,
    pub quiet: Option<bool>,
}

impl PyProject {
    /// Every dependency specifier the manifest declares: runtime, optional
    /// groups and build requirements.
    pub fn requirement_specs(&self) -> Vec<&str> {
        let mut specs = Vec::new();
        if let Some(project) = &self.project {
            specs.extend(project.dependencies.iter().map(String::as_str));
            for optionals in project.optional_dependencies.values() {
                specs.extend(optionals.iter().map(String::as_str));
            }
        }
        if let Some(build) = &self.build_system {
            specs.extend(build.requires.iter().map(String::as_str));
        }
        specs
    }

    /// Root module of the declared build backend, e.g. `setuptools` for
    /// `setuptools.build_meta` or `flit_core` for `flit_core.buildapi:main`.
    pub fn build_backend_module(&self) -> Option<&str> {
        let backend = self.build_system.as_ref()?.build_backend.as_deref()?;
        backend_root(backend)
    }

    /// Returns true if the build backend is loaded from the project tree.
    pub fn has_backend_path(&self) -> bool {
        self.build_system
            .as_ref()
            .is_some_and(|build| !build.backend_path.is_empty())
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref()?.name.as_deref()
    }

    pub fn bonded_settings(&self) -> Option<&BondedTable> {
        self.tool.as_ref()?.bonded.as_ref()
    }
}

/// Root module of an object reference such as `pkg.mod:attr`.
pub fn backend_root(reference: &str) -> Option<&str> {
    let module = reference.split(':').next()?;
    let root = module.split('.').next()?.trim();
    (!root.is_empty()).then_some(root)
}

/// Parses a `pyproject.toml` file from a file path.
pub fn parse_file(path: &Path) -> ParseResult<PyProject> {
    let content = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    toml::from_str(&content).map_err(|source| ParseError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses a `pyproject.toml` from a string.
///
/// # Example
///
/// ```
/// use bonded::parser::pyproject::parse_str;
///
/// let pyproject = parse_str(r#"
/// [project]
/// name = "demo"
/// dependencies = ["requests>=2"]
///
/// [build-system]
/// requires = ["setuptools"]
/// build-backend = "setuptools.build_meta"
/// "#).unwrap();
///
/// assert_eq!(pyproject.requirement_specs(), vec!["requests>=2", "setuptools"]);
/// assert_eq!(pyproject.build_backend_module(), Some("setuptools"));
/// ```
pub fn parse_str(content: &str) -> ParseResult<PyProject> {
    toml::from_str(content).map_err(|source| ParseError::Toml {
        path: "<string>".into(),
        source,
    })
}
