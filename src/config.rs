//! Run settings.
//!
//! Settings are layered: built-in defaults, then the `[tool.bonded]` table of
//! the project's `pyproject.toml`, then values given on the command line.
//! This module also owns the filesystem side of a run: the exclude globs,
//! the walk over project files and the discovery of project-local modules.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::export::ReportStyle;
use crate::parser::{pyproject, ParseError, PyProject};

/// Errors that stop a run before any file is scanned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A path named explicitly by the user does not exist.
    #[error("Supplied {kind} cannot be found: {}", .path.display())]
    MissingPath { kind: &'static str, path: PathBuf },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid exclude glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{0}")]
    InvalidReport(String),

    #[error("Cannot determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Values given on the command line. Unset fields fall back to
/// `[tool.bonded]`, then to the defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub search_path: Option<PathBuf>,
    /// An empty path disables `pyproject.toml` discovery.
    pub pyproject: Option<PathBuf>,
    pub setup: Option<PathBuf>,
    pub packages: Vec<String>,
    pub requirements: Vec<PathBuf>,
    pub ignore_modules: Vec<String>,
    pub ignore_packages: Vec<String>,
    pub exclude: Vec<String>,
    pub site_packages: Vec<PathBuf>,
    pub report: Option<ReportStyle>,
    pub verbose: Option<u8>,
    pub quiet: Option<bool>,
}

/// Fully merged settings of one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub search_path: PathBuf,
    pub excludes: Excludes,
    pub packages: Vec<String>,
    pub requirements: Vec<PathBuf>,
    pub ignore_modules: BTreeSet<String>,
    pub ignore_packages: BTreeSet<String>,
    /// Modules named by the user as belonging to the project.
    pub project_modules: BTreeSet<String>,
    pub site_packages: Vec<PathBuf>,
    pub report: ReportStyle,
    pub pyproject: Option<PathBuf>,
    /// Parsed contents of [`Settings::pyproject`].
    pub manifest: Option<PyProject>,
    pub setup: Option<PathBuf>,
    pub verbose: u8,
    pub quiet: bool,
}

impl Settings {
    /// Merges defaults, `[tool.bonded]` and `overrides`.
    ///
    /// Without an explicit `--pyproject`, the nearest `pyproject.toml` above
    /// the search path is used.
    pub fn load(overrides: Overrides) -> ConfigResult<Self> {
        let cwd = env::current_dir().map_err(ConfigError::CurrentDir)?;
        let start = overrides.search_path.clone().unwrap_or_else(|| cwd.clone());

        let pyproject = match &overrides.pyproject {
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => {
                require_exists("--pyproject", path)?;
                Some(path.clone())
            }
            None => find_pyproject(&start),
        };
        let manifest = match &pyproject {
            Some(path) => Some(pyproject::parse_file(path)?),
            None => None,
        };
        debug!("Using pyproject {:?}", pyproject);

        let table = manifest
            .as_ref()
            .and_then(PyProject::bonded_settings)
            .cloned()
            .unwrap_or_default();
        let base = pyproject
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        let relative = |value: &String| base.join(value);

        let search_path = overrides
            .search_path
            .or_else(|| table.search_path.as_ref().map(relative))
            .unwrap_or(start);
        require_exists("search path", &search_path)?;

        let exclude = prefer(overrides.exclude, table.exclude);
        let excludes = Excludes::new(exclude.iter().map(|e| unanchor_exclude(e)))?;

        let report = match (overrides.report, &table.report) {
            (Some(report), _) => report,
            (None, Some(name)) => name.parse().map_err(ConfigError::InvalidReport)?,
            (None, None) => ReportStyle::default(),
        };

        let setup = overrides.setup.or_else(|| table.setup.as_ref().map(relative));
        if let Some(setup) = &setup {
            require_exists("--setup", setup)?;
        }

        let requirements: Vec<PathBuf> = if overrides.requirements.is_empty() {
            table.requirements.iter().flatten().map(relative).collect()
        } else {
            overrides.requirements
        };
        for requirement in &requirements {
            require_exists("requirements file", requirement)?;
        }

        let site_packages = if overrides.site_packages.is_empty() {
            table.site_packages.iter().flatten().map(relative).collect()
        } else {
            overrides.site_packages
        };

        Ok(Self {
            search_path,
            excludes,
            packages: prefer(overrides.packages, table.packages),
            requirements,
            ignore_modules: prefer(overrides.ignore_modules, table.ignore_modules)
                .into_iter()
                .collect(),
            ignore_packages: prefer(overrides.ignore_packages, table.ignore_packages)
                .into_iter()
                .collect(),
            project_modules: table.project_modules.unwrap_or_default().into_iter().collect(),
            site_packages,
            report,
            pyproject,
            manifest,
            setup,
            verbose: overrides.verbose.or(table.verbose).unwrap_or(0),
            quiet: overrides.quiet.or(table.quiet).unwrap_or(false),
        })
    }

    /// Every file under the search path that is not excluded.
    pub fn project_files(&self) -> Vec<PathBuf> {
        project_files(&self.search_path, &self.excludes)
    }

    /// Files read for package declarations.
    pub fn manifest_paths(&self) -> impl Iterator<Item = &Path> {
        self.pyproject
            .iter()
            .chain(self.setup.iter())
            .chain(self.requirements.iter())
            .map(PathBuf::as_path)
    }

    /// Python source files under the search path that are not excluded.
    pub fn python_files(&self) -> Vec<PathBuf> {
        self.project_files()
            .into_iter()
            .filter(|path| is_python_source(path))
            .collect()
    }
}

/// Command line lists replace configured ones.
fn prefer(cli: Vec<String>, configured: Option<Vec<String>>) -> Vec<String> {
    if cli.is_empty() {
        configured.unwrap_or_default()
    } else {
        cli
    }
}

fn require_exists(kind: &'static str, path: &Path) -> ConfigResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConfigError::MissingPath {
            kind,
            path: path.to_path_buf(),
        })
    }
}

/// Makes a user exclude match at any depth.
///
/// Patterns starting with `/` stay anchored; a trailing `/` excludes the
/// directory's contents.
///
/// ```
/// use bonded::config::unanchor_exclude;
///
/// assert_eq!(unanchor_exclude("dev"), "**/dev");
/// assert_eq!(unanchor_exclude("dev/"), "**/dev/**");
/// assert_eq!(unanchor_exclude("/dev"), "/dev");
/// assert_eq!(unanchor_exclude("/dev/"), "/dev/**");
/// ```
pub fn unanchor_exclude(pattern: &str) -> String {
    let mut unanchored = if pattern.starts_with('/') || pattern.starts_with("**/") {
        pattern.to_string()
    } else {
        format!("**/{}", pattern)
    };
    if unanchored.ends_with('/') {
        unanchored.push_str("**");
    }
    unanchored
}

/// Compiled exclude globs.
#[derive(Debug, Clone)]
pub struct Excludes {
    patterns: Vec<String>,
    set: GlobSet,
}

impl Default for Excludes {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

impl Excludes {
    /// Compiles already unanchored patterns.
    pub fn new<I, S>(patterns: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ConfigError::InvalidGlob {
            pattern: patterns.join(", "),
            source,
        })?;
        Ok(Self { patterns, set })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Directories are also tested with a trailing separator, so `dev/**`
    /// prunes `dev` itself.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.is_empty() {
            return false;
        }
        self.set.is_match(path) || (is_dir && self.set.is_match(path.join("")))
    }
}

fn is_python_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "py")
}

/// Every file below `search_path`, pruning excluded directories.
pub fn project_files(search_path: &Path, excludes: &Excludes) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkDir::new(search_path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !excludes.is_excluded(entry.path(), entry.file_type().is_dir())
        });
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => warn!("Skipping unreadable path: {}", err),
        }
    }
    debug!("Found {} project files", files.len());
    files
}

/// Top-level modules defined by the project itself.
///
/// A directory holding `__init__.py` is a package and is not descended into;
/// loose `.py` files contribute their stem.
pub fn find_project_modules(search_path: &Path, excludes: &Excludes) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();

    if search_path.is_file() {
        if is_python_source(search_path) {
            modules.extend(file_stem(search_path));
        }
        return modules;
    }
    if search_path.join("__init__.py").is_file() {
        let resolved = fs::canonicalize(search_path).unwrap_or_else(|_| search_path.to_path_buf());
        modules.extend(file_name(&resolved));
        return modules;
    }

    let mut walker = WalkDir::new(search_path).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable path: {}", err);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            if entry.depth() == 0 {
                continue;
            }
            if excludes.is_excluded(path, true) {
                walker.skip_current_dir();
            } else if path.join("__init__.py").is_file() {
                modules.extend(file_name(path));
                walker.skip_current_dir();
            }
        } else if is_python_source(path) && !excludes.is_excluded(path, false) {
            modules.extend(file_stem(path));
        }
    }
    debug!("Project modules: {:?}", modules);
    modules
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|n| n.to_string_lossy().into_owned())
}

/// Nearest `pyproject.toml` at or above `start`.
pub fn find_pyproject(start: &Path) -> Option<PathBuf> {
    let resolved = fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    let mut dir = if resolved.is_file() {
        resolved.parent()?.to_path_buf()
    } else {
        resolved
    };
    loop {
        let candidate = dir.join("pyproject.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
