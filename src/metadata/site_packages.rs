//! Metadata read from `*.dist-info` / `*.egg-info` directories.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Distribution, EntryPoint, MetadataSource};
use crate::parser::canonicalize_name;
use crate::parser::ini::IniDocument;

/// Installed distributions of one or more `site-packages` directories.
///
/// Directories are indexed once when the source is opened; the metadata
/// files of a distribution are read on each lookup. When two roots contain
/// the same distribution the first root wins, like Python's own path order.
#[derive(Debug, Clone, Default)]
pub struct SitePackages {
    roots: Vec<PathBuf>,
    index: HashMap<String, PathBuf>,
}

impl SitePackages {
    pub fn open<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
        let mut index = HashMap::new();

        for root in &roots {
            let Ok(entries) = fs::read_dir(root) else {
                debug!("Cannot list site-packages {}", root.display());
                continue;
            };
            let mut found: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir() && metadata_dir_stem(path).is_some())
                .collect();
            found.sort();
            for meta_dir in found {
                if let Some(name) = distribution_name(&meta_dir) {
                    index
                        .entry(canonicalize_name(&name))
                        .or_insert(meta_dir);
                }
            }
        }

        info!(
            "Indexed {} installed distributions from {} site-packages",
            index.len(),
            roots.len()
        );
        Self { roots, index }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Python version implied by a `lib/pythonX.Y/site-packages` root.
    pub fn python_version(&self) -> Option<String> {
        self.roots.iter().find_map(|root| {
            root.components().find_map(|component| {
                let text = component.as_os_str().to_str()?;
                let version = text.strip_prefix("python")?;
                (!version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.'))
                    .then(|| version.to_string())
            })
        })
    }
}

impl MetadataSource for SitePackages {
    fn distribution(&self, normalized_name: &str) -> Option<Distribution> {
        let meta_dir = self.index.get(normalized_name)?;
        Some(read_distribution(meta_dir))
    }
}

/// `site-packages` directories of the active or project-local virtualenv.
///
/// Looks at `$VIRTUAL_ENV` first, then at `.venv` and `venv` inside
/// `search_path`.
pub fn discover_roots(search_path: &Path) -> Vec<PathBuf> {
    let mut envs = Vec::new();
    if let Some(venv) = env::var_os("VIRTUAL_ENV") {
        envs.push(PathBuf::from(venv));
    }
    let base = if search_path.is_file() {
        search_path.parent().unwrap_or(search_path)
    } else {
        search_path
    };
    envs.push(base.join(".venv"));
    envs.push(base.join("venv"));

    let mut roots = Vec::new();
    for env_dir in envs {
        roots.extend(site_packages_of(&env_dir));
    }
    roots.dedup();
    roots
}

fn site_packages_of(env_dir: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(entries) = fs::read_dir(env_dir.join("lib")) {
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
            .map(|entry| entry.path().join("site-packages"))
            .filter(|path| path.is_dir())
            .collect();
        candidates.sort();
        roots.extend(candidates);
    }
    let windows = env_dir.join("Lib").join("site-packages");
    if windows.is_dir() {
        roots.push(windows);
    }
    roots
}

fn metadata_dir_stem(path: &Path) -> Option<&str> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .strip_suffix(".dist-info")
        .or_else(|| file_name.strip_suffix(".egg-info"))
}

/// Name of the distribution described by a metadata directory.
fn distribution_name(meta_dir: &Path) -> Option<String> {
    if let Some(name) = read_headers(meta_dir).0 {
        return Some(name);
    }
    let stem = metadata_dir_stem(meta_dir)?;
    stem.split('-').next().map(str::to_string)
}

/// `Name` and `Version` headers of `METADATA` or `PKG-INFO`.
fn read_headers(meta_dir: &Path) -> (Option<String>, Option<String>) {
    let content = fs::read_to_string(meta_dir.join("METADATA"))
        .or_else(|_| fs::read_to_string(meta_dir.join("PKG-INFO")))
        .unwrap_or_default();
    let mut name = None;
    let mut version = None;
    for line in content.lines() {
        if line.trim().is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version = Some(value.trim().to_string());
        }
    }
    (name, version)
}

fn read_distribution(meta_dir: &Path) -> Distribution {
    let (name, version) = read_headers(meta_dir);
    let name = name
        .or_else(|| distribution_name(meta_dir))
        .unwrap_or_default();
    let files = installed_files(meta_dir);

    let modules = match fs::read_to_string(meta_dir.join("top_level.txt")) {
        Ok(top_level) => top_level
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            // namespace packages list `pkg/sub`; only the root is importable by name
            .filter_map(|line| line.split('/').next())
            .map(str::to_string)
            .collect(),
        Err(_) => files.iter().filter_map(|f| module_of_file(f)).collect(),
    };

    let scripts = files.iter().filter_map(|f| script_of_file(f)).collect();

    let entry_points = fs::read_to_string(meta_dir.join("entry_points.txt"))
        .ok()
        .and_then(|content| match IniDocument::parse(&content) {
            Ok(doc) => Some(doc),
            Err(err) => {
                debug!("Ignoring malformed entry points in {}: {}", meta_dir.display(), err);
                None
            }
        })
        .map(|doc| {
            doc.sections()
                .flat_map(|(group, entries)| {
                    entries.iter().map(move |(name, value)| EntryPoint {
                        group: group.to_string(),
                        name: name.clone(),
                        value: value.clone(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Distribution {
        name,
        version,
        modules,
        entry_points,
        scripts,
    }
}

/// Installed file paths from `RECORD`, or `installed-files.txt` for eggs.
///
/// `RECORD` paths are relative to `site-packages`; `installed-files.txt`
/// paths are relative to the metadata directory and are rebased here.
fn installed_files(meta_dir: &Path) -> Vec<String> {
    if let Ok(record) = fs::read_to_string(meta_dir.join("RECORD")) {
        return record.lines().filter_map(record_path).collect();
    }
    if let Ok(listing) = fs::read_to_string(meta_dir.join("installed-files.txt")) {
        return listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.strip_prefix("../").unwrap_or(line).to_string())
            .collect();
    }
    Vec::new()
}

/// First CSV column of a `RECORD` row.
fn record_path(row: &str) -> Option<String> {
    let row = row.trim();
    if row.is_empty() {
        return None;
    }
    if let Some(quoted) = row.strip_prefix('"') {
        let end = quoted.find('"')?;
        return Some(quoted[..end].to_string());
    }
    row.split(',').next().map(str::to_string)
}

fn module_of_file(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [] => None,
        [single] => {
            let (stem, suffix) = single.split_once('.')?;
            let importable = suffix == "py"
                || suffix == "pyc"
                || suffix.ends_with("so")
                || suffix.ends_with("pyd");
            (importable && is_identifier(stem)).then(|| stem.to_string())
        }
        [first, ..] => is_identifier(first).then(|| first.to_string()),
    }
}

fn script_of_file(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split(['/', '\\']).collect();
    let dir = parts.iter().rev().nth(1)?;
    if !path.starts_with("..") || !(*dir == "bin" || *dir == "Scripts") {
        return None;
    }
    let file = parts.last()?;
    let name = file.strip_suffix(".exe").unwrap_or(file);
    (!name.is_empty()).then(|| name.to_string())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
        && name != "__pycache__"
}
