//! Installed-package metadata.
//!
//! The resolver only needs a handful of facts about an installed
//! distribution: which top-level modules it provides, which entry-point
//! groups it registers, and which executables it installs. Those facts come
//! from a [`MetadataSource`], either a real `site-packages` directory
//! ([`SitePackages`]) or an in-memory table ([`StaticMetadata`]).

mod site_packages;

use std::collections::{BTreeMap, BTreeSet};

pub use site_packages::{discover_roots, SitePackages};

use crate::parser::canonicalize_name;

/// Entry-point group whose entries are command line executables.
pub const CONSOLE_SCRIPTS_GROUP: &str = "console_scripts";

/// A single entry point declared by a distribution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryPoint {
    pub group: String,
    pub name: String,
    pub value: String,
}

impl EntryPoint {
    /// Root name of the group, e.g. `distutils` for `distutils.commands`.
    pub fn group_root(&self) -> &str {
        let head = self.group.split(':').next().unwrap_or(&self.group);
        head.split('.').next().unwrap_or(head)
    }
}

/// Metadata of one installed distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distribution {
    /// Name as written in the distribution's metadata.
    pub name: String,
    pub version: Option<String>,
    /// Top-level importable modules the distribution installs.
    pub modules: BTreeSet<String>,
    pub entry_points: Vec<EntryPoint>,
    /// Executables found in the installed file list.
    pub scripts: BTreeSet<String>,
}

impl Distribution {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn with_entry_point(
        mut self,
        group: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.entry_points.push(EntryPoint {
            group: group.into(),
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.scripts.insert(script.into());
        self
    }

    pub fn normalized_name(&self) -> String {
        canonicalize_name(&self.name)
    }

    /// Names this distribution plugs into, from its non-console entry-point groups.
    pub fn extends(&self) -> BTreeSet<String> {
        let own = self.normalized_name();
        self.entry_points
            .iter()
            .filter(|ep| ep.group != CONSOLE_SCRIPTS_GROUP)
            .map(|ep| ep.group_root().to_string())
            .filter(|root| !root.is_empty() && *root != own)
            .collect()
    }

    /// Commands this distribution installs.
    pub fn executables(&self) -> BTreeSet<String> {
        self.entry_points
            .iter()
            .filter(|ep| ep.group == CONSOLE_SCRIPTS_GROUP)
            .map(|ep| ep.name.clone())
            .chain(self.scripts.iter().cloned())
            .collect()
    }
}

/// Lookup of installed distributions by normalized name.
pub trait MetadataSource {
    /// Returns the installed distribution for a normalized package name.
    fn distribution(&self, normalized_name: &str) -> Option<Distribution>;

    /// Modules provided by the distribution, empty when it is not installed.
    fn provided_modules(&self, normalized_name: &str) -> BTreeSet<String> {
        self.distribution(normalized_name)
            .map(|dist| dist.modules)
            .unwrap_or_default()
    }
}

/// Metadata source with no installed distributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataSource for NoMetadata {
    fn distribution(&self, _normalized_name: &str) -> Option<Distribution> {
        None
    }
}

/// In-memory metadata source.
///
/// # Example
///
/// ```
/// use bonded::metadata::{Distribution, MetadataSource, StaticMetadata};
///
/// let metadata = StaticMetadata::new()
///     .with(Distribution::new("PyYAML").with_modules(["yaml", "_yaml"]));
///
/// assert!(metadata.distribution("pyyaml").is_some());
/// assert!(metadata.provided_modules("pyyaml").contains("yaml"));
/// assert!(metadata.distribution("requests").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    distributions: BTreeMap<String, Distribution>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, distribution: Distribution) -> Self {
        self.insert(distribution);
        self
    }

    pub fn insert(&mut self, distribution: Distribution) {
        self.distributions
            .insert(distribution.normalized_name(), distribution);
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

impl MetadataSource for StaticMetadata {
    fn distribution(&self, normalized_name: &str) -> Option<Distribution> {
        self.distributions.get(normalized_name).cloned()
    }
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn distribution(&self, normalized_name: &str) -> Option<Distribution> {
        (**self).distribution(normalized_name)
    }
}

impl<T: MetadataSource + ?Sized> MetadataSource for Box<T> {
    fn distribution(&self, normalized_name: &str) -> Option<Distribution> {
        (**self).distribution(normalized_name)
    }
}
