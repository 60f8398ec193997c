//! Run-local table of every module name seen by the scanners.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::analysis::ImportKind;

/// Record tracking one top-level module seen in source code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Module {
    /// Top-level importable name, exactly as written in source.
    pub name: String,
    /// Named by an `import` or `from ... import` statement.
    pub found_via_static_statement: bool,
    /// Named as the literal argument of a dynamic loader call.
    pub found_via_dynamic_call: bool,
    /// Root module of the project's declared build backend.
    pub found_as_build_backend: bool,
    pub is_standard_library: bool,
    pub is_project_local: bool,
    pub is_user_ignored: bool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true if any source file imports this module.
    pub fn is_imported(&self) -> bool {
        self.found_via_static_statement || self.found_via_dynamic_call
    }

    /// Returns true if this module is imported or drives the build.
    pub fn has_evidence(&self) -> bool {
        self.is_imported() || self.found_as_build_backend
    }

    /// Returns true if the module never needs a declared package.
    pub fn is_skipped(&self) -> bool {
        self.is_standard_library || self.is_project_local || self.is_user_ignored
    }
}

/// Deduplicated, lazily populated mapping from module name to [`Module`].
///
/// # Example
///
/// ```
/// use bonded::registry::ModuleRegistry;
///
/// let mut modules = ModuleRegistry::new();
/// modules.entry("requests").found_via_static_statement = true;
/// modules.entry("requests").found_via_dynamic_call = true;
///
/// assert_eq!(modules.len(), 1);
/// assert!(modules.get("requests").unwrap().is_imported());
/// assert!(modules.get("urllib3").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `name`, creating an empty one on first reference.
    pub fn entry(&mut self, name: &str) -> &mut Module {
        self.modules
            .entry(name.to_string())
            .or_insert_with(|| Module::new(name))
    }

    /// Sets the evidence flag matching `kind`.
    pub fn record(&mut self, name: &str, kind: ImportKind) -> &mut Module {
        let module = self.entry(name);
        match kind {
            ImportKind::Statement => module.found_via_static_statement = true,
            ImportKind::Dynamic => module.found_via_dynamic_call = true,
        }
        module
    }

    /// Looks up a record without creating it.
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    /// Names of all registered modules that are not in `skip`.
    ///
    /// `skip` is normally the union of standard-library, project-local and
    /// user-ignored module names.
    pub fn iter_third_party<'a>(
        &'a self,
        skip: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.modules
            .keys()
            .filter(move |name| !skip.contains(name.as_str()))
            .map(String::as_str)
    }
}
