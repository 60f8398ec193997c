//! Evidence reconciliation.
//!
//! Decides, for every module the project uses and every package it declares,
//! whether the bond between them holds. Package usage propagates along
//! extension relationships until a fixed point is reached, then a few
//! override rules for well-known packaging corner cases are applied.

mod confidence;
mod engine;

use std::collections::BTreeSet;

pub use confidence::Confidence;
pub use engine::{
    Evaluation, ModuleVerdict, PackageEvidence, PackageVerdict, Usage, Verdicts,
    PYTEST_PLUGIN_GROUP,
};

use crate::registry::ModuleRegistry;
use crate::stdlib;

/// Sets the classification flags of every registered module.
///
/// ```
/// use std::collections::BTreeSet;
/// use bonded::evaluation::classify_modules;
/// use bonded::registry::ModuleRegistry;
///
/// let mut modules = ModuleRegistry::new();
/// modules.entry("json");
/// modules.entry("myapp");
///
/// let local = BTreeSet::from(["myapp".to_string()]);
/// classify_modules(&mut modules, &local, &BTreeSet::new());
///
/// assert!(modules.get("json").unwrap().is_standard_library);
/// assert!(modules.get("myapp").unwrap().is_project_local);
/// ```
pub fn classify_modules(
    registry: &mut ModuleRegistry,
    project_modules: &BTreeSet<String>,
    ignore_modules: &BTreeSet<String>,
) {
    for module in registry.iter_mut() {
        module.is_standard_library = stdlib::is_stdlib(&module.name);
        module.is_project_local |= project_modules.contains(&module.name);
        module.is_user_ignored = ignore_modules.contains(&module.name);
    }
}
