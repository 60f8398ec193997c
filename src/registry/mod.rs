//! Run-local registries of modules and declared packages.

pub mod modules;
pub mod packages;

pub use modules::{Module, ModuleRegistry};
pub use packages::{Package, PackageTable};
