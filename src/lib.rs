//! Bonded - checks the bonds between a Python project's declared packages
//! and the modules it actually uses.
//!
//! A package is bonded when the project imports one of its modules, runs one
//! of its executables, or when a used package extends it. A module is bonded
//! when a declared package provides it. Everything else is reported: declared
//! packages nothing uses, and used modules no declared package provides.

pub mod analysis;
pub mod config;
pub mod evaluation;
pub mod export;
pub mod graph;
pub mod metadata;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod stdlib;
