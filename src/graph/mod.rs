//! Graph module for package extension relationships.
//!
//! This module provides the [`ExtensionGraph`] struct, a directed graph of
//! which declared packages plug into which other packages or modules through
//! entry-point groups (pytest plugins, flake8 extensions, distutils commands).
//!
//! # Example
//!
//! ```rust
//! use bonded::graph::ExtensionGraph;
//!
//! let mut graph = ExtensionGraph::new();
//! graph.add_extension("flake8-bugbear", "flake8");
//! graph.add_extension("flake8-docstrings", "flake8");
//!
//! assert_eq!(graph.node_count(), 3);
//! assert_eq!(graph.extenders("flake8"), vec!["flake8-bugbear", "flake8-docstrings"]);
//! ```

mod extension_graph;

pub use extension_graph::{ExtensionGraph, ExtensionNode, NodeKind};
