//! Parser module for bonded.
//!
//! This module reads the places a Python project declares its dependencies
//! and turns dependency specifiers into [`Requirement`]s.
//!
//! # Supported Formats
//!
//! - **pyproject.toml** (`[project]`, `[build-system]`, `[tool.bonded]`)
//! - **setup.cfg** (`options.install_requires`, `options.extras_require`)
//! - **requirements.txt** (pip style, with `-r` includes)
//! - **entry_points.txt** and other INI files found in installed metadata
//!
//! # Example
//!
//! ```
//! use bonded::parser::{pyproject, Requirement};
//!
//! let pyproject = pyproject::parse_str(r#"
//! [project]
//! dependencies = ["requests[socks]>=2 ; python_version >= '3.8'"]
//! "#).unwrap();
//!
//! let reqs: Vec<Requirement> = pyproject
//!     .requirement_specs()
//!     .into_iter()
//!     .map(|spec| spec.parse().unwrap())
//!     .collect();
//! assert_eq!(reqs[0].normalized_name(), "requests");
//! ```

mod error;
pub mod ini;
pub mod markers;
pub mod pyproject;
pub mod requirement;
pub mod requirements_txt;
pub mod setup_cfg;

// Re-export commonly used types for convenience
pub use error::{ParseError, ParseResult};
pub use markers::{EnvironmentMarker, MarkerEnvironment};
pub use pyproject::PyProject;
pub use requirement::{canonicalize_name, Requirement};
