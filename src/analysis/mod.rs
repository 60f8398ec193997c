//! Source code analysis module for bonded.
//!
//! This module finds out what a project actually uses: which top-level
//! modules its Python sources import, and which installed executables its
//! scripts and configuration files invoke.
//!
//! # Features
//!
//! - Tokenize Python source without a full parser ([`tokens`])
//! - Recover `import x.y`, `from x import y` and literal dynamic imports such
//!   as `importlib.import_module("x")` ([`imports`])
//! - Find word-bounded executable names in any project file ([`executables`])
//!
//! # Example
//!
//! ```
//! use bonded::analysis::scan_source;
//!
//! let imports = scan_source("from . import local\nfrom requests import get\n").unwrap();
//! assert_eq!(imports.modules.keys().collect::<Vec<_>>(), vec!["requests"]);
//! ```

pub mod executables;
pub mod imports;
pub mod tokens;

// Re-export main types for convenience
pub use executables::{detect_file_type, Executable, ExecutableInspection, Execution, FileType};
pub use imports::{
    inspect_imports, scan_file, scan_source, FileImports, ImportEvidence, ImportKind, ScanError,
    ScanResult, ScanSummary, KNOWN_DYNAMIC_LOADERS,
};
pub use tokens::{tokenize, Token, TokenError, TokenKind};
