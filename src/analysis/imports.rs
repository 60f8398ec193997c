//! Import discovery over a Python token stream.
//!
//! The scanner walks the tokens produced by [`super::tokens::tokenize`] with a
//! small state machine and records the top-level module of every absolute
//! `import` / `from ... import` statement and of every recognized dynamic
//! loader call that receives a single literal module name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::tokens::{tokenize, OpKind, Token, TokenError, TokenKind};
use crate::registry::ModuleRegistry;

/// Function names that import the module named by their first argument.
pub const KNOWN_DYNAMIC_LOADERS: &[&str] = &[
    "__import__",
    "import_module",
    "run_module",
    // pytest helper
    "importorskip",
];

/// Errors that can occur while scanning a source file.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Found {path} but cannot tokenize it: {source}")]
    Tokenize {
        path: PathBuf,
        #[source]
        source: TokenError,
    },

    #[error("Found {path} but cannot parse it: {reason} at line {line}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Result type for scanning operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// How a module was found to be imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// A written `import` or `from ... import` statement.
    Statement,
    /// A call to one of [`KNOWN_DYNAMIC_LOADERS`].
    Dynamic,
}

/// Evidence collected for one module within one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportEvidence {
    pub statement: bool,
    pub dynamic: bool,
}

impl ImportEvidence {
    /// The strongest evidence kind. Statements outrank dynamic calls.
    pub fn kind(&self) -> Option<ImportKind> {
        if self.statement {
            Some(ImportKind::Statement)
        } else if self.dynamic {
            Some(ImportKind::Dynamic)
        } else {
            None
        }
    }
}

/// Top-level modules referenced by a single source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileImports {
    pub modules: BTreeMap<String, ImportEvidence>,
}

impl FileImports {
    fn record(&mut self, name: &str, kind: ImportKind) {
        let evidence = self.modules.entry(name.to_string()).or_default();
        match kind {
            ImportKind::Statement => evidence.statement = true,
            ImportKind::Dynamic => evidence.dynamic = true,
        }
    }

    /// Returns the strongest evidence kind recorded for `name`.
    pub fn kind_of(&self, name: &str) -> Option<ImportKind> {
        self.modules.get(name).and_then(ImportEvidence::kind)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }
}

/// Outcome of scanning a batch of files.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Number of files that were scanned successfully.
    pub scanned: usize,
    /// Files that contributed no evidence because they could not be scanned.
    pub failures: Vec<ScanError>,
}

/// Scans every file and records its imports in `registry`.
///
/// Unreadable or unparsable files are warned about and skipped; they never
/// abort the batch.
pub fn inspect_imports<I, P>(registry: &mut ModuleRegistry, files: I) -> ScanSummary
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut summary = ScanSummary::default();
    for file in files {
        let path = file.as_ref();
        match scan_file(path) {
            Ok(imports) => {
                for (name, evidence) in &imports.modules {
                    if evidence.statement {
                        registry.record(name, ImportKind::Statement);
                        debug!("Module {} was found imported in {}", name, path.display());
                    }
                    if evidence.dynamic {
                        registry.record(name, ImportKind::Dynamic);
                        debug!(
                            "Module {} was found dynamically imported in {}",
                            name,
                            path.display()
                        );
                    }
                }
                summary.scanned += 1;
            }
            Err(err) => {
                warn!("{}", err);
                summary.failures.push(err);
            }
        }
    }
    info!(
        "Scanned {} source files ({} unparsable), {} modules known",
        summary.scanned,
        summary.failures.len(),
        registry.len()
    );
    summary
}

/// Scans a single file on disk.
pub fn scan_file(path: &Path) -> ScanResult<FileImports> {
    let bytes = fs::read(path).map_err(|source| ScanError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let source = match String::from_utf8(bytes) {
        Ok(source) => source,
        Err(err) => {
            // import syntax is ASCII, so other encodings still yield their imports
            debug!("{} is not valid UTF-8, decoding lossily", path.display());
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    scan_source_at(&source, path)
}

/// Scans source text that did not come from a file.
///
/// # Example
///
/// ```
/// use bonded::analysis::imports::{scan_source, ImportKind};
///
/// let imports = scan_source("import foo.bar as baz\n__import__('qux')\n").unwrap();
/// assert_eq!(imports.kind_of("foo"), Some(ImportKind::Statement));
/// assert_eq!(imports.kind_of("qux"), Some(ImportKind::Dynamic));
/// assert_eq!(imports.kind_of("bar"), None);
/// ```
pub fn scan_source(source: &str) -> ScanResult<FileImports> {
    scan_source_at(source, Path::new("<string>"))
}

fn scan_source_at(source: &str, path: &Path) -> ScanResult<FileImports> {
    let tokens = tokenize(source).map_err(|source| ScanError::Tokenize {
        path: path.to_path_buf(),
        source,
    })?;
    ImportScanner::new(&tokens, path).run()
}

/// States of the import scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    InImportStatement,
    InFromClause,
    InDynamicCallArgs,
    SkippingToStatementEnd,
}

/// Token iterator with a single slot of pushback.
struct TokenCursor<'t> {
    tokens: std::slice::Iter<'t, Token>,
    pushed: Option<&'t Token>,
    last_line: usize,
}

impl<'t> TokenCursor<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens: tokens.iter(),
            pushed: None,
            last_line: 1,
        }
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.pushed.take().or_else(|| self.tokens.next())?;
        self.last_line = token.line;
        Some(token)
    }

    /// Next token that carries syntax (skips comments, NL, indentation).
    fn next_significant(&mut self) -> Option<&'t Token> {
        loop {
            let token = self.next()?;
            if !token.is_trivia() {
                return Some(token);
            }
        }
    }

    fn push_back(&mut self, token: &'t Token) {
        debug_assert!(self.pushed.is_none());
        self.pushed = Some(token);
    }
}

struct ImportScanner<'t> {
    cursor: TokenCursor<'t>,
    path: &'t Path,
    state: ScanState,
    found: FileImports,
}

impl<'t> ImportScanner<'t> {
    fn new(tokens: &'t [Token], path: &'t Path) -> Self {
        Self {
            cursor: TokenCursor::new(tokens),
            path,
            state: ScanState::Scanning,
            found: FileImports::default(),
        }
    }

    fn run(mut self) -> ScanResult<FileImports> {
        loop {
            self.state = match self.state {
                ScanState::Scanning => match self.cursor.next() {
                    None => break,
                    Some(token) => self.dispatch(token),
                },
                ScanState::InImportStatement => self.import_statement()?,
                ScanState::InFromClause => self.from_clause()?,
                ScanState::InDynamicCallArgs => self.dynamic_call_args(),
                ScanState::SkippingToStatementEnd => self.skip_to_statement_end()?,
            };
        }
        Ok(self.found)
    }

    fn dispatch(&mut self, token: &'t Token) -> ScanState {
        if token.kind != TokenKind::Name {
            return ScanState::Scanning;
        }
        match token.text.as_str() {
            // `raise X from Y` and `yield from it` are not imports
            "raise" | "yield" => ScanState::SkippingToStatementEnd,
            "import" => ScanState::InImportStatement,
            "from" => ScanState::InFromClause,
            name if KNOWN_DYNAMIC_LOADERS.contains(&name) => match self.cursor.next() {
                Some(next) if next.is_op(OpKind::LPar) => ScanState::InDynamicCallArgs,
                Some(next) => {
                    self.cursor.push_back(next);
                    ScanState::Scanning
                }
                None => ScanState::Scanning,
            },
            _ => ScanState::Scanning,
        }
    }

    fn failure(&self, reason: impl Into<String>) -> ScanError {
        ScanError::Parse {
            path: self.path.to_path_buf(),
            line: self.cursor.last_line,
            reason: reason.into(),
        }
    }

    fn expect_token(&mut self) -> ScanResult<&'t Token> {
        self.cursor
            .next_significant()
            .ok_or_else(|| self.failure("unexpected end of input"))
    }

    /// Records the module named by `token`, the first token of a dotted path.
    ///
    /// Returns false for relative references, which are not recorded.
    fn record_statement_target(&mut self, token: &'t Token) -> ScanResult<bool> {
        if token.is_op(OpKind::Dot) || token.is_op(OpKind::Ellipsis) {
            return Ok(false);
        }
        if token.kind != TokenKind::Name {
            return Err(self.failure(format!("expected a module name, found {:?}", token.text)));
        }
        self.found.record(&token.text, ImportKind::Statement);
        Ok(true)
    }

    /// `import a.b as c, d` up to the end of the statement.
    fn import_statement(&mut self) -> ScanResult<ScanState> {
        let first = self.expect_token()?;
        self.record_statement_target(first)?;
        loop {
            let token = self.expect_token()?;
            if token.ends_statement() {
                return Ok(ScanState::Scanning);
            }
            if token.is_op(OpKind::Comma) {
                let next = self.expect_token()?;
                self.record_statement_target(next)?;
            }
        }
    }

    /// `from a.b import ...` up to the end of the statement.
    fn from_clause(&mut self) -> ScanResult<ScanState> {
        let mut token = self.expect_token()?;
        if token.is_op(OpKind::LPar) {
            token = self.expect_token()?;
        }
        self.record_statement_target(token)?;
        // a single `from` names exactly one module; the member list is irrelevant
        Ok(ScanState::SkippingToStatementEnd)
    }

    /// Arguments of a recognized loader call, just after the open paren.
    fn dynamic_call_args(&mut self) -> ScanState {
        let Some(argument) = self.cursor.next_significant() else {
            return ScanState::Scanning;
        };
        if argument.kind != TokenKind::String {
            self.cursor.push_back(argument);
            return ScanState::Scanning;
        }
        let Some(follow) = self.cursor.next_significant() else {
            return ScanState::Scanning;
        };
        // anything but `,` or `)` means the literal is only part of the argument
        if follow.is_op(OpKind::Comma) || follow.is_op(OpKind::RPar) {
            if let Some(value) = literal_value(&argument.text) {
                if let Some(top) = top_level(&value) {
                    self.found.record(top, ImportKind::Dynamic);
                }
            }
        }
        self.cursor.push_back(follow);
        ScanState::Scanning
    }

    fn skip_to_statement_end(&mut self) -> ScanResult<ScanState> {
        loop {
            let token = self.cursor.next().ok_or_else(|| self.failure("unexpected end of input"))?;
            if token.ends_statement() {
                return Ok(ScanState::Scanning);
            }
            if token.kind == TokenKind::EndMarker {
                return Err(self.failure("statement is never terminated"));
            }
        }
    }
}

/// Returns the value of a string literal token, or `None` when the value
/// cannot be known statically or names a relative module.
///
/// # Example
///
/// ```
/// use bonded::analysis::imports::literal_value;
///
/// assert_eq!(literal_value("Rb'foo'"), Some("foo".to_string()));
/// assert_eq!(literal_value("'''foo'''"), Some("foo".to_string()));
/// assert_eq!(literal_value("f'{name}'"), None);
/// assert_eq!(literal_value("'.sibling'"), None);
/// ```
pub fn literal_value(literal: &str) -> Option<String> {
    let mut value = literal;
    while let Some(first) = value.chars().next() {
        match first.to_ascii_lowercase() {
            'f' => return None,
            'r' | 'b' | 'u' => value = &value[1..],
            _ => break,
        }
    }

    let chars: Vec<char> = value.chars().collect();
    let n = chars.len();
    let inner: String = if n >= 6
        && chars[0] == chars[1]
        && chars[1] == chars[2]
        && chars[2] == chars[n - 1]
        && chars[n - 1] == chars[n - 2]
        && chars[n - 2] == chars[n - 3]
    {
        chars[3..n - 3].iter().collect()
    } else if n >= 2 {
        chars[1..n - 1].iter().collect()
    } else {
        return None;
    };

    if inner.is_empty() || inner.starts_with('.') {
        return None;
    }
    Some(inner)
}

fn top_level(dotted: &str) -> Option<&str> {
    dotted
        .split('.')
        .next()
        .map(str::trim)
        .filter(|name| is_identifier(name))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn names(source: &str) -> BTreeSet<String> {
        scan_source(source).unwrap().modules.keys().cloned().collect()
    }

    fn only(source: &str, expected: &str, kind: ImportKind) {
        let imports = scan_source(source).unwrap();
        assert_eq!(imports.len(), 1, "{source:?} produced {:?}", imports.modules);
        assert_eq!(imports.kind_of(expected), Some(kind), "{source:?}");
    }

    #[test]
    fn test_import_statement() {
        for source in [
            "import foo",
            "import foo.bar",
            "import foo as qux",
            "import foo.bar as qux",
            "from foo import bar",
            "from foo.bar import baz",
            "from foo.bar import (baz.qux)",
            "from foo import (bar as baz)",
            "from foo import bar, baz",
            "from foo import (bar, \nbaz)",
            "from foo import *",
            "from (foo) import bar",
            "yield from inner; import foo",
            "yield from inner; from foo import bar",
            "raise RuntimeError from SyntaxError; import foo",
        ] {
            only(source, "foo", ImportKind::Statement);
        }
    }

    #[test]
    fn test_multi_import() {
        for source in [
            "import foo, bar as baz, qux.xuq",
            "import foo; import bar as baz; import qux.xuq",
            "from foo import baz as foo; from bar import *; from qux import xuq",
        ] {
            let imports = scan_source(source).unwrap();
            assert_eq!(imports.len(), 3, "{source:?}");
            for name in ["foo", "bar", "qux"] {
                assert_eq!(imports.kind_of(name), Some(ImportKind::Statement));
            }
        }
    }

    #[test]
    fn test_ignored_import() {
        for source in [
            "from . import foo",
            "from .. import foo",
            "from .foo import bar",
            "from .foo.bar import baz",
            "from ...foo.bar import baz",
            "from .foo",
            "yield from inner",
            "raise RuntimeError from SyntaxError",
        ] {
            assert!(names(source).is_empty(), "{source:?}");
        }
    }

    #[test]
    fn test_dynamic_import() {
        for source in [
            "__import__('foo')",
            "import_module('foo')",
            "importlib.import_module('foo.bar')",
            "run_module('foo')",
            "pytest.importorskip('foo', minversion='1.0')",
            "__import__(r'foo')",
            "__import__(B\"foo\")",
            "__import__('''foo''')",
            "__import__(\"\"\"foo\"\"\",)",
        ] {
            only(source, "foo", ImportKind::Dynamic);
        }
    }

    #[test]
    fn test_lookalike_dynamic_import() {
        for source in [
            "__import__(42)",
            "import_module = 'foo'",
            "run_module.__name__",
            "import_module(name, 'pkg')",
            "def import_module(name): pass",
        ] {
            assert!(names(source).is_empty(), "{source:?}");
        }
    }

    #[test]
    fn test_non_literal_dynamic_arguments() {
        for source in [
            "__import__('fo' 'o')",
            "__import__('foo' + suffix)",
            "__import__('{}'.format(x))",
            "__import__(f'{prefix}foo')",
            "__import__('.relative')",
            "__import__('')",
            "__import__('foo bar')",
            "import_module('foo-bar.baz')",
            "__import__('3d')",
        ] {
            assert!(names(source).is_empty(), "{source:?}");
        }
    }

    #[test]
    fn test_statement_and_dynamic_import() {
        for source in [
            "import foo; __import__('foo')",
            "from foo import bar; import_module('foo')",
            "import foo as bar; run_module('foo')",
        ] {
            let imports = scan_source(source).unwrap();
            let evidence = imports.modules["foo"];
            assert!(evidence.statement && evidence.dynamic, "{source:?}");
            assert_eq!(evidence.kind(), Some(ImportKind::Statement));
        }
    }

    #[test]
    fn test_multiline_import() {
        for source in [
            "import \\\nfoo, \\\n baz",
            "from foo import (\nbar,\n); import baz",
            "from \\\nfoo import (\nbar,\n); import baz",
            "__import__(\\\n'foo'\\\n) and \\\n import_module('baz')",
            "__import__(\n'foo'\n) and (\n import_module('baz')\n)",
        ] {
            let found = names(source);
            assert!(found.contains("foo"), "{source:?}");
            assert!(found.contains("baz"), "{source:?}");
        }
    }

    #[test]
    fn test_stdlib_imports() {
        for source in [
            "import sys, os",
            "from sys import path; from os import environ",
            "import sys.path, os.environ",
            "import sys as requests, os as six",
        ] {
            let found = names(source);
            assert_eq!(
                found,
                BTreeSet::from(["os".to_string(), "sys".to_string()]),
                "{source:?}"
            );
        }
    }

    #[test]
    fn test_nested_and_indented_imports() {
        let source = "def f():\n    import foo\n    if x:\n        from bar import baz\n";
        let found = names(source);
        assert!(found.contains("foo"));
        assert!(found.contains("bar"));
    }

    #[test]
    fn test_comments_and_strings_are_not_imports() {
        let source = "# import foo\nx = 'import bar'\n\"\"\"\nfrom baz import qux\n\"\"\"\n";
        assert!(names(source).is_empty());
    }

    #[test]
    fn test_unparsable_python() {
        for source in [
            "[1, 2, 3",
            "varible = \"\"\"finish this later",
            "import ",
            "from ",
            "import 42",
            "from \"this\" import zen",
        ] {
            assert!(scan_source(source).is_err(), "{source:?}");
        }
    }

    #[test]
    fn test_literal_value_prefixes() {
        assert_eq!(literal_value("'foo'"), Some("foo".to_string()));
        assert_eq!(literal_value("u'foo'"), Some("foo".to_string()));
        assert_eq!(literal_value("BR\"foo\""), Some("foo".to_string()));
        assert_eq!(literal_value("\"\"\"foo\"\"\""), Some("foo".to_string()));
        assert_eq!(literal_value("F'foo'"), None);
        assert_eq!(literal_value("rf'foo'"), None);
    }

    #[test]
    fn test_inspect_imports_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.py");
        let bad = dir.path().join("bad.py");
        fs::write(&good, "import requests\n__import__('yaml')\n").unwrap();
        fs::write(&bad, "import numpy\n[1, 2, 3").unwrap();

        let mut registry = ModuleRegistry::new();
        let summary = inspect_imports(&mut registry, [&good, &bad]);

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(registry.get("requests").unwrap().found_via_static_statement);
        assert!(registry.get("yaml").unwrap().found_via_dynamic_call);
        assert!(registry.get("numpy").is_none());
    }

    #[test]
    fn test_non_utf8_file_is_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.py");
        let mut content = b"# -*- coding: latin-1 -*-\nname = '".to_vec();
        content.extend_from_slice(&[0x63, 0x61, 0x66, 0xe9]);
        content.extend_from_slice(b"'\nimport requests\n");
        fs::write(&path, content).unwrap();

        let imports = scan_file(&path).unwrap();
        assert_eq!(imports.kind_of("requests"), Some(ImportKind::Statement));
    }

    #[test]
    fn test_missing_file_is_a_failure() {
        let mut registry = ModuleRegistry::new();
        let summary = inspect_imports(&mut registry, [Path::new("/nonexistent/file.py")]);
        assert_eq!(summary.scanned, 0);
        assert!(matches!(summary.failures[0], ScanError::FileRead { .. }));
    }
}
