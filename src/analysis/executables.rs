//! Search for invocations of installed executables.
//!
//! A package that is never imported may still be used through the command
//! it installs (`black`, `pytest`, `mypy` ...). Every project file is searched
//! line by line for each executable name as a whole word.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use regex::bytes::Regex;
use serde::Serialize;
use tracing::{debug, info};

/// Kind of file an executable was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Python,
    Shell,
    Ini,
    Yaml,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::Python => "python",
            FileType::Shell => "shell",
            FileType::Ini => "ini",
            FileType::Yaml => "yaml",
        };
        write!(f, "{name}")
    }
}

/// Classifies a file by its extension or by the interpreter named in its
/// shebang line.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use bonded::analysis::executables::{detect_file_type, FileType};
///
/// assert_eq!(detect_file_type(Path::new("tox.ini"), b"[tox]"), Some(FileType::Ini));
/// assert_eq!(
///     detect_file_type(Path::new("scripts/lint"), b"#!/usr/bin/env bash"),
///     Some(FileType::Shell)
/// );
/// assert_eq!(detect_file_type(Path::new("README"), b"hello"), None);
/// ```
pub fn detect_file_type(path: &Path, first_line: &[u8]) -> Option<FileType> {
    let interpreter = shebang_interpreter(first_line);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let is = |extensions: &[&str], interpreters: &[&str]| {
        extensions.contains(&extension)
            || interpreter
                .as_deref()
                .is_some_and(|name| interpreters.contains(&name))
    };

    if is(&["py"], &["python", "python2", "python3"]) {
        Some(FileType::Python)
    } else if is(
        &["sh", "bash", "zsh", "fish", "xosh"],
        &["sh", "bash", "zsh", "fish", "xosh"],
    ) {
        Some(FileType::Shell)
    } else if is(&["ini", "cfg"], &[]) {
        Some(FileType::Ini)
    } else if is(&["yaml", "yml"], &[]) {
        Some(FileType::Yaml)
    } else {
        None
    }
}

/// Interpreter name from a `#!` line, looking through `env`.
fn shebang_interpreter(first_line: &[u8]) -> Option<String> {
    let rest = first_line.strip_prefix(b"#!")?;
    let text = String::from_utf8_lossy(rest);
    let mut words = text.split_whitespace();
    let mut program = words.next()?;
    if program == "env" || program.ends_with("/env") {
        program = words.find(|w| !w.starts_with('-'))?;
    }
    program.rsplit('/').next().map(str::to_string)
}

/// One place an executable name was found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Execution {
    /// File name without its directory.
    pub file_name: String,
    pub file_type: Option<FileType>,
    pub line: usize,
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line)
    }
}

/// An executable installed by a declared package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Executable {
    pub name: String,
    pub found_executions: BTreeSet<Execution>,
}

impl Executable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            found_executions: BTreeSet::new(),
        }
    }

    pub fn is_used(&self) -> bool {
        !self.found_executions.is_empty()
    }
}

/// Usage table for a fixed set of executable names.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use bonded::analysis::executables::ExecutableInspection;
///
/// let mut inspection = ExecutableInspection::new(["black", "mypy"]);
/// inspection.inspect_source(Path::new("Makefile"), b"lint:\n\tblack --check .\n");
///
/// assert!(inspection.is_used("black"));
/// assert!(!inspection.is_used("mypy"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutableInspection {
    executables: BTreeMap<String, Executable>,
    searches: Vec<(String, Regex)>,
}

impl ExecutableInspection {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut executables = BTreeMap::new();
        for name in names {
            let name = name.into();
            executables.insert(name.clone(), Executable::new(name));
        }
        let searches = executables
            .keys()
            .filter_map(|name| {
                let pattern = format!(r"\b{}\b", regex::escape(name));
                match Regex::new(&pattern) {
                    Ok(search) => Some((name.clone(), search)),
                    Err(err) => {
                        debug!("Cannot search for executable {}: {}", name, err);
                        None
                    }
                }
            })
            .collect();
        Self {
            executables,
            searches,
        }
    }

    /// Searches every readable file in `files`. Unreadable files are skipped.
    pub fn inspect_files<I, P>(&mut self, files: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        if self.searches.is_empty() {
            return;
        }
        let mut inspected = 0usize;
        for path in files {
            let path = path.as_ref();
            match fs::read(path) {
                Ok(content) => {
                    self.inspect_source(path, &content);
                    inspected += 1;
                }
                Err(err) => debug!("Skipping {}: {}", path.display(), err),
            }
        }
        info!(
            "Searched {} files for {} executables, {} found",
            inspected,
            self.executables.len(),
            self.executables.values().filter(|e| e.is_used()).count()
        );
    }

    /// Searches one file's content.
    pub fn inspect_source(&mut self, path: &Path, content: &[u8]) {
        let mut lines = content.split(|b| *b == b'\n').peekable();
        let Some(first_line) = lines.peek() else {
            return;
        };
        let file_type = detect_file_type(path, first_line);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        for (idx, line) in lines.enumerate() {
            for (name, search) in &self.searches {
                if !search.is_match(line) {
                    continue;
                }
                debug!("Found executable {} in {}:{}", name, path.display(), idx + 1);
                if let Some(executable) = self.executables.get_mut(name) {
                    executable.found_executions.insert(Execution {
                        file_name: file_name.clone(),
                        file_type,
                        line: idx + 1,
                    });
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Executable> {
        self.executables.get(name)
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.get(name).is_some_and(Executable::is_used)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Executable> {
        self.executables.values()
    }

    pub fn len(&self) -> usize {
        self.executables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect_file_type(Path::new("a.py"), b""), Some(FileType::Python));
        assert_eq!(detect_file_type(Path::new("run.sh"), b"echo"), Some(FileType::Shell));
        assert_eq!(detect_file_type(Path::new("setup.cfg"), b""), Some(FileType::Ini));
        assert_eq!(
            detect_file_type(Path::new(".pre-commit-config.yaml"), b"repos:"),
            Some(FileType::Yaml)
        );
        assert_eq!(detect_file_type(Path::new("Makefile"), b"all:"), None);
    }

    #[test]
    fn test_detect_by_shebang() {
        assert_eq!(
            detect_file_type(Path::new("manage"), b"#!/usr/bin/python3"),
            Some(FileType::Python)
        );
        assert_eq!(
            detect_file_type(Path::new("tool"), b"#! /usr/bin/env -S python3 -u"),
            Some(FileType::Python)
        );
        assert_eq!(
            detect_file_type(Path::new("ci"), b"#!/bin/zsh -e"),
            Some(FileType::Shell)
        );
        assert_eq!(detect_file_type(Path::new("x"), b"#!/usr/bin/env"), None);
    }

    #[test]
    fn test_word_boundaries() {
        let mut inspection = ExecutableInspection::new(["black", "isort"]);
        inspection.inspect_source(
            Path::new("tox.ini"),
            b"[testenv:lint]\ncommands =\n    blackened\n    python -m isort .\n",
        );
        assert!(!inspection.is_used("black"));
        let isort = inspection.get("isort").unwrap();
        assert_eq!(
            isort.found_executions.iter().next(),
            Some(&Execution {
                file_name: "tox.ini".to_string(),
                file_type: Some(FileType::Ini),
                line: 4,
            })
        );
    }

    #[test]
    fn test_names_with_punctuation() {
        let mut inspection = ExecutableInspection::new(["pip3.12", "flake8"]);
        inspection.inspect_source(Path::new("run.sh"), b"pip3x12 install\nflake8 src\n");
        assert!(!inspection.is_used("pip3.12"));
        assert!(inspection.is_used("flake8"));
    }

    #[test]
    fn test_inspect_files() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("lint");
        fs::write(&script, "#!/bin/bash\nmypy src\n").unwrap();

        let mut inspection = ExecutableInspection::new(["mypy"]);
        inspection.inspect_files([script, dir.path().join("missing")]);

        let mypy = inspection.get("mypy").unwrap();
        let execution = mypy.found_executions.iter().next().unwrap();
        assert_eq!(execution.file_type, Some(FileType::Shell));
        assert_eq!(execution.line, 2);
    }
}
