//! Parser for pip-style requirement files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{ParseError, ParseResult};

/// Reads a requirements file and every file it includes with `-r`.
///
/// Blank lines, `#` comments and option lines (`-e`, `--index-url`, ...) are
/// skipped; lines ending in `\` are joined with the next one. Included paths
/// are resolved relative to the including file. Each file is read at most
/// once, so include cycles terminate. A missing included file is warned about
/// and skipped; a missing top-level file is an error.
pub fn read_requirements(path: &Path) -> ParseResult<Vec<String>> {
    let mut visited = HashSet::new();
    let mut specs = Vec::new();
    let content = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    visited.insert(canonical(path));
    collect(path, &content, &mut visited, &mut specs);
    Ok(specs)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn collect(path: &Path, content: &str, visited: &mut HashSet<PathBuf>, specs: &mut Vec<String>) {
    for line in logical_lines(content) {
        if let Some(include) = include_target(&line) {
            let included = path
                .parent()
                .map(|dir| dir.join(include))
                .unwrap_or_else(|| PathBuf::from(include));
            if !visited.insert(canonical(&included)) {
                debug!("Skipping already read requirements file {}", included.display());
                continue;
            }
            match fs::read_to_string(&included) {
                Ok(nested) => collect(&included, &nested, visited, specs),
                Err(err) => warn!(
                    "Cannot read requirements file {} included from {}: {}",
                    included.display(),
                    path.display(),
                    err
                ),
            }
            continue;
        }
        if line.starts_with('-') {
            continue;
        }
        match egg_name(&line) {
            Some(name) => specs.push(name.to_string()),
            None => specs.push(line),
        }
    }
}

/// Joins continuation lines and strips comments and surrounding whitespace.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    for raw in content.lines() {
        let without_comment = if raw.trim_start().starts_with('#') {
            ""
        } else {
            match raw.find(" #").or_else(|| raw.find("\t#")) {
                Some(idx) => &raw[..idx],
                None => raw,
            }
        };
        if let Some(continued) = without_comment.trim_end().strip_suffix('\\') {
            pending.push_str(continued);
            continue;
        }
        pending.push_str(without_comment);
        let line = pending.trim().to_string();
        pending.clear();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    let line = pending.trim().to_string();
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Name given by a `#egg=<name>` fragment on a URL or VCS line.
fn egg_name(line: &str) -> Option<&str> {
    let (_, fragment) = line.split_once("#egg=")?;
    let name = fragment
        .split(|c: char| c == '&' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    (!name.is_empty()).then_some(name)
}

fn include_target(line: &str) -> Option<&str> {
    let target = if let Some(rest) = line.strip_prefix("--requirement") {
        rest.trim_start_matches('=')
    } else {
        line.strip_prefix("-r")?
    };
    let target = target.trim();
    (!target.is_empty()).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_comments_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(
            &path,
            "# pinned\n\nrequests==2.31  # http\n--index-url https://example.org\n-e .\nclick\\\n>=8\n",
        )
        .unwrap();

        let specs = read_requirements(&path).unwrap();
        assert_eq!(specs, vec!["requests==2.31", "click>=8"]);
    }

    #[test]
    fn test_follows_includes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("reqs")).unwrap();
        fs::write(
            dir.path().join("requirements.txt"),
            "-r reqs/base.txt\n--requirement=reqs/dev.txt\nblack\n",
        )
        .unwrap();
        fs::write(dir.path().join("reqs/base.txt"), "requests\n").unwrap();
        fs::write(dir.path().join("reqs/dev.txt"), "pytest\n").unwrap();

        let specs = read_requirements(&dir.path().join("requirements.txt")).unwrap();
        assert_eq!(specs, vec!["requests", "pytest", "black"]);
    }

    #[test]
    fn test_include_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "-r b.txt\nalpha\n").unwrap();
        fs::write(dir.path().join("b.txt"), "-r a.txt\nbeta\n").unwrap();

        let specs = read_requirements(&dir.path().join("a.txt")).unwrap();
        assert_eq!(specs, vec!["beta", "alpha"]);
    }

    #[test]
    fn test_missing_include_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "-r missing.txt\nalpha\n").unwrap();

        let specs = read_requirements(&dir.path().join("a.txt")).unwrap();
        assert_eq!(specs, vec!["alpha"]);
    }

    #[test]
    fn test_url_lines_declare_only_named_packages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(
            &path,
            "requests\nhttps://example.com/pkgs/foo-1.0-py3-none-any.whl\ngit+https://github.com/org/bar.git#egg=bar\n",
        )
        .unwrap();

        let specs = read_requirements(&path).unwrap();
        assert_eq!(specs[2], "bar");

        let names: Vec<_> = specs
            .iter()
            .filter_map(|spec| crate::parser::requirement::Requirement::parse(spec).ok())
            .map(|req| req.name)
            .collect();
        assert_eq!(names, vec!["requests", "bar"]);
    }

    #[test]
    fn test_missing_top_level_file_is_an_error() {
        assert!(read_requirements(Path::new("/nonexistent/requirements.txt")).is_err());
    }
}
