//! Parser for legacy `setup.cfg` files.

use std::fs;
use std::path::Path;

use super::error::{ParseError, ParseResult};
use super::ini::{value_lines, IniDocument};

/// Returns every dependency specifier declared in `options.install_requires`
/// and in the groups of `[options.extras_require]`.
///
/// # Example
///
/// ```
/// use bonded::parser::setup_cfg::requirement_specs;
///
/// let specs = requirement_specs("
/// [options]
/// install_requires =
///     requests>=2
///     click
///
/// [options.extras_require]
/// test = pytest
/// ").unwrap();
/// assert_eq!(specs, vec!["requests>=2", "click", "pytest"]);
/// ```
pub fn requirement_specs(content: &str) -> ParseResult<Vec<String>> {
    let doc = IniDocument::parse(content)?;
    let mut specs = Vec::new();

    if let Some(install_requires) = doc.get("options", "install_requires") {
        specs.extend(spec_lines(install_requires));
    }
    if let Some(extras) = doc.section("options.extras_require") {
        for group in extras.values() {
            specs.extend(spec_lines(group));
        }
    }
    Ok(specs)
}

/// Reads a `setup.cfg` file and returns its dependency specifiers.
pub fn parse_file(path: &Path) -> ParseResult<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    requirement_specs(&content)
}

fn spec_lines(value: &str) -> impl Iterator<Item = String> + '_ {
    value_lines(value)
        // `file:` directives point at other files and are not specifiers
        .filter(|line| !line.starts_with("file:"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_extras() {
        let specs = requirement_specs(
            "[metadata]\nname = demo\n\n[options]\npackages = find:\ninstall_requires =\n    requests\n    tomli; python_version < '3.11'\n\n[options.extras_require]\ndev =\n    black\n    mypy\ntest = pytest\n",
        )
        .unwrap();
        assert_eq!(
            specs,
            vec![
                "requests",
                "tomli; python_version < '3.11'",
                "black",
                "mypy",
                "pytest"
            ]
        );
    }

    #[test]
    fn test_no_options() {
        let specs = requirement_specs("[metadata]\nname = demo\n").unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_file_directive_is_skipped() {
        let specs =
            requirement_specs("[options]\ninstall_requires = file: requirements.txt\n").unwrap();
        assert!(specs.is_empty());
    }
}
