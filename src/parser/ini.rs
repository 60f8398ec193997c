//! Minimal reader for the INI dialect used by `setup.cfg` and
//! `entry_points.txt`.
//!
//! Supports `[section]` headers, `key = value` / `key: value` pairs, `#` and
//! `;` comment lines, and indented continuation lines which are appended to
//! the previous value separated by newlines.

use std::collections::BTreeMap;

use super::error::{ParseError, ParseResult};

/// Parsed INI document: section name → key → value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniDocument {
    pub fn parse(content: &str) -> ParseResult<Self> {
        let mut doc = IniDocument::default();
        let mut section: Option<String> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if raw.starts_with(char::is_whitespace) {
                if let (Some(section), Some(key)) = (&section, &last_key) {
                    if let Some(value) = doc
                        .sections
                        .get_mut(section)
                        .and_then(|entries| entries.get_mut(key))
                    {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            if let Some(name) = trimmed.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| ParseError::Ini {
                    line: line_no,
                    reason: format!("unterminated section header {trimmed:?}"),
                })?;
                let name = name.trim().to_string();
                doc.sections.entry(name.clone()).or_default();
                section = Some(name);
                last_key = None;
                continue;
            }

            let Some(current) = &section else {
                return Err(ParseError::Ini {
                    line: line_no,
                    reason: "key outside of any section".to_string(),
                });
            };

            let delimiter = trimmed.find(&['=', ':'][..]).ok_or_else(|| ParseError::Ini {
                line: line_no,
                reason: format!("expected `key = value`, found {trimmed:?}"),
            })?;
            let key = trimmed[..delimiter].trim().to_string();
            let value = trimmed[delimiter + 1..].trim().to_string();
            doc.sections
                .entry(current.clone())
                .or_default()
                .insert(key.clone(), value);
            last_key = Some(key);
        }

        Ok(doc)
    }

    /// Entries of `section`, if present.
    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
        self.sections.iter().map(|(name, entries)| (name.as_str(), entries))
    }
}

/// Splits a multi-line INI value into its non-empty, comment-free lines.
pub fn value_lines(value: &str) -> impl Iterator<Item = &str> {
    value
        .lines()
        .map(|line| match line.find(" #") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_POINTS: &str = "\
[console_scripts]
black = black:patched_main
blackd = blackd:patched_main [d]

[pytest11]
cov = pytest_cov.plugin
";

    #[test]
    fn test_sections_and_keys() {
        let doc = IniDocument::parse(ENTRY_POINTS).unwrap();
        assert_eq!(doc.get("console_scripts", "black"), Some("black:patched_main"));
        assert_eq!(
            doc.get("console_scripts", "blackd"),
            Some("blackd:patched_main [d]")
        );
        assert_eq!(doc.get("pytest11", "cov"), Some("pytest_cov.plugin"));
        assert_eq!(doc.sections().count(), 2);
    }

    #[test]
    fn test_continuation_lines() {
        let doc = IniDocument::parse(
            "[options]\ninstall_requires =\n    requests\n    # comment\n    click>=8\n",
        )
        .unwrap();
        let value = doc.get("options", "install_requires").unwrap();
        assert_eq!(value, "requests\nclick>=8");
        assert_eq!(value_lines(value).collect::<Vec<_>>(), vec!["requests", "click>=8"]);
    }

    #[test]
    fn test_colon_delimiter() {
        let doc = IniDocument::parse("[metadata]\nname: demo\n").unwrap();
        assert_eq!(doc.get("metadata", "name"), Some("demo"));
    }

    #[test]
    fn test_errors() {
        assert!(IniDocument::parse("key = value\n").is_err());
        assert!(IniDocument::parse("[broken\n").is_err());
        assert!(IniDocument::parse("[ok]\nno delimiter here\n").is_err());
    }

    #[test]
    fn test_inline_comment_in_value_lines() {
        let lines: Vec<_> = value_lines("numpy  # arrays\n\nscipy").collect();
        assert_eq!(lines, vec!["numpy", "scipy"]);
    }
}
