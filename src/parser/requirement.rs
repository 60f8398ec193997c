//! Dependency specifiers (`name[extras] version ; marker`, `name @ url`).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::error::{ParseError, ParseResult};
use super::markers::EnvironmentMarker;

/// A single parsed dependency specifier.
///
/// Only the name is used to identify the package; the version clause is kept
/// for display and the marker decides whether the package applies to the
/// current environment.
///
/// # Example
///
/// ```
/// use bonded::parser::Requirement;
///
/// let req: Requirement = "Foo_Bar[test]>=1.0 ; python_version < '3.11'".parse().unwrap();
/// assert_eq!(req.name, "Foo_Bar");
/// assert_eq!(req.normalized_name(), "foo-bar");
/// assert_eq!(req.extras, vec!["test".to_string()]);
/// assert_eq!(req.version.as_deref(), Some(">=1.0"));
/// assert!(req.marker.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub marker: Option<EnvironmentMarker>,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)").expect("valid name regex")
    })
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-_.]+").expect("valid separator regex"))
}

/// Canonical form of a package name: lowercase, runs of `-`, `_`, `.`
/// collapsed to a single `-`.
///
/// # Example
///
/// ```
/// use bonded::parser::canonicalize_name;
///
/// assert_eq!(canonicalize_name("Typing_Extensions"), "typing-extensions");
/// assert_eq!(canonicalize_name("zope.interface"), "zope-interface");
/// assert_eq!(canonicalize_name("A--B__c"), "a-b-c");
/// ```
pub fn canonicalize_name(name: &str) -> String {
    separator_pattern()
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

impl Requirement {
    pub fn parse(spec: &str) -> ParseResult<Self> {
        let spec = spec.trim();
        let invalid = || ParseError::InvalidRequirement(spec.to_string());

        let name = name_pattern()
            .find(spec)
            .map(|m| m.as_str().to_string())
            .ok_or_else(invalid)?;
        let mut rest = spec[name.len()..].trim_start();

        let mut extras = Vec::new();
        if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket.find(']').ok_or_else(invalid)?;
            extras = after_bracket[..close]
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
            rest = after_bracket[close + 1..].trim_start();
        }

        let (body, marker) = split_marker(rest);
        let marker = match marker {
            Some(text) if !text.trim().is_empty() => Some(EnvironmentMarker::parse(text)?),
            _ => None,
        };
        let body = body.trim();

        let (version, url) = if let Some(url) = body.strip_prefix('@') {
            let url = url.trim();
            if url.is_empty() {
                return Err(invalid());
            }
            (None, Some(url.to_string()))
        } else if body.is_empty() {
            (None, None)
        } else if body.starts_with(is_specifier_start) {
            (Some(body.to_string()), None)
        } else {
            return Err(invalid());
        };

        Ok(Self {
            name,
            extras,
            version,
            url,
            marker,
        })
    }

    pub fn normalized_name(&self) -> String {
        canonicalize_name(&self.name)
    }
}

/// A version body is an operator-led specifier list, optionally parenthesized.
fn is_specifier_start(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '!' | '~' | '^' | '*' | '(')
}

/// Splits `rest` into the specifier body and the marker clause.
///
/// A URL may itself contain `;`, so after `@` the marker separator must be
/// preceded by whitespace.
fn split_marker(rest: &str) -> (&str, Option<&str>) {
    if rest.starts_with('@') {
        for (idx, _) in rest.match_indices(';') {
            if rest[..idx].ends_with(char::is_whitespace) {
                return (&rest[..idx], Some(&rest[idx + 1..]));
            }
        }
        (rest, None)
    } else {
        match rest.split_once(';') {
            Some((body, marker)) => (body, Some(marker)),
            None => (rest, None),
        }
    }
}

impl FromStr for Requirement {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(version) = &self.version {
            write!(f, "{}", version)?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {}", url)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}
