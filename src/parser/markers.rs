//! PEP 508 environment markers.
//!
//! A marker such as `python_version < "3.11" and sys_platform != "win32"`
//! restricts a requirement to some environments. Packages whose every
//! declaration is restricted to other environments are not expected to be
//! used by the project.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::error::{ParseError, ParseResult};

/// Variables a marker expression may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerVariable {
    PythonVersion,
    PythonFullVersion,
    OsName,
    SysPlatform,
    PlatformSystem,
    PlatformMachine,
    PlatformRelease,
    ImplementationName,
    PlatformPythonImplementation,
    Extra,
}

impl MarkerVariable {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "python_version" => MarkerVariable::PythonVersion,
            "python_full_version" => MarkerVariable::PythonFullVersion,
            "os_name" | "os.name" => MarkerVariable::OsName,
            "sys_platform" | "sys.platform" => MarkerVariable::SysPlatform,
            "platform_system" => MarkerVariable::PlatformSystem,
            "platform_machine" | "platform.machine" => MarkerVariable::PlatformMachine,
            "platform_release" => MarkerVariable::PlatformRelease,
            "implementation_name" => MarkerVariable::ImplementationName,
            "platform_python_implementation" | "platform.python_implementation" => {
                MarkerVariable::PlatformPythonImplementation
            }
            "extra" => MarkerVariable::Extra,
            _ => return None,
        })
    }

    fn is_version(&self) -> bool {
        matches!(
            self,
            MarkerVariable::PythonVersion | MarkerVariable::PythonFullVersion
        )
    }
}

/// Comparison operators allowed between marker values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Compatible,
    Arbitrary,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(MarkerVariable),
    Literal(String),
}

/// Parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerExpr {
    Compare {
        lhs: MarkerValue,
        op: MarkerOp,
        rhs: MarkerValue,
    },
    And(Box<MarkerExpr>, Box<MarkerExpr>),
    Or(Box<MarkerExpr>, Box<MarkerExpr>),
}

/// Values of the marker variables for the environment being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEnvironment {
    pub python_version: String,
    pub python_full_version: String,
    pub os_name: String,
    pub sys_platform: String,
    pub platform_system: String,
    pub platform_machine: String,
    pub platform_release: String,
    pub implementation_name: String,
    pub platform_python_implementation: String,
}

/// Python version assumed when none can be inferred from the environment.
pub const DEFAULT_PYTHON_VERSION: &str = "3.12";

impl MarkerEnvironment {
    /// Environment of the machine running the check, for the given Python version.
    pub fn for_host(python_version: &str) -> Self {
        let (os_name, sys_platform, platform_system) = match std::env::consts::OS {
            "windows" => ("nt", "win32", "Windows"),
            "macos" => ("posix", "darwin", "Darwin"),
            "linux" => ("posix", "linux", "Linux"),
            other => ("posix", other, other),
        };
        let platform_machine = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", "x86_64") => "AMD64",
            ("macos", "aarch64") => "arm64",
            (_, arch) => arch,
        };
        let full_version = if python_version.matches('.').count() >= 2 {
            python_version.to_string()
        } else {
            format!("{python_version}.0")
        };
        let short_version = full_version
            .splitn(3, '.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".");

        Self {
            python_version: short_version,
            python_full_version: full_version,
            os_name: os_name.to_string(),
            sys_platform: sys_platform.to_string(),
            platform_system: platform_system.to_string(),
            platform_machine: platform_machine.to_string(),
            platform_release: String::new(),
            implementation_name: "cpython".to_string(),
            platform_python_implementation: "CPython".to_string(),
        }
    }

    fn lookup(&self, variable: MarkerVariable) -> &str {
        match variable {
            MarkerVariable::PythonVersion => &self.python_version,
            MarkerVariable::PythonFullVersion => &self.python_full_version,
            MarkerVariable::OsName => &self.os_name,
            MarkerVariable::SysPlatform => &self.sys_platform,
            MarkerVariable::PlatformSystem => &self.platform_system,
            MarkerVariable::PlatformMachine => &self.platform_machine,
            MarkerVariable::PlatformRelease => &self.platform_release,
            MarkerVariable::ImplementationName => &self.implementation_name,
            MarkerVariable::PlatformPythonImplementation => &self.platform_python_implementation,
            // extras are never active when checking a project's own imports
            MarkerVariable::Extra => "",
        }
    }
}

impl Default for MarkerEnvironment {
    fn default() -> Self {
        Self::for_host(DEFAULT_PYTHON_VERSION)
    }
}

/// An environment marker attached to a requirement.
///
/// # Example
///
/// ```
/// use bonded::parser::markers::{EnvironmentMarker, MarkerEnvironment};
///
/// let marker: EnvironmentMarker = "python_version < '3.11'".parse().unwrap();
/// assert!(marker.evaluate(&MarkerEnvironment::for_host("3.10")));
/// assert!(!marker.evaluate(&MarkerEnvironment::for_host("3.12")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentMarker {
    source: String,
    expr: MarkerExpr,
}

impl EnvironmentMarker {
    pub fn parse(marker: &str) -> ParseResult<Self> {
        let tokens = lex(marker)?;
        let mut parser = MarkerParser {
            marker,
            tokens,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: marker.trim().to_string(),
            expr,
        })
    }

    pub fn expr(&self) -> &MarkerExpr {
        &self.expr
    }

    /// Returns true if the marker holds in `env`.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        evaluate(&self.expr, env)
    }
}

impl FromStr for EnvironmentMarker {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EnvironmentMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn evaluate(expr: &MarkerExpr, env: &MarkerEnvironment) -> bool {
    match expr {
        MarkerExpr::And(a, b) => evaluate(a, env) && evaluate(b, env),
        MarkerExpr::Or(a, b) => evaluate(a, env) || evaluate(b, env),
        MarkerExpr::Compare { lhs, op, rhs } => {
            let versioned = [lhs, rhs]
                .iter()
                .any(|v| matches!(v, MarkerValue::Variable(var) if var.is_version()));
            let resolve = |value: &MarkerValue| -> String {
                match value {
                    MarkerValue::Variable(var) => env.lookup(*var).to_string(),
                    MarkerValue::Literal(text) => text.clone(),
                }
            };
            compare(&resolve(lhs), *op, &resolve(rhs), versioned)
        }
    }
}

fn compare(lhs: &str, op: MarkerOp, rhs: &str, versioned: bool) -> bool {
    match op {
        MarkerOp::In => return rhs.contains(lhs),
        MarkerOp::NotIn => return !rhs.contains(lhs),
        MarkerOp::Arbitrary => return lhs == rhs,
        _ => {}
    }

    if versioned {
        if let Some(prefix) = rhs.strip_suffix(".*") {
            if let (Some(have), Some(want)) = (parse_release(lhs), parse_release(prefix)) {
                let matches = have.len() >= want.len() && have[..want.len()] == want[..];
                match op {
                    MarkerOp::Eq => return matches,
                    MarkerOp::NotEq => return !matches,
                    _ => {}
                }
            }
        }
        if let (Some(have), Some(want)) = (parse_release(lhs), parse_release(rhs)) {
            let ordering = cmp_release(&have, &want);
            return match op {
                MarkerOp::Eq => ordering == Ordering::Equal,
                MarkerOp::NotEq => ordering != Ordering::Equal,
                MarkerOp::Lt => ordering == Ordering::Less,
                MarkerOp::LtEq => ordering != Ordering::Greater,
                MarkerOp::Gt => ordering == Ordering::Greater,
                MarkerOp::GtEq => ordering != Ordering::Less,
                MarkerOp::Compatible => {
                    let prefix_len = want.len().saturating_sub(1).max(1);
                    ordering != Ordering::Less
                        && have.len() >= prefix_len
                        && have[..prefix_len] == want[..prefix_len]
                }
                MarkerOp::Arbitrary | MarkerOp::In | MarkerOp::NotIn => false,
            };
        }
    }

    let ordering = lhs.cmp(rhs);
    match op {
        MarkerOp::Eq => ordering == Ordering::Equal,
        MarkerOp::NotEq => ordering != Ordering::Equal,
        MarkerOp::Lt => ordering == Ordering::Less,
        MarkerOp::LtEq => ordering != Ordering::Greater,
        MarkerOp::Gt => ordering == Ordering::Greater,
        MarkerOp::GtEq => ordering != Ordering::Less,
        MarkerOp::Compatible => lhs.starts_with(rhs),
        MarkerOp::Arbitrary | MarkerOp::In | MarkerOp::NotIn => false,
    }
}

fn parse_release(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok()
        })
        .collect()
}

fn cmp_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MarkerToken {
    LParen,
    RParen,
    Op(String),
    Word(String),
    Quoted(String),
}

fn lex(marker: &str) -> ParseResult<Vec<MarkerToken>> {
    let chars: Vec<char> = marker.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(MarkerToken::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(MarkerToken::RParen);
            i += 1;
        } else if c == '"' || c == '\'' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&q| q == c)
                .map(|offset| start + offset)
                .ok_or_else(|| ParseError::InvalidMarker {
                    marker: marker.to_string(),
                    reason: "unterminated string".to_string(),
                })?;
            tokens.push(MarkerToken::Quoted(chars[start..end].iter().collect()));
            i = end + 1;
        } else if "<>=!~".contains(c) {
            let start = i;
            while i < chars.len() && "<>=!~".contains(chars[i]) {
                i += 1;
            }
            tokens.push(MarkerToken::Op(chars[start..i].iter().collect()));
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            tokens.push(MarkerToken::Word(chars[start..i].iter().collect()));
        } else {
            return Err(ParseError::InvalidMarker {
                marker: marker.to_string(),
                reason: format!("unexpected character {c:?}"),
            });
        }
    }
    Ok(tokens)
}

struct MarkerParser<'a> {
    marker: &'a str,
    tokens: Vec<MarkerToken>,
    pos: usize,
}

impl MarkerParser<'_> {
    fn error(&self, reason: &str) -> ParseError {
        ParseError::InvalidMarker {
            marker: self.marker.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&MarkerToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<MarkerToken> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(MarkerToken::Word(w)) if w == word)
    }

    fn parse_or(&mut self) -> ParseResult<MarkerExpr> {
        let mut expr = self.parse_and()?;
        while self.peek_word("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            expr = MarkerExpr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<MarkerExpr> {
        let mut expr = self.parse_atom()?;
        while self.peek_word("and") {
            self.pos += 1;
            let rhs = self.parse_atom()?;
            expr = MarkerExpr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> ParseResult<MarkerExpr> {
        if self.peek() == Some(&MarkerToken::LParen) {
            self.pos += 1;
            let expr = self.parse_or()?;
            if self.next() != Some(MarkerToken::RParen) {
                return Err(self.error("expected ')'"));
            }
            return Ok(expr);
        }
        let lhs = self.parse_value()?;
        let op = self.parse_op()?;
        let rhs = self.parse_value()?;
        if matches!(
            (&lhs, &rhs),
            (MarkerValue::Literal(_), MarkerValue::Literal(_))
        ) {
            return Err(self.error("comparison needs at least one variable"));
        }
        Ok(MarkerExpr::Compare { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> ParseResult<MarkerValue> {
        match self.next() {
            Some(MarkerToken::Quoted(text)) => Ok(MarkerValue::Literal(text)),
            Some(MarkerToken::Word(word)) => MarkerVariable::from_name(&word)
                .map(MarkerValue::Variable)
                .ok_or_else(|| self.error(&format!("unknown marker variable {word:?}"))),
            _ => Err(self.error("expected a variable or a quoted string")),
        }
    }

    fn parse_op(&mut self) -> ParseResult<MarkerOp> {
        match self.next() {
            Some(MarkerToken::Op(op)) => match op.as_str() {
                "==" => Ok(MarkerOp::Eq),
                "!=" => Ok(MarkerOp::NotEq),
                "<" => Ok(MarkerOp::Lt),
                "<=" => Ok(MarkerOp::LtEq),
                ">" => Ok(MarkerOp::Gt),
                ">=" => Ok(MarkerOp::GtEq),
                "~=" => Ok(MarkerOp::Compatible),
                "===" => Ok(MarkerOp::Arbitrary),
                other => Err(self.error(&format!("unknown operator {other:?}"))),
            },
            Some(MarkerToken::Word(word)) if word == "in" => Ok(MarkerOp::In),
            Some(MarkerToken::Word(word)) if word == "not" => match self.next() {
                Some(MarkerToken::Word(next)) if next == "in" => Ok(MarkerOp::NotIn),
                _ => Err(self.error("expected 'in' after 'not'")),
            },
            _ => Err(self.error("expected a comparison operator")),
        }
    }
}
