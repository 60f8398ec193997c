//! Report rendering for evaluation results.
//!
//! The evaluation produces structured [`Verdicts`]; this module flattens them
//! into a [`Report`] and renders it in one of several styles: plain tables,
//! an extended table of every package, a single line, JSON, or Markdown.

pub mod json;
pub mod line;
pub mod markdown;
pub mod table;

use std::io::{self, Write};

use serde::Serialize;

use crate::analysis::{ExecutableInspection, ScanError};
use crate::evaluation::{Confidence, Usage, Verdicts};
use crate::registry::{ModuleRegistry, PackageTable};

/// Printed by the text styles when every bond holds.
pub const SUCCESS_MESSAGE: &str = "All Good!";

/// Report style options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStyle {
    /// Unused packages and unbacked modules as tables
    #[default]
    Table,
    /// Every declared package with its modules
    ExtendedTable,
    /// One line per category
    Line,
    /// JSON format - machine-readable, full data
    Json,
    /// Markdown format - documentation/reporting
    Markdown,
    /// Nothing; only the exit code reports the outcome
    None,
}

impl std::str::FromStr for ReportStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(ReportStyle::Table),
            "extended-table" | "extended_table" => Ok(ReportStyle::ExtendedTable),
            "line" => Ok(ReportStyle::Line),
            "json" => Ok(ReportStyle::Json),
            "markdown" | "md" => Ok(ReportStyle::Markdown),
            "none" => Ok(ReportStyle::None),
            _ => Err(format!(
                "Unknown report style: '{}'. Valid styles: table, extended-table, line, json, markdown, none",
                s
            )),
        }
    }
}

impl std::fmt::Display for ReportStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStyle::Table => write!(f, "table"),
            ReportStyle::ExtendedTable => write!(f, "extended-table"),
            ReportStyle::Line => write!(f, "line"),
            ReportStyle::Json => write!(f, "json"),
            ReportStyle::Markdown => write!(f, "markdown"),
            ReportStyle::None => write!(f, "none"),
        }
    }
}

/// One declared package in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRow {
    pub name: String,
    pub normalized_name: String,
    pub version: Option<String>,
    pub installed: bool,
    pub confidence: Confidence,
    pub usage: Usage,
    pub modules: Vec<String>,
    /// Where the package's executables were found, as `file:line`.
    pub executions: Vec<String>,
}

impl PackageRow {
    pub fn passes(&self) -> bool {
        self.confidence.passes()
    }
}

/// One module with import evidence in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRow {
    pub name: String,
    pub confidence: Confidence,
    pub static_import: bool,
    pub dynamic_import: bool,
    pub build_backend: bool,
    pub skipped: bool,
    pub owners: Vec<String>,
}

impl ModuleRow {
    pub fn imported(&self) -> bool {
        self.static_import || self.dynamic_import
    }

    pub fn passes(&self) -> bool {
        self.confidence.passes()
    }
}

/// Data container for report rendering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub passes: bool,
    pub packages: Vec<PackageRow>,
    pub modules: Vec<ModuleRow>,
    pub extension_cycles: Vec<Vec<String>>,
    pub rounds: usize,
    /// Source files that could not be scanned.
    pub scan_failures: Vec<String>,
}

impl Report {
    pub fn new(
        modules: &ModuleRegistry,
        packages: &PackageTable,
        executables: &ExecutableInspection,
        verdicts: &Verdicts,
    ) -> Self {
        let packages = packages
            .iter()
            .map(|package| {
                let verdict = verdicts.packages.get(&package.normalized_name);
                let executions = package
                    .executables
                    .iter()
                    .filter_map(|name| executables.get(name))
                    .flat_map(|exe| exe.found_executions.iter().map(ToString::to_string))
                    .collect();
                PackageRow {
                    name: package.declared_name.clone(),
                    normalized_name: package.normalized_name.clone(),
                    version: package.version.clone(),
                    installed: package.is_installed,
                    confidence: verdict.map(|v| v.confidence).unwrap_or_default(),
                    usage: verdict.map(|v| v.usage).unwrap_or(Usage::Unused),
                    modules: package.provided_modules.iter().cloned().collect(),
                    executions,
                }
            })
            .collect();

        let modules = modules
            .iter()
            .filter(|module| module.has_evidence())
            .map(|module| {
                let verdict = verdicts.modules.get(&module.name);
                ModuleRow {
                    name: module.name.clone(),
                    confidence: verdict.map(|v| v.confidence).unwrap_or_default(),
                    static_import: module.found_via_static_statement,
                    dynamic_import: module.found_via_dynamic_call,
                    build_backend: module.found_as_build_backend,
                    skipped: module.is_skipped(),
                    owners: verdict
                        .map(|v| v.owners.iter().cloned().collect())
                        .unwrap_or_default(),
                }
            })
            .collect();

        Self {
            passes: verdicts.passes(),
            packages,
            modules,
            extension_cycles: verdicts.extension_cycles.clone(),
            rounds: verdicts.rounds,
            scan_failures: Vec::new(),
        }
    }

    pub fn with_scan_failures(mut self, failures: &[ScanError]) -> Self {
        self.scan_failures = failures.iter().map(ToString::to_string).collect();
        self
    }

    /// Declared packages with no evidence of use.
    pub fn unused_packages(&self) -> impl Iterator<Item = &PackageRow> {
        self.packages.iter().filter(|p| !p.passes())
    }

    /// Used modules no declared package provides.
    pub fn unbacked_modules(&self) -> impl Iterator<Item = &ModuleRow> {
        self.modules.iter().filter(|m| !m.passes())
    }

    /// Third-party modules with evidence, ignoring skipped ones.
    pub fn third_party_modules(&self) -> impl Iterator<Item = &ModuleRow> {
        self.modules.iter().filter(|m| !m.skipped)
    }
}

/// Trait for exporters.
pub trait Exporter {
    /// Export the data to the given writer.
    fn export<W: Write>(&self, data: &Report, writer: &mut W) -> io::Result<()>;
}

/// Export data in the specified style.
pub fn export<W: Write>(style: ReportStyle, data: &Report, writer: &mut W) -> io::Result<()> {
    match style {
        ReportStyle::Table => table::TableExporter.export(data, writer),
        ReportStyle::ExtendedTable => table::ExtendedTableExporter.export(data, writer),
        ReportStyle::Line => line::LineExporter.export(data, writer),
        ReportStyle::Json => json::JsonExporter.export(data, writer),
        ReportStyle::Markdown => markdown::MarkdownExporter.export(data, writer),
        ReportStyle::None => Ok(()),
    }
}

/// Export data to a string.
pub fn export_to_string(style: ReportStyle, data: &Report) -> io::Result<String> {
    let mut buffer = Vec::new();
    export(style, data, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn package(name: &str, confidence: Confidence, usage: Usage) -> PackageRow {
        PackageRow {
            name: name.to_string(),
            normalized_name: name.to_lowercase(),
            version: Some("1.0".to_string()),
            installed: usage != Usage::NotInstalled,
            confidence,
            usage,
            modules: vec![name.to_lowercase().replace('-', "_")],
            executions: Vec::new(),
        }
    }

    pub fn module(name: &str, confidence: Confidence) -> ModuleRow {
        ModuleRow {
            name: name.to_string(),
            confidence,
            static_import: true,
            dynamic_import: false,
            build_backend: false,
            skipped: confidence == Confidence::Skipped,
            owners: Vec::new(),
        }
    }

    pub fn failing_report() -> Report {
        Report {
            passes: false,
            packages: vec![
                package("requests", Confidence::VeryHigh, Usage::Import),
                package("black", Confidence::None, Usage::Unused),
                package("ghost", Confidence::None, Usage::NotInstalled),
            ],
            modules: vec![
                module("requests", Confidence::VeryHigh),
                module("numpy", Confidence::None),
                module("os", Confidence::Skipped),
            ],
            extension_cycles: Vec::new(),
            rounds: 1,
            scan_failures: Vec::new(),
        }
    }

    pub fn passing_report() -> Report {
        Report {
            passes: true,
            packages: vec![package("requests", Confidence::VeryHigh, Usage::Import)],
            modules: vec![module("requests", Confidence::VeryHigh)],
            ..Report::default()
        }
    }
}
