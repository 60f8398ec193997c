//! Markdown export implementation.
//!
//! Exports bond checking results in Markdown format for documentation and reporting.

use super::{Exporter, Report, SUCCESS_MESSAGE};
use std::io::{self, Write};

/// Markdown exporter implementation.
pub struct MarkdownExporter;

impl Exporter for MarkdownExporter {
    fn export<W: Write>(&self, data: &Report, writer: &mut W) -> io::Result<()> {
        // Title
        writeln!(writer, "# Dependency Bond Report")?;
        writeln!(writer)?;

        let unused: Vec<_> = data.unused_packages().collect();
        let unbacked: Vec<_> = data.unbacked_modules().collect();

        // Summary section
        writeln!(writer, "## Summary")?;
        writeln!(writer)?;
        writeln!(writer, "| Metric | Count |")?;
        writeln!(writer, "|--------|-------|")?;
        writeln!(writer, "| Declared Packages | {} |", data.packages.len())?;
        writeln!(writer, "| Unused Packages | {} |", unused.len())?;
        writeln!(
            writer,
            "| Third-Party Modules | {} |",
            data.third_party_modules().count()
        )?;
        writeln!(writer, "| Modules Without a Package | {} |", unbacked.len())?;
        writeln!(writer, "| Extension Cycles | {} |", data.extension_cycles.len())?;
        writeln!(writer, "| Unparsable Files | {} |", data.scan_failures.len())?;
        writeln!(writer)?;

        if data.passes {
            writeln!(writer, "{}", SUCCESS_MESSAGE)?;
            writeln!(writer)?;
        }

        if !unused.is_empty() {
            writeln!(writer, "## Unused Packages ({})", unused.len())?;
            writeln!(writer)?;
            writeln!(writer, "| Package | Version | Imports Not Found |")?;
            writeln!(writer, "|---------|---------|-------------------|")?;
            for package in &unused {
                let modules = if package.installed {
                    package.modules.join(", ")
                } else {
                    "*not installed*".to_string()
                };
                writeln!(
                    writer,
                    "| {} | {} | {} |",
                    package.name,
                    package.version.as_deref().unwrap_or("-"),
                    modules
                )?;
            }
            writeln!(writer)?;
        }

        if !unbacked.is_empty() {
            writeln!(writer, "## Modules Used Without a Package ({})", unbacked.len())?;
            writeln!(writer)?;
            for module in &unbacked {
                writeln!(writer, "- `{}`", module.name)?;
            }
            writeln!(writer)?;
        }

        // Evidence for every declared package
        if !data.packages.is_empty() {
            writeln!(writer, "## Packages")?;
            writeln!(writer)?;
            writeln!(writer, "| Package | Confidence | Evidence |")?;
            writeln!(writer, "|---------|------------|----------|")?;
            for package in &data.packages {
                writeln!(
                    writer,
                    "| {} | {} | {} |",
                    package.name, package.confidence, package.usage
                )?;
            }
            writeln!(writer)?;
        }

        if !data.extension_cycles.is_empty() {
            writeln!(writer, "## Extension Cycles")?;
            writeln!(writer)?;
            for cycle in &data.extension_cycles {
                writeln!(writer, "- {}", cycle.join(" -> "))?;
            }
            writeln!(writer)?;
        }

        if !data.scan_failures.is_empty() {
            writeln!(writer, "## Unparsable Files")?;
            writeln!(writer)?;
            for failure in &data.scan_failures {
                writeln!(writer, "- {}", failure)?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::export::fixtures::{failing_report, passing_report};
    use crate::export::{export_to_string, ReportStyle};

    #[test]
    fn test_markdown_export() {
        let output = export_to_string(ReportStyle::Markdown, &failing_report()).unwrap();

        assert!(output.contains("# Dependency Bond Report"));
        assert!(output.contains("| Unused Packages | 2 |"));
        assert!(output.contains("| black | 1.0 | black |"));
        assert!(output.contains("*not installed*"));
        assert!(output.contains("- `numpy`"));
        assert!(output.contains("| requests | very high | import |"));
        assert!(!output.contains("All Good!"));
    }

    #[test]
    fn test_markdown_passing() {
        let output = export_to_string(ReportStyle::Markdown, &passing_report()).unwrap();
        assert!(output.contains("All Good!"));
        assert!(!output.contains("## Unused Packages"));
    }
}
