//! JSON export implementation.
//!
//! Exports the full report in JSON format for machine-readable output.

use super::{Exporter, ModuleRow, PackageRow, Report};
use serde::Serialize;
use std::io::{self, Write};

/// JSON exporter implementation.
pub struct JsonExporter;

/// Summary statistics for JSON output.
#[derive(Serialize)]
struct JsonSummary {
    passes: bool,
    declared_packages: usize,
    unused_packages: usize,
    third_party_modules: usize,
    unbacked_modules: usize,
    rounds: usize,
}

/// Root JSON export structure.
#[derive(Serialize)]
struct JsonExport<'a> {
    summary: JsonSummary,
    unused_packages: Vec<&'a str>,
    unbacked_modules: Vec<&'a str>,
    packages: &'a [PackageRow],
    modules: &'a [ModuleRow],
    #[serde(skip_serializing_if = "is_empty")]
    extension_cycles: &'a [Vec<String>],
    #[serde(skip_serializing_if = "is_empty")]
    scan_failures: &'a [String],
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

impl Exporter for JsonExporter {
    fn export<W: Write>(&self, data: &Report, writer: &mut W) -> io::Result<()> {
        let unused_packages: Vec<&str> = data.unused_packages().map(|p| p.name.as_str()).collect();
        let unbacked_modules: Vec<&str> =
            data.unbacked_modules().map(|m| m.name.as_str()).collect();

        let export = JsonExport {
            summary: JsonSummary {
                passes: data.passes,
                declared_packages: data.packages.len(),
                unused_packages: unused_packages.len(),
                third_party_modules: data.third_party_modules().count(),
                unbacked_modules: unbacked_modules.len(),
                rounds: data.rounds,
            },
            unused_packages,
            unbacked_modules,
            packages: &data.packages,
            modules: &data.modules,
            extension_cycles: &data.extension_cycles,
            scan_failures: &data.scan_failures,
        };

        serde_json::to_writer_pretty(&mut *writer, &export)?;
        writeln!(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::export::fixtures::failing_report;
    use crate::export::{export_to_string, ReportStyle};

    #[test]
    fn test_json_export() {
        let output = export_to_string(ReportStyle::Json, &failing_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["summary"]["passes"], false);
        assert_eq!(value["summary"]["declared_packages"], 3);
        assert_eq!(value["summary"]["unused_packages"], 2);
        assert_eq!(value["summary"]["third_party_modules"], 2);
        assert_eq!(value["unused_packages"][0], "black");
        assert_eq!(value["unbacked_modules"][0], "numpy");
        assert_eq!(value["packages"][0]["confidence"], "very-high");
        assert_eq!(value["packages"][2]["usage"], "not-installed");
        assert!(value.get("extension_cycles").is_none());
    }
}
