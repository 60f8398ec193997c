//! Single-line report style.

use std::io::{self, Write};

use super::{Exporter, Report, SUCCESS_MESSAGE};

/// Comma separated lists of unused packages and unbacked modules.
pub struct LineExporter;

impl Exporter for LineExporter {
    fn export<W: Write>(&self, data: &Report, writer: &mut W) -> io::Result<()> {
        let packages: Vec<String> = data
            .unused_packages()
            .map(|p| {
                if p.installed {
                    p.name.clone()
                } else {
                    format!("{} (not installed)", p.name)
                }
            })
            .collect();
        let modules: Vec<&str> = data.unbacked_modules().map(|m| m.name.as_str()).collect();

        if packages.is_empty() && modules.is_empty() {
            return writeln!(writer, "{}", SUCCESS_MESSAGE);
        }
        if !packages.is_empty() {
            writeln!(writer, "Packages: {}", packages.join(", "))?;
        }
        if !modules.is_empty() {
            writeln!(writer, "Modules: {}", modules.join(", "))?;
        }
        Ok(())
    }
}
