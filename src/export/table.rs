//! Table report styles.
//!
//! Tables are laid out by ratatui's `Table` widget into an off-screen
//! [`Buffer`] sized to fit the content, then written out line by line.

use std::io::{self, Write};

use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, Row, Table, Widget};

use super::{Exporter, Report, SUCCESS_MESSAGE};
use crate::evaluation::Usage;

const NOT_INSTALLED: &str = "(not installed)";
const COLUMN_SPACING: u16 = 1;

/// Unused packages and unbacked modules.
pub struct TableExporter;

impl Exporter for TableExporter {
    fn export<W: Write>(&self, data: &Report, writer: &mut W) -> io::Result<()> {
        let unused: Vec<Vec<String>> = data
            .unused_packages()
            .map(|package| {
                let missing = if package.installed {
                    package.modules.join(", ")
                } else {
                    NOT_INSTALLED.to_string()
                };
                vec![package.name.clone(), missing]
            })
            .collect();
        let unbacked: Vec<Vec<String>> = data
            .unbacked_modules()
            .map(|module| vec![module.name.clone()])
            .collect();

        if unused.is_empty() && unbacked.is_empty() {
            return writeln!(writer, "{}", SUCCESS_MESSAGE);
        }
        if !unused.is_empty() {
            write!(
                writer,
                "{}",
                render_table(None, &["Unused Package", "Imports Not Found"], &unused)
            )?;
        }
        if !unbacked.is_empty() {
            write!(
                writer,
                "{}",
                render_table(None, &["Modules Used Without a Package"], &unbacked)
            )?;
        }
        Ok(())
    }
}

/// Every declared package with its modules, followed by unbacked modules.
pub struct ExtendedTableExporter;

impl Exporter for ExtendedTableExporter {
    fn export<W: Write>(&self, data: &Report, writer: &mut W) -> io::Result<()> {
        let mut rows = Vec::new();
        for package in &data.packages {
            let usage = if package.usage == Usage::NotInstalled {
                NOT_INSTALLED.to_string()
            } else {
                package.confidence.to_string()
            };
            let mut modules = package.modules.iter();
            let first = modules.next();
            rows.push(vec![
                package.name.clone(),
                usage,
                first.cloned().unwrap_or_else(|| "---".to_string()),
                first
                    .map(|m| imported(data, m))
                    .unwrap_or_else(|| "---".to_string()),
            ]);
            for module in modules {
                rows.push(vec![
                    "---".to_string(),
                    "---".to_string(),
                    module.clone(),
                    imported(data, module),
                ]);
            }
        }
        for module in data.unbacked_modules() {
            rows.push(vec![
                "???".to_string(),
                "???".to_string(),
                module.name.clone(),
                module.imported().to_string(),
            ]);
        }

        write!(
            writer,
            "{}",
            render_table(
                Some("Bonds"),
                &["Package", "Used", "Module", "Imported"],
                &rows
            )
        )
    }
}

fn imported(data: &Report, module: &str) -> String {
    data.modules
        .iter()
        .any(|m| m.name == module && m.imported())
        .to_string()
}

fn text_width(text: &str) -> u16 {
    u16::try_from(text.chars().count()).unwrap_or(u16::MAX)
}

/// Renders a bordered table sized to its content.
fn render_table(title: Option<&str>, header: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<u16> = header
        .iter()
        .enumerate()
        .map(|(col, heading)| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| text_width(cell))
                .chain(std::iter::once(text_width(heading)))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let spacing = COLUMN_SPACING * widths.len().saturating_sub(1) as u16;
    let inner_width = widths.iter().fold(0u16, |acc, w| acc.saturating_add(*w));
    let title_width = title.map(text_width).unwrap_or(0);
    let width = inner_width
        .saturating_add(spacing)
        .max(title_width)
        .saturating_add(2);
    let height = u16::try_from(rows.len())
        .unwrap_or(u16::MAX)
        .saturating_add(3);

    let mut block = Block::default().borders(Borders::ALL);
    if let Some(title) = title {
        block = block.title(title);
    }
    let table = Table::new(
        rows.iter().map(|row| Row::new(row.clone())),
        widths.iter().map(|w| Constraint::Length(*w)),
    )
    .header(Row::new(header.to_vec()).style(Style::default().add_modifier(Modifier::BOLD)))
    .column_spacing(COLUMN_SPACING)
    .block(block);

    let area = Rect::new(0, 0, width, height);
    let mut buffer = Buffer::empty(area);
    table.render(area, &mut buffer);
    buffer_to_string(&buffer)
}

fn buffer_to_string(buffer: &Buffer) -> String {
    let width = usize::from(buffer.area.width.max(1));
    let mut output = String::new();
    for line in buffer.content.chunks(width) {
        let text: String = line.iter().map(|cell| cell.symbol()).collect();
        output.push_str(text.trim_end());
        output.push('\n');
    }
    output
}
