use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use bonded::config::{Overrides, Settings};
use bonded::export::{self, ReportStyle};
use bonded::pipeline;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bonded")]
#[command(version)]
#[command(
    about = "Checks that a Python project's declared packages and imported modules match",
    long_about = None
)]
struct Cli {
    /// File or directory to check (defaults to the current directory)
    search_path: Option<PathBuf>,

    /// pyproject.toml searched for requirements and [tool.bonded] settings;
    /// an empty value disables the lookup
    #[arg(long)]
    pyproject: Option<PathBuf>,

    /// setup.cfg searched for requirements
    #[arg(long)]
    setup: Option<PathBuf>,

    /// Packages to check in addition to the declared ones
    #[arg(long, num_args = 1.., value_name = "PACKAGE")]
    packages: Vec<String>,

    /// Pip requirements file, may be given multiple times
    #[arg(short = 'r', long = "requirements", value_name = "FILE")]
    requirements: Vec<PathBuf>,

    /// Modules never reported as missing a package
    #[arg(long, num_args = 1.., value_name = "MODULE")]
    ignore_modules: Vec<String>,

    /// Packages never reported as unused
    #[arg(long, num_args = 1.., value_name = "PACKAGE")]
    ignore_packages: Vec<String>,

    /// Glob excluding paths from the search, may be given multiple times
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// site-packages directory holding installed metadata, may be given
    /// multiple times
    #[arg(long, value_name = "DIR")]
    site_packages: Vec<PathBuf>,

    /// Report style: table, extended-table, line, json, markdown or none
    #[arg(long)]
    report: Option<ReportStyle>,

    /// Increase logging (-v warn, -vv info, -vvv debug, -vvvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print nothing when every bond holds
    #[arg(short, long)]
    quiet: bool,
}

impl From<Cli> for Overrides {
    fn from(cli: Cli) -> Self {
        Overrides {
            search_path: cli.search_path,
            pyproject: cli.pyproject,
            setup: cli.setup,
            packages: cli.packages,
            requirements: cli.requirements,
            ignore_modules: cli.ignore_modules,
            ignore_packages: cli.ignore_packages,
            exclude: cli.exclude,
            site_packages: cli.site_packages,
            report: cli.report,
            verbose: (cli.verbose > 0).then_some(cli.verbose),
            quiet: cli.quiet.then_some(true),
        }
    }
}

/// Initialize the tracing subscriber on stderr.
///
/// `RUST_LOG` wins over the verbosity count when set.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bonded={}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn check(settings: &Settings) -> anyhow::Result<bool> {
    let report = pipeline::run(settings).context("Bond check failed")?;

    if settings.quiet && report.passes {
        return Ok(true);
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    export::export(settings.report, &report, &mut out).context("Failed to write report")?;
    out.flush().context("Failed to write report")?;
    Ok(report.passes)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.into()).context("Invalid configuration") {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };
    init_tracing(settings.verbose);
    tracing::debug!("Using settings {:?}", settings);

    match check(&settings) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
