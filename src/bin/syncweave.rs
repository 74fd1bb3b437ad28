//! syncweave: weave state replication into a compiled module image
//!
//! ## Example Usage
//!
//! ```bash
//! # Weave an image and write the result next to it
//! syncweave weave game.image.json -o game.woven.json
//!
//! # Same, with a machine-readable summary and strict diagnostics
//! syncweave weave game.image.json -o game.woven.json --report report.json --deny-diagnostics
//!
//! # Structural validation only, no rewriting
//! syncweave check game.image.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use syncweave::imagefile::{load_image, save_image, save_json};
use syncweave::{
    validate_module, weave_module, CollectingSink, DefaultAttributeOracle, DefaultCodecProvider,
    DiagnosticSink, TracingSink,
};

#[derive(Parser)]
#[command(
    name = "syncweave",
    author,
    version,
    about = "Weave state replication into compiled module images"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (show per-field weaving decisions)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the weave pass over an image and write the woven result
    Weave(WeaveCmd),

    /// Validate an image structurally without modifying it
    Check(CheckCmd),
}

#[derive(Parser)]
struct WeaveCmd {
    /// Module image to weave (JSON)
    image: PathBuf,

    /// Where to write the woven image
    #[arg(long, short)]
    output: PathBuf,

    /// Write a JSON summary of woven and skipped fields
    #[arg(long)]
    report: Option<PathBuf>,

    /// Exit non-zero when any diagnostic was emitted
    #[arg(long)]
    deny_diagnostics: bool,
}

#[derive(Parser)]
struct CheckCmd {
    /// Module image to validate (JSON)
    image: PathBuf,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Weave(cmd) => run_weave(cmd),
        Commands::Check(cmd) => run_check(cmd),
    }
}

fn run_weave(cmd: WeaveCmd) -> Result<ExitCode> {
    let mut image = load_image(&cmd.image)?;
    validate_module(&image)?;

    let mut sink = CollectingSink::new();
    let report = weave_module(
        &mut image,
        &DefaultCodecProvider,
        &DefaultAttributeOracle,
        &mut sink,
    )?;
    // the pass must never leave the image structurally broken
    validate_module(&image)?;

    // replay collected diagnostics through the tracing pipeline
    let mut log = TracingSink;
    for warning in &sink.warnings {
        log.warning(warning.clone());
    }
    for error in &sink.errors {
        log.error(error.clone());
    }

    save_image(&cmd.output, &image)?;
    if let Some(report_path) = &cmd.report {
        save_json(report_path, &report)?;
    }
    println!(
        "wove {} field(s), skipped {} ({} diagnostic(s))",
        report.total_woven,
        report.total_skipped,
        sink.errors.len() + sink.warnings.len()
    );

    if cmd.deny_diagnostics && !(sink.errors.is_empty() && sink.warnings.is_empty()) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_check(cmd: CheckCmd) -> Result<ExitCode> {
    let image = load_image(&cmd.image)?;
    validate_module(&image)?;
    println!("{}: {} type(s) ok", cmd.image.display(), image.types.len());
    Ok(ExitCode::SUCCESS)
}
