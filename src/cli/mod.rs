//! The `flux-syntax` command-line interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the parser and codec functions of the library.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{debug, info, warn};
use miette::{IntoDiagnostic, Report, WrapErr};
use walkdir::WalkDir;

use crate::cli::args::{Command, FluxArgs, ParseOptions};
use crate::codec::{binary, json};
use crate::diagnostics::SyntaxReport;
use crate::syntax;

pub mod args;
pub mod diagnostics;
pub mod output;

/// Extension of Flux source files picked up by `check` in a directory.
const FLUX_EXTENSION: &str = "flux";

/// How a successful command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Clean,
    SyntaxErrors,
}

/// The main entry point for the CLI.
pub fn run() -> ExitCode {
    let args = FluxArgs::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let result = match args.command {
        Command::Parse { file, pretty, options } => handle_parse(&file, pretty, &options),
        Command::Check { path, options } => handle_check(&path, &options),
        Command::Encode { file, output, options } => handle_encode(&file, &output, &options),
        Command::Decode { file, pretty } => handle_decode(&file, pretty),
        Command::FromJson { file } => handle_from_json(&file),
    };

    match result {
        Ok(Status::Clean) => ExitCode::SUCCESS,
        Ok(Status::SyntaxErrors) => ExitCode::FAILURE,
        Err(report) => {
            eprintln!("{:?}", report);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

/// Handles the `parse` subcommand.
fn handle_parse(file: &Path, pretty: bool, options: &ParseOptions) -> miette::Result<Status> {
    let name = file.display().to_string();
    let source = read_source(file)?;
    let pkg = syntax::parse_with_config(&source, &options.config_for(name.clone()));

    let bytes = if pretty {
        json::to_vec_pretty(&pkg)?
    } else {
        json::to_vec(&pkg)?
    };
    output::print_bytes(&bytes).into_diagnostic()?;

    // The AST is printed either way; syntax errors are embedded in it.
    let errors = pkg.errors();
    if !errors.is_empty() {
        eprintln!("{:?}", Report::new(SyntaxReport::new(name, source, &errors)));
    }
    Ok(Status::Clean)
}

/// Handles the `check` subcommand.
fn handle_check(path: &Path, options: &ParseOptions) -> miette::Result<Status> {
    let files = collect_sources(path)?;
    let mut stderr = output::stderr();
    let mut total = 0;

    for file in &files {
        let name = file.display().to_string();
        let source = read_source(file)?;
        let pkg = syntax::parse_with_config(&source, &options.config_for(name.clone()));
        let errors = pkg.errors();
        debug!("{}: {} syntax error(s)", name, errors.len());
        total += errors.len();
        diagnostics::print_diagnostics(&mut stderr, &name, &source, &errors).into_diagnostic()?;
    }

    output::print_summary(&mut stderr, files.len(), total).into_diagnostic()?;
    Ok(if total == 0 {
        Status::Clean
    } else {
        Status::SyntaxErrors
    })
}

/// Handles the `encode` subcommand.
fn handle_encode(file: &Path, out: &Path, options: &ParseOptions) -> miette::Result<Status> {
    let name = file.display().to_string();
    let source = read_source(file)?;
    let pkg = syntax::parse_with_config(&source, &options.config_for(name.clone()));
    if pkg.has_errors() {
        warn!("{} has syntax errors; they are embedded in the encoded AST", name);
    }

    let bytes = binary::encode(&pkg)?;
    fs::write(out, &bytes)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not write {}", out.display()))?;
    info!("wrote {} bytes to {}", bytes.len(), out.display());
    Ok(Status::Clean)
}

/// Handles the `decode` subcommand.
fn handle_decode(file: &Path, pretty: bool) -> miette::Result<Status> {
    let bytes = read_bytes(file)?;
    let pkg = binary::decode(&bytes).wrap_err_with(|| format!("could not decode {}", file.display()))?;
    let json = if pretty {
        json::to_vec_pretty(&pkg)?
    } else {
        json::to_vec(&pkg)?
    };
    output::print_bytes(&json).into_diagnostic()?;
    Ok(Status::Clean)
}

/// Handles the `from-json` subcommand.
fn handle_from_json(file: &Path) -> miette::Result<Status> {
    let bytes = read_bytes(file)?;
    let pkg = json::from_slice(&bytes).wrap_err_with(|| format!("could not decode {}", file.display()))?;
    let errors = pkg.errors();

    let mut stdout = std::io::stdout().lock();
    writeln!(
        stdout,
        "package {}: {} file(s), {} node(s)",
        pkg.package,
        pkg.files.len(),
        pkg.node_count()
    )
    .into_diagnostic()?;
    for error in &errors {
        writeln!(stdout, "{}", error).into_diagnostic()?;
    }

    Ok(if errors.is_empty() {
        Status::Clean
    } else {
        Status::SyntaxErrors
    })
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn read_source(path: &Path) -> miette::Result<String> {
    fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not read {}", path.display()))
}

fn read_bytes(path: &Path) -> miette::Result<Vec<u8>> {
    fs::read(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not read {}", path.display()))
}

/// The file itself, or every `.flux` file under a directory in name order.
fn collect_sources(path: &Path) -> miette::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.into_diagnostic()?;
        let is_flux = entry.path().extension().is_some_and(|ext| ext == FLUX_EXTENSION);
        if entry.file_type().is_file() && is_flux {
            files.push(entry.into_path());
        }
    }
    debug!("found {} Flux file(s) under {}", files.len(), path.display());
    Ok(files)
}
