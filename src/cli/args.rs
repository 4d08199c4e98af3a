//! Command-line arguments for `flux-syntax`.

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;

use crate::config::{ParserConfig, DEFAULT_MAX_NESTING};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "flux-syntax",
    version,
    about = "Parse Flux source and convert its AST between JSON and binary form."
)]
pub struct FluxArgs {
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Command,
}

/// Parser options shared by the commands that read Flux source.
#[derive(Debug, Clone, clap::Args)]
pub struct ParseOptions {
    /// Deepest expression nesting the parser descends into.
    #[arg(long, default_value_t = DEFAULT_MAX_NESTING)]
    pub max_nesting: usize,
}

impl ParseOptions {
    pub fn config_for(&self, file_name: impl Into<String>) -> ParserConfig {
        ParserConfig::default()
            .with_file_name(file_name)
            .with_max_nesting(self.max_nesting)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a Flux file and print its AST as JSON.
    Parse {
        #[arg(required = true)]
        file: PathBuf,
        /// Indent the JSON output.
        #[arg(long)]
        pretty: bool,
        #[command(flatten)]
        options: ParseOptions,
    },
    /// Report syntax errors in a file, or in every `.flux` file under a directory.
    Check {
        #[arg(required = true)]
        path: PathBuf,
        #[command(flatten)]
        options: ParseOptions,
    },
    /// Parse a Flux file and write its AST in binary form.
    Encode {
        #[arg(required = true)]
        file: PathBuf,
        /// Where to write the binary AST.
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        options: ParseOptions,
    },
    /// Read a binary AST and print it as JSON.
    Decode {
        #[arg(required = true)]
        file: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
    /// Validate a JSON AST and list the syntax errors embedded in it.
    FromJson {
        #[arg(required = true)]
        file: PathBuf,
    },
}
