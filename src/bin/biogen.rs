//! Generate C++ protocol headers from YAML schemas, or decode binary data with a schema.
//!
//! Usage:
//!   biogen generate <INPUT> [-o DIR] [--helper-include PATH] [--indent N]
//!   biogen decode <SCHEMA> --struct NAME <DATA>
//!
//! `generate` compiles one schema file or every schema in a directory and writes one
//! header per unit. Exit status is 1 if any unit failed.

use anyhow::{bail, Context, Result};
use biogen::batch::{compile_path, write_artifacts};
use biogen::codec::Codec;
use biogen::dump::{hex_string, record_to_dump};
use biogen::{loader, GeneratorConfig, ResolvedProtocol};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "biogen", about = "Binary protocol code generator", version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema file or a directory of schemas into C++ headers
    Generate {
        /// Schema file (.yaml/.yml) or directory
        input: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Include path of the binary-io helper header
        #[arg(long)]
        helper_include: Option<String>,
        /// Spaces per indentation level
        #[arg(long)]
        indent: Option<usize>,
    },
    /// Decode a binary file as one struct of a schema and print it
    Decode {
        /// Schema file
        schema: PathBuf,
        /// Struct to decode
        #[arg(long = "struct")]
        struct_name: String,
        /// Binary input
        data: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn generate(input: PathBuf, output: PathBuf, helper_include: Option<String>, indent: Option<usize>) -> Result<bool> {
    let mut config = GeneratorConfig::default();
    if let Some(h) = helper_include {
        config.helper_include = h;
    }
    if let Some(n) = indent {
        config.indent = n;
    }
    let report = compile_path(&input, &config)?;
    let written = write_artifacts(&report, &output)
        .with_context(|| format!("writing headers to {}", output.display()))?;
    let mut written = written.iter();
    for unit in &report.units {
        match &unit.outcome {
            Ok(_) => {
                if let Some(path) = written.next() {
                    println!("ok    {} -> {}", unit.source.display(), path.display());
                }
            }
            Err(e) => println!("FAIL  {}: {}", unit.source.display(), e),
        }
    }
    Ok(report.is_success())
}

fn decode(schema: PathBuf, struct_name: String, data: PathBuf) -> Result<()> {
    let protocol = loader::load_file(&schema)?;
    let resolved = ResolvedProtocol::resolve(protocol)?;
    let Some(idx) = resolved.get_struct(&struct_name) else {
        bail!("no struct '{}' in {}", struct_name, schema.display());
    };
    let bytes = std::fs::read(&data).with_context(|| format!("reading {}", data.display()))?;
    let decoded = Codec::new(&resolved).decode(&struct_name, &bytes)?;
    println!("{}", record_to_dump(&resolved, idx, &decoded.record));
    let trailing = &bytes[decoded.consumed..];
    if !trailing.is_empty() {
        println!("{} trailing bytes: {}", trailing.len(), hex_string(trailing));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Generate {
            input,
            output,
            helper_include,
            indent,
        } => {
            if !generate(input, output, helper_include, indent)? {
                std::process::exit(1);
            }
        }
        Commands::Decode {
            schema,
            struct_name,
            data,
        } => decode(schema, struct_name, data)?,
    }
    Ok(())
}
