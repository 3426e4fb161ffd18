//! pxanim - packed animation container converter
//!
//! Decodes `*.anm.pxd` containers into flat `*.outanim` transform streams and
//! encodes them back.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

use pxanim::{
    CompressionSettings, ContainerLayout, Converter, Operation, QvvCodec, DEFAULT_PRECISION, DEFAULT_SHELL_DISTANCE,
    DEFAULT_TABLE_OFFSET,
};

#[derive(Parser)]
#[command(name = "pxanim")]
#[command(about = "Converts packed animation containers to flat transform streams and back")]
#[command(version)]
struct Cli {
    /// Input file: `.pxd` is decoded, `.outanim` is encoded
    file: PathBuf,

    /// Input is a header-stripped blob instead of a full container
    #[arg(long)]
    blob_only: bool,

    /// Position of the chunk data offset word (decimal or 0x hex)
    #[arg(long, value_parser = parse_offset, default_value_t = DEFAULT_TABLE_OFFSET)]
    table_offset: usize,

    /// Positional tolerance used when encoding
    #[arg(long, default_value_t = DEFAULT_PRECISION)]
    precision: f32,

    /// Shell radius used to scale rotation and scale errors when encoding
    #[arg(long, default_value_t = DEFAULT_SHELL_DISTANCE)]
    shell_distance: f32,

    /// Debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

fn parse_offset(value: &str) -> Result<usize, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid offset {:?}: {}", value, err))
}

fn usage() -> String {
    let usage = Cli::command().render_usage();
    format!(
        "{}\n\n  <name>.anm.pxd  decode to <name>.outanim\n  <name>.outanim  encode to <name>.anm.pxd",
        usage
    )
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn run(cli: &Cli, operation: Operation) -> Result<PathBuf> {
    let layout = if cli.blob_only {
        ContainerLayout::BlobOnly
    } else {
        ContainerLayout::Wrapped {
            table_offset: cli.table_offset,
        }
    };
    let settings = CompressionSettings {
        precision: cli.precision,
        shell_distance: cli.shell_distance,
        ..Default::default()
    };
    let converter = Converter::new(QvvCodec::new()).with_layout(layout).with_settings(settings);

    let stage = match operation {
        Operation::Decode => "decode",
        Operation::Encode => "encode",
    };
    converter
        .run(operation, &cli.file)
        .with_context(|| format!("Failed to {} {}", stage, cli.file.display()))
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let Some(operation) = Operation::from_path(&cli.file) else {
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    };
    init_logging(&cli);

    match run(&cli, operation) {
        Ok(output) => {
            tracing::info!("Wrote {}", output.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("0x68"), Ok(0x68));
        assert_eq!(parse_offset("0X1f"), Ok(0x1F));
        assert_eq!(parse_offset("104"), Ok(104));
        assert!(parse_offset("0xZZ").is_err());
        assert!(parse_offset("-1").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["pxanim", "walk.anm.pxd"]).unwrap();
        assert_eq!(cli.table_offset, 0x68);
        assert_eq!(cli.precision, 0.001);
        assert_eq!(cli.shell_distance, 3.0);
        assert!(!cli.blob_only && !cli.verbose && !cli.quiet);

        let cli = Cli::try_parse_from(["pxanim", "a.pxd", "--blob-only", "--table-offset", "0x70", "-v"]).unwrap();
        assert!(cli.blob_only && cli.verbose);
        assert_eq!(cli.table_offset, 0x70);

        assert!(Cli::try_parse_from(["pxanim"]).is_err());
        assert!(Cli::try_parse_from(["pxanim", "a.pxd", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
