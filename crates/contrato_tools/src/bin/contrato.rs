#![forbid(unsafe_code)]

use clap::Parser;
use contrato_os::config::ContratoConfig;
use contrato_tools::cli::{execute_command, Cli, ToolError};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), ToolError> {
    let cli = Cli::parse();
    let lookup = ContratoConfig::from_env()?.build_lookup()?;
    let output = execute_command(&cli.command, lookup.as_ref())?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
