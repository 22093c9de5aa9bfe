#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use contrato_engines::lookup::CompanyLookup;
use contrato_kernel_contracts::company::format_cnpj_input;
use contrato_kernel_contracts::form::ContractForm;
use contrato_kernel_contracts::ValidationErrors;
use contrato_os::autofill::{lookup_company, LookupOutcome};
use contrato_os::config::ConfigError;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "contrato", version, about = "Contract intake operator tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Applies the tax id input mask.
    FormatCnpj { value: String },
    /// Runs the submission rules over a JSON form file.
    Validate { path: PathBuf },
    /// Looks a company up with the configured registry.
    Lookup { cnpj: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to read {path}: {detail}")]
    Io { path: String, detail: String },
    #[error("form is not valid json: {detail}")]
    InvalidJson { detail: String },
    #[error("form rejected:\n{0}")]
    Rejected(ValidationErrors),
    #[error("{0}")]
    Lookup(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Runs one command. `lookup` is only consulted by `Command::Lookup`.
pub fn execute_command(
    command: &Command,
    lookup: &dyn CompanyLookup,
) -> Result<String, ToolError> {
    match command {
        Command::FormatCnpj { value } => Ok(format_cnpj_input(value)),
        Command::Validate { path } => {
            let raw = fs::read_to_string(path).map_err(|err| ToolError::Io {
                path: path.display().to_string(),
                detail: err.to_string(),
            })?;
            validate_form_json(&raw)
        }
        Command::Lookup { cnpj } => {
            let outcome = lookup_company(lookup, cnpj)
                .map_err(|err| ToolError::Lookup(err.user_message()))?;
            debug!(outcome = outcome.as_str(), "lookup command");
            match outcome {
                LookupOutcome::Found(profile) => serde_json::to_string_pretty(&profile)
                    .map_err(|err| ToolError::InvalidJson {
                        detail: err.to_string(),
                    }),
                other => Err(ToolError::Lookup(other.user_message().unwrap_or_default())),
            }
        }
    }
}

pub fn validate_form_json(raw: &str) -> Result<String, ToolError> {
    let form: ContractForm = serde_json::from_str(raw).map_err(|err| ToolError::InvalidJson {
        detail: err.to_string(),
    })?;
    let payload = form.validate().map_err(ToolError::Rejected)?;
    serde_json::to_string_pretty(&payload).map_err(|err| ToolError::InvalidJson {
        detail: err.to_string(),
    })
}
