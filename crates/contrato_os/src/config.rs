#![forbid(unsafe_code)]

use std::env;
use std::net::SocketAddr;

use contrato_engines::lookup::{
    CompanyLookup, HttpCompanyLookup, HttpCompanyLookupConfig, StaticCompanyDirectory,
};
use contrato_engines::notify::{ContractNotifier, WebhookNotifier, WebhookNotifierConfig};
use contrato_storage::contracts::{ContractStore, CONTRACTS_TABLE};
use contrato_storage::repo::ContractRepo;
use contrato_storage::rest::{RestContractStore, RestStoreConfig};

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has unsupported value {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("{var} is required when {required_by}")]
    Missing {
        var: &'static str,
        required_by: &'static str,
    },
    #[error("collaborator setup failed: {detail}")]
    Collaborator { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupMode {
    Static,
    Http(HttpCompanyLookupConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Rest(RestStoreConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContratoConfig {
    pub http_bind: SocketAddr,
    pub lookup: LookupMode,
    pub webhook: Option<WebhookNotifierConfig>,
    pub store: StoreMode,
}

impl ContratoConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let timeout = |key: &str| {
            non_empty(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| (100..=60_000).contains(v))
                .unwrap_or(DEFAULT_TIMEOUT_MS)
        };

        let bind_raw =
            non_empty("CONTRATO_HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let http_bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "CONTRATO_HTTP_BIND",
                value: bind_raw.clone(),
            })?;

        let lookup = match non_empty("CONTRATO_LOOKUP_MODE")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("static") => LookupMode::Static,
            Some("http") => LookupMode::Http(HttpCompanyLookupConfig {
                endpoint: non_empty("CONTRATO_LOOKUP_ENDPOINT").ok_or(ConfigError::Missing {
                    var: "CONTRATO_LOOKUP_ENDPOINT",
                    required_by: "CONTRATO_LOOKUP_MODE=http",
                })?,
                api_key: non_empty("CONTRATO_LOOKUP_API_KEY"),
                timeout_ms: timeout("CONTRATO_LOOKUP_TIMEOUT_MS"),
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "CONTRATO_LOOKUP_MODE",
                    value: other.to_string(),
                })
            }
        };

        let webhook =
            non_empty("CONTRATO_WEBHOOK_ENDPOINT").map(|endpoint| WebhookNotifierConfig {
                endpoint,
                timeout_ms: timeout("CONTRATO_WEBHOOK_TIMEOUT_MS"),
            });

        let store = match non_empty("CONTRATO_STORE_MODE")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("memory") => StoreMode::Memory,
            Some("rest") => StoreMode::Rest(RestStoreConfig {
                base_url: non_empty("CONTRATO_STORE_URL").ok_or(ConfigError::Missing {
                    var: "CONTRATO_STORE_URL",
                    required_by: "CONTRATO_STORE_MODE=rest",
                })?,
                api_key: non_empty("CONTRATO_STORE_API_KEY").ok_or(ConfigError::Missing {
                    var: "CONTRATO_STORE_API_KEY",
                    required_by: "CONTRATO_STORE_MODE=rest",
                })?,
                table: non_empty("CONTRATO_STORE_TABLE")
                    .unwrap_or_else(|| CONTRACTS_TABLE.to_string()),
                timeout_ms: timeout("CONTRATO_STORE_TIMEOUT_MS"),
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "CONTRATO_STORE_MODE",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            http_bind,
            lookup,
            webhook,
            store,
        })
    }

    /// In-memory store, demo directory, notifications off.
    pub fn local_default() -> Self {
        Self {
            http_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            lookup: LookupMode::Static,
            webhook: None,
            store: StoreMode::Memory,
        }
    }

    pub fn build_lookup(&self) -> Result<Box<dyn CompanyLookup + Send + Sync>, ConfigError> {
        let collaborator = |err: contrato_engines::lookup::CompanyLookupError| {
            ConfigError::Collaborator {
                detail: err.to_string(),
            }
        };
        match &self.lookup {
            LookupMode::Static => Ok(Box::new(
                StaticCompanyDirectory::demo().map_err(collaborator)?,
            )),
            LookupMode::Http(config) => Ok(Box::new(
                HttpCompanyLookup::new(config.clone()).map_err(collaborator)?,
            )),
        }
    }

    pub fn build_repo(&self) -> Box<dyn ContractRepo + Send> {
        match &self.store {
            StoreMode::Memory => Box::new(ContractStore::new_in_memory()),
            StoreMode::Rest(config) => Box::new(RestContractStore::new(config.clone())),
        }
    }

    pub fn build_notifier(&self) -> Result<Option<Box<dyn ContractNotifier + Send>>, ConfigError> {
        let Some(config) = self.webhook.as_ref() else {
            return Ok(None);
        };
        let notifier = WebhookNotifier::new(config.clone()).map_err(|err| {
            ConfigError::Collaborator {
                detail: err.to_string(),
            }
        })?;
        Ok(Some(Box::new(notifier)))
    }
}
