#![forbid(unsafe_code)]

//! Hosted relational backend reached through its PostgREST-style HTTP interface.

use std::time::Duration;

use chrono::{DateTime, Utc};
use contrato_kernel_contracts::contract::{
    CallerContext, ContractId, ContractPayload, ContractRecord, OwnerId,
};
use contrato_kernel_contracts::Validate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contracts::StorageError;
use crate::repo::{unauthenticated, ContractRepo};

const ERROR_DETAIL_MAX_CHARS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub timeout_ms: u64,
}

/// Column layout of the hosted `contratos` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRow {
    pub id: ContractId,
    pub user_id: OwnerId,
    pub dados_json: ContractPayload,
    pub data_criacao: DateTime<Utc>,
    pub data_atualizacao: DateTime<Utc>,
}

impl From<&ContractRecord> for ContractRow {
    fn from(record: &ContractRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.owner_id.clone(),
            dados_json: record.payload.clone(),
            data_criacao: record.created_at,
            data_atualizacao: record.updated_at,
        }
    }
}

/// Rows come from a store other writers can reach, so they are held to the same
/// invariants as a fresh submission before they become records.
impl TryFrom<ContractRow> for ContractRecord {
    type Error = StorageError;

    fn try_from(row: ContractRow) -> Result<Self, Self::Error> {
        row.id
            .validate()
            .and_then(|_| row.user_id.validate())
            .and_then(|_| row.dados_json.validate())
            .map_err(|violation| StorageError::Decode {
                detail: bounded_detail(&format!("row {}: {violation}", row.id.as_str())),
            })?;
        Ok(Self {
            id: row.id,
            owner_id: row.user_id,
            created_at: row.data_criacao,
            updated_at: row.data_atualizacao,
            payload: row.dados_json,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RestContractStore {
    config: RestStoreConfig,
    agent: ureq::Agent,
}

impl RestContractStore {
    pub fn new(config: RestStoreConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { config, agent }
    }

    pub fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.config.api_key)
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("Accept", "application/json")
    }

    fn fetch_rows(&self, req: ureq::Request, key: &str) -> Result<Vec<ContractRow>, StorageError> {
        let response = self
            .authorized(req)
            .call()
            .map_err(|err| storage_error_from_ureq(key, err))?;
        response
            .into_json::<Vec<ContractRow>>()
            .map_err(|err| StorageError::Decode {
                detail: bounded_detail(&err.to_string()),
            })
    }
}

impl ContractRepo for RestContractStore {
    fn insert_contract_row(
        &mut self,
        record: ContractRecord,
    ) -> Result<ContractRecord, StorageError> {
        let key = record.id.as_str().to_string();
        let row = ContractRow::from(&record);
        let response = self
            .authorized(self.agent.post(&self.table_url()))
            .set("Content-Type", "application/json")
            .set("Prefer", "return=representation")
            .send_json(&row)
            .map_err(|err| storage_error_from_ureq(&key, err))?;
        let mut rows: Vec<ContractRow> =
            response.into_json().map_err(|err| StorageError::Decode {
                detail: bounded_detail(&err.to_string()),
            })?;
        if rows.is_empty() {
            return Err(StorageError::Decode {
                detail: "insert returned no representation".to_string(),
            });
        }
        debug!(contract_id = key.as_str(), "contract row inserted remotely");
        ContractRecord::try_from(rows.swap_remove(0))
    }

    fn contract_rows_for(
        &self,
        caller: &CallerContext,
    ) -> Result<Vec<ContractRecord>, StorageError> {
        let Some(owner_id) = caller.owner_id.as_ref() else {
            return Err(unauthenticated("anonymous"));
        };
        let mut req = self
            .agent
            .get(&self.table_url())
            .query("select", "*")
            .query("order", "data_criacao.asc");
        if !caller.elevated {
            req = req.query("user_id", &format!("eq.{}", owner_id.as_str()));
        }
        let rows = self.fetch_rows(req, owner_id.as_str())?;
        // One malformed row must not hide the rest of the caller's contracts.
        Ok(rows
            .into_iter()
            .filter_map(|row| match ContractRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(error = %err, "skipping malformed contract row");
                    None
                }
            })
            .filter(|record| caller.can_read(&record.owner_id))
            .collect())
    }

    fn contract_row_by_id(
        &self,
        caller: &CallerContext,
        id: &ContractId,
    ) -> Result<ContractRecord, StorageError> {
        if !caller.is_authenticated() {
            return Err(unauthenticated(id.as_str()));
        }
        let req = self
            .agent
            .get(&self.table_url())
            .query("select", "*")
            .query("id", &format!("eq.{}", id.as_str()));
        let row = self
            .fetch_rows(req, id.as_str())?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound {
                table: crate::contracts::CONTRACTS_TABLE,
                key: id.as_str().to_string(),
            })?;
        if !caller.can_read(&row.user_id) {
            return Err(StorageError::Unauthorized {
                table: crate::contracts::CONTRACTS_TABLE,
                key: id.as_str().to_string(),
            });
        }
        ContractRecord::try_from(row)
    }
}

fn storage_error_from_ureq(key: &str, err: ureq::Error) -> StorageError {
    match err {
        ureq::Error::Status(status, response) => {
            let detail = bounded_detail(&response.into_string().unwrap_or_default());
            warn!(status, key, "hosted store rejected request");
            storage_error_from_status(key, status, detail)
        }
        ureq::Error::Transport(transport) => {
            warn!(key, error = %transport, "hosted store unreachable");
            StorageError::Transport {
                detail: bounded_detail(&transport.to_string()),
            }
        }
    }
}

fn storage_error_from_status(key: &str, status: u16, detail: String) -> StorageError {
    match status {
        // The store refusing our service credentials is a backend fault, not the caller's.
        401 | 403 => StorageError::BackendDenied { status },
        409 => StorageError::DuplicateKey {
            table: crate::contracts::CONTRACTS_TABLE,
            key: key.to_string(),
        },
        _ => StorageError::Rejected { status, detail },
    }
}

fn bounded_detail(msg: &str) -> String {
    msg.chars().take(ERROR_DETAIL_MAX_CHARS).collect()
}
