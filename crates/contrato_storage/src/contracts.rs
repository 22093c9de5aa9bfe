#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use contrato_kernel_contracts::contract::{ContractId, ContractRecord, OwnerId};
use contrato_kernel_contracts::{ContractViolation, Validate};
use tracing::debug;

pub const CONTRACTS_TABLE: &str = "contratos";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("no row in {table} for {key}")]
    NotFound { table: &'static str, key: String },
    #[error("caller may not access {table} row {key}")]
    Unauthorized { table: &'static str, key: String },
    #[error("storage refused the service credentials with http status {status}")]
    BackendDenied { status: u16 },
    #[error("storage transport failure: {detail}")]
    Transport { detail: String },
    #[error("storage rejected the request with http status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("storage returned an unreadable body: {detail}")]
    Decode { detail: String },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    /// Constraint-class failures: the same write will fail again unchanged.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::DuplicateKey { .. } | StorageError::ContractViolation(_)
        )
    }
}

/// In-memory contract table. Rows are immutable once inserted.
#[derive(Debug, Clone, Default)]
pub struct ContractStore {
    contracts: BTreeMap<ContractId, ContractRecord>,
    // Listing order is insertion order.
    insertion_order: Vec<ContractId>,
}

impl ContractStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn insert_contract(
        &mut self,
        record: ContractRecord,
    ) -> Result<ContractRecord, StorageError> {
        record.id.validate()?;
        record.owner_id.validate()?;
        record.payload.validate()?;
        if self.contracts.contains_key(&record.id) {
            return Err(StorageError::DuplicateKey {
                table: CONTRACTS_TABLE,
                key: record.id.as_str().to_string(),
            });
        }

        debug!(
            contract_id = record.id.as_str(),
            owner_id = record.owner_id.as_str(),
            "contract row inserted"
        );
        self.insertion_order.push(record.id.clone());
        self.contracts.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn contract_row(&self, id: &ContractId) -> Option<&ContractRecord> {
        self.contracts.get(id)
    }

    pub fn contract_rows(&self) -> impl Iterator<Item = &ContractRecord> + '_ {
        self.insertion_order
            .iter()
            .filter_map(|id| self.contracts.get(id))
    }

    pub fn contract_rows_for_owner<'a>(
        &'a self,
        owner_id: &'a OwnerId,
    ) -> impl Iterator<Item = &'a ContractRecord> + 'a {
        self.contract_rows()
            .filter(move |row| &row.owner_id == owner_id)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
