#![forbid(unsafe_code)]

use contrato_kernel_contracts::contract::{CallerContext, ContractId, ContractRecord};

use crate::contracts::{ContractStore, StorageError, CONTRACTS_TABLE};

/// Typed repository interface for contract persistence and owner-scoped retrieval.
pub trait ContractRepo {
    fn insert_contract_row(
        &mut self,
        record: ContractRecord,
    ) -> Result<ContractRecord, StorageError>;

    /// Rows visible to `caller`, in insertion order: their own, or every row when elevated.
    fn contract_rows_for(&self, caller: &CallerContext)
        -> Result<Vec<ContractRecord>, StorageError>;

    /// `NotFound` when no row has the id; `Unauthorized` when it exists but is not visible.
    fn contract_row_by_id(
        &self,
        caller: &CallerContext,
        id: &ContractId,
    ) -> Result<ContractRecord, StorageError>;
}

pub(crate) fn unauthenticated(key: &str) -> StorageError {
    StorageError::Unauthorized {
        table: CONTRACTS_TABLE,
        key: key.to_string(),
    }
}

impl ContractRepo for ContractStore {
    fn insert_contract_row(
        &mut self,
        record: ContractRecord,
    ) -> Result<ContractRecord, StorageError> {
        self.insert_contract(record)
    }

    fn contract_rows_for(
        &self,
        caller: &CallerContext,
    ) -> Result<Vec<ContractRecord>, StorageError> {
        let Some(owner_id) = caller.owner_id.as_ref() else {
            return Err(unauthenticated("anonymous"));
        };
        if caller.elevated {
            return Ok(self.contract_rows().cloned().collect());
        }
        Ok(self.contract_rows_for_owner(owner_id).cloned().collect())
    }

    fn contract_row_by_id(
        &self,
        caller: &CallerContext,
        id: &ContractId,
    ) -> Result<ContractRecord, StorageError> {
        if !caller.is_authenticated() {
            return Err(unauthenticated(id.as_str()));
        }
        let row = self
            .contract_row(id)
            .ok_or_else(|| StorageError::NotFound {
                table: CONTRACTS_TABLE,
                key: id.as_str().to_string(),
            })?;
        if !caller.can_read(&row.owner_id) {
            return Err(StorageError::Unauthorized {
                table: CONTRACTS_TABLE,
                key: id.as_str().to_string(),
            });
        }
        Ok(row.clone())
    }
}
