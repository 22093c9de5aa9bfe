#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use contrato_kernel_contracts::contract::{ContractCategory, ContractRecord, OwnerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DASHBOARD_RECENT_LIMIT: usize = 3;

/// Per-caller list of loaded contracts. A read-through convenience over the repository,
/// never the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractSession {
    owner_id: Option<OwnerId>,
    contracts: Vec<ContractRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContractQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<ContractCategory>,
}

impl ContractQuery {
    pub fn matches(&self, record: &ContractRecord) -> bool {
        if let Some(category) = self.category {
            if record.payload.category != category {
                return false;
            }
        }
        let Some(needle) = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        else {
            return true;
        };
        let company = &record.payload.company;
        company.name.to_lowercase().contains(&needle)
            || company.cnpj.as_str().contains(&needle)
            || company.cnpj.formatted().contains(&needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub count: usize,
    pub total_value: Decimal,
    pub by_category: BTreeMap<&'static str, usize>,
}

impl ContractSession {
    pub fn new(owner_id: Option<OwnerId>) -> Self {
        Self {
            owner_id,
            contracts: Vec::new(),
        }
    }

    pub fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    pub fn replace(&mut self, contracts: Vec<ContractRecord>) {
        self.contracts = contracts;
    }

    pub fn append(&mut self, record: ContractRecord) {
        self.contracts.push(record);
    }

    pub fn contracts(&self) -> &[ContractRecord] {
        &self.contracts
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn query(&self, query: &ContractQuery) -> Vec<&ContractRecord> {
        self.contracts.iter().filter(|r| query.matches(r)).collect()
    }

    /// Newest first; ties keep the later insertion first.
    pub fn recent(&self, limit: usize) -> Vec<&ContractRecord> {
        let mut out: Vec<&ContractRecord> = self.contracts.iter().rev().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        out
    }

    pub fn summary(&self) -> ContractSummary {
        let mut by_category: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut total_value = Decimal::ZERO;
        for record in &self.contracts {
            *by_category
                .entry(record.payload.category.as_str())
                .or_default() += 1;
            // Rows from other writers may carry any Decimal; the total clamps instead of panicking.
            total_value = total_value.saturating_add(record.payload.contract_value);
        }
        ContractSummary {
            count: self.contracts.len(),
            total_value,
            by_category,
        }
    }
}
