#![forbid(unsafe_code)]

//! CNPJ-driven prefill of the contract form.

use contrato_engines::lookup::{
    CompanyLookup, CompanyLookupError, CompanyProfile, LOOKUP_NOT_FOUND_MESSAGE,
};
use contrato_kernel_contracts::company::{Cnpj, CNPJ_INVALID};
use contrato_kernel_contracts::form::ContractForm;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutofillError {
    #[error("cnpj must have exactly 14 digits")]
    InvalidCnpj,
}

impl AutofillError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AutofillError::InvalidCnpj => CNPJ_INVALID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(CompanyProfile),
    NotFound,
    Failed(CompanyLookupError),
}

impl LookupOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Found(_) => "FOUND",
            LookupOutcome::NotFound => "NOT_FOUND",
            LookupOutcome::Failed(_) => "FAILED",
        }
    }

    /// Message to show next to the field; `None` when the lookup succeeded.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            LookupOutcome::Found(_) => None,
            LookupOutcome::NotFound => Some(LOOKUP_NOT_FOUND_MESSAGE),
            LookupOutcome::Failed(err) => Some(err.user_message()),
        }
    }

    pub fn profile(&self) -> Option<&CompanyProfile> {
        match self {
            LookupOutcome::Found(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Looks up whatever the user typed. Input whose digits are not exactly 14 long is refused
/// locally and the collaborator is never called.
pub fn lookup_company<L>(lookup: &L, raw: &str) -> Result<LookupOutcome, AutofillError>
where
    L: CompanyLookup + ?Sized,
{
    let cnpj = Cnpj::from_digits_of(raw).map_err(|_| AutofillError::InvalidCnpj)?;
    let outcome = match lookup.lookup(&cnpj) {
        Ok(Some(profile)) => LookupOutcome::Found(profile),
        Ok(None) => LookupOutcome::NotFound,
        Err(err) => {
            warn!(cnpj = cnpj.as_str(), error = %err, "company lookup failed");
            LookupOutcome::Failed(err)
        }
    };
    debug!(cnpj = cnpj.as_str(), outcome = outcome.as_str(), "company lookup");
    Ok(outcome)
}

/// Copies the looked-up company attributes into the in-progress form.
pub fn apply_to_form(profile: &CompanyProfile, form: &mut ContractForm) {
    form.name = profile.name.clone();
    form.owner_name = profile.owner_name.clone();
    form.address = profile.address.clone();
    form.phone = profile.phone.clone();
    if let Some(trade_name) = &profile.trade_name {
        form.trade_name = Some(trade_name.clone());
    }
    if let Some(cep) = &profile.cep {
        form.cep = Some(cep.as_str().to_string());
    }
}
