#![forbid(unsafe_code)]

//! Raw submission form and the acceptance rules it must satisfy before anything is persisted.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{optional_text, require_min_chars};
use crate::company::{
    Cep, Cnpj, Company, ADDRESS_TOO_SHORT, NAME_TOO_SHORT, OWNER_NAME_TOO_SHORT, PHONE_TOO_SHORT,
    TRADE_NAME_TOO_SHORT,
};
use crate::contract::{
    BusinessSegment, Choice, CommercialTeam, ContractCategory, ContractDuration, ContractPayload,
    EmailAddress, LabelledOption, LeadSource, PaymentMethod, ProjectType,
    CONTRACT_VALUE_MAX_SCALE, CUSTOM_DURATION_REQUIRED, CUSTOM_PROJECT_TYPE_REQUIRED,
    CUSTOM_SEGMENT_REQUIRED,
};
use crate::{ContractViolation, ValidationErrors};

pub use crate::contract::{
    validate_contract_value, CONTRACT_VALUE_NOT_POSITIVE, CONTRACT_VALUE_TOO_LARGE,
    CONTRACT_VALUE_TOO_PRECISE,
};

static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("number regex is valid")
});

pub const CONFIRMATION_REQUIRED: &str = "Você precisa confirmar que os dados estão corretos";
pub const CONTRACT_TYPE_INVALID: &str = "Tipo de contrato inválido";
pub const COMMERCIAL_TEAM_INVALID: &str = "Selecione o time comercial";
pub const SEGMENT_INVALID: &str = "Selecione o segmento";
pub const PROJECT_TYPE_INVALID: &str = "Selecione o tipo de projeto";
pub const LEAD_SOURCE_INVALID: &str = "Selecione a origem do lead";
pub const PAYMENT_METHOD_INVALID: &str = "Selecione a forma de pagamento";
pub const DURATION_INVALID: &str = "Selecione a duração do contrato";
pub const SALES_REP_TOO_SHORT: &str = "Nome do vendedor deve ter pelo menos 3 caracteres";
pub const BDR_REP_TOO_SHORT: &str = "Nome do BDR deve ter pelo menos 3 caracteres";
pub const SIGNER_NAME_TOO_SHORT: &str = "Nome do assinante deve ter pelo menos 3 caracteres";
pub const SALE_DATE_INVALID: &str = "Data da venda inválida";
pub const PAYMENT_DATE_INVALID: &str = "Data do pagamento inválida";
pub const CONTRACT_VALUE_REQUIRED: &str = "Informe o valor do contrato";
pub const CONTRACT_VALUE_INVALID: &str = "Valor do contrato inválido";
pub const DELIVERABLES_REQUIRED: &str = "Descreva os entregáveis";

/// Contract submission exactly as the multi-step form posts it: every select is a label,
/// "Outro" selects carry a `custom*` companion, the value may be a number or a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractForm {
    pub cnpj: String,
    pub name: String,
    pub owner_name: String,
    pub address: String,
    pub phone: String,
    pub trade_name: Option<String>,
    pub cep: Option<String>,
    pub contract_type: String,
    pub description: Option<String>,
    pub commercial_team: String,
    pub segment: String,
    pub custom_segment: Option<String>,
    pub project_type: String,
    pub custom_project_type: Option<String>,
    pub sales_representative: String,
    pub bdr_representative: String,
    pub lead_source: String,
    pub sale_date: String,
    pub payment_date: String,
    pub signer_name: String,
    pub signer_email: String,
    pub contract_value: Option<Value>,
    pub payment_method: String,
    pub duration: String,
    pub custom_duration: Option<String>,
    pub deliverables: String,
    pub observations: Option<String>,
    pub data_confirmed: bool,
}

impl ContractForm {
    /// Runs every rule and either returns the typed payload or all failing fields at once.
    pub fn validate(&self) -> Result<ContractPayload, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let company = self.validate_company(&mut errors);

        let category = errors.check(select::<ContractCategory>(
            "contractType",
            &self.contract_type,
            CONTRACT_TYPE_INVALID,
        ));
        let commercial_team = errors.check(select::<CommercialTeam>(
            "commercialTeam",
            &self.commercial_team,
            COMMERCIAL_TEAM_INVALID,
        ));
        let segment = errors.check(Choice::<BusinessSegment>::from_form(
            "segment",
            "customSegment",
            &self.segment,
            self.custom_segment.as_deref(),
            SEGMENT_INVALID,
            CUSTOM_SEGMENT_REQUIRED,
        ));
        let project_type = errors.check(Choice::<ProjectType>::from_form(
            "projectType",
            "customProjectType",
            &self.project_type,
            self.custom_project_type.as_deref(),
            PROJECT_TYPE_INVALID,
            CUSTOM_PROJECT_TYPE_REQUIRED,
        ));
        let sales_representative = errors.check(require_min_chars(
            "salesRepresentative",
            &self.sales_representative,
            3,
            SALES_REP_TOO_SHORT,
        ));
        let bdr_representative = errors.check(require_min_chars(
            "bdrRepresentative",
            &self.bdr_representative,
            3,
            BDR_REP_TOO_SHORT,
        ));
        let lead_source = errors.check(select::<LeadSource>(
            "leadSource",
            &self.lead_source,
            LEAD_SOURCE_INVALID,
        ));
        let sale_date = errors.check(parse_form_date(
            "saleDate",
            &self.sale_date,
            SALE_DATE_INVALID,
        ));
        let payment_date = errors.check(parse_form_date(
            "paymentDate",
            &self.payment_date,
            PAYMENT_DATE_INVALID,
        ));
        let signer_name = errors.check(require_min_chars(
            "signerName",
            &self.signer_name,
            3,
            SIGNER_NAME_TOO_SHORT,
        ));
        let signer_email = errors.check(
            EmailAddress::parse(&self.signer_email).map_err(|v| v.for_field("signerEmail")),
        );
        let contract_value = errors.check(parse_contract_value(self.contract_value.as_ref()));
        let payment_method = errors.check(select::<PaymentMethod>(
            "paymentMethod",
            &self.payment_method,
            PAYMENT_METHOD_INVALID,
        ));
        let duration = errors.check(Choice::<ContractDuration>::from_form(
            "duration",
            "customDuration",
            &self.duration,
            self.custom_duration.as_deref(),
            DURATION_INVALID,
            CUSTOM_DURATION_REQUIRED,
        ));
        let deliverables = errors.check(require_min_chars(
            "deliverables",
            &self.deliverables,
            1,
            DELIVERABLES_REQUIRED,
        ));
        if !self.data_confirmed {
            errors.record(ContractViolation::InvalidValue {
                field: "dataConfirmed",
                reason: CONFIRMATION_REQUIRED,
            });
        }

        let (
            Some(company),
            Some(category),
            Some(commercial_team),
            Some(segment),
            Some(project_type),
            Some(sales_representative),
            Some(bdr_representative),
            Some(lead_source),
            Some(sale_date),
            Some(payment_date),
            Some(signer_name),
            Some(signer_email),
            Some(contract_value),
            Some(payment_method),
            Some(duration),
            Some(deliverables),
        ) = (
            company,
            category,
            commercial_team,
            segment,
            project_type,
            sales_representative,
            bdr_representative,
            lead_source,
            sale_date,
            payment_date,
            signer_name,
            signer_email,
            contract_value,
            payment_method,
            duration,
            deliverables,
        )
        else {
            return Err(errors);
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ContractPayload {
            company,
            category,
            description: optional_text(self.description.as_deref()),
            commercial_team,
            segment,
            project_type,
            sales_representative,
            bdr_representative,
            lead_source,
            sale_date,
            payment_date,
            signer_name,
            signer_email,
            contract_value,
            payment_method,
            duration,
            deliverables,
            observations: optional_text(self.observations.as_deref()),
            data_confirmed: true,
        })
    }

    fn validate_company(&self, errors: &mut ValidationErrors) -> Option<Company> {
        let cnpj = errors.check(Cnpj::parse(&self.cnpj));
        let name = errors.check(require_min_chars("name", &self.name, 3, NAME_TOO_SHORT));
        let owner_name = errors.check(require_min_chars(
            "ownerName",
            &self.owner_name,
            3,
            OWNER_NAME_TOO_SHORT,
        ));
        let address = errors.check(require_min_chars(
            "address",
            &self.address,
            5,
            ADDRESS_TOO_SHORT,
        ));
        let phone = errors.check(require_min_chars("phone", &self.phone, 8, PHONE_TOO_SHORT));
        let trade_name = match optional_text(self.trade_name.as_deref()) {
            Some(v) => errors
                .check(require_min_chars("tradeName", &v, 3, TRADE_NAME_TOO_SHORT))
                .map(Some),
            None => Some(None),
        };
        let cep = match optional_text(self.cep.as_deref()) {
            Some(v) => errors.check(Cep::parse(&v)).map(Some),
            None => Some(None),
        };

        let (Some(cnpj), Some(name), Some(owner_name), Some(address), Some(phone)) =
            (cnpj, name, owner_name, address, phone)
        else {
            return None;
        };
        let (Some(trade_name), Some(cep)) = (trade_name, cep) else {
            return None;
        };
        Some(Company {
            cnpj,
            name,
            owner_name,
            address,
            phone,
            segment: None,
            cep,
            trade_name,
        })
    }
}

fn select<T: LabelledOption>(
    field: &'static str,
    raw: &str,
    invalid: &'static str,
) -> Result<T, ContractViolation> {
    T::from_label(raw).ok_or(ContractViolation::InvalidValue {
        field,
        reason: invalid,
    })
}

/// Date pickers post either `YYYY-MM-DD` or a full RFC 3339 timestamp; only the date counts.
pub fn parse_form_date(
    field: &'static str,
    raw: &str,
    reason: &'static str,
) -> Result<NaiveDate, ContractViolation> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.date_naive()))
        .map_err(|_| ContractViolation::InvalidValue { field, reason })
}

/// Accepts a JSON number or numeric string. Text that is not a number is invalid; numbers
/// that do not fit the money rules get the message for the rule they break.
pub fn parse_contract_value(raw: Option<&Value>) -> Result<Decimal, ContractViolation> {
    let text = match raw {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(value_violation(CONTRACT_VALUE_REQUIRED)),
    };
    let Some(parts) = NUMBER_REGEX.captures(&text) else {
        return Err(value_violation(CONTRACT_VALUE_INVALID));
    };
    let negative = &parts[1] == "-";
    let exponent = parts.get(3).map(|m| m.as_str());

    if exponent.is_none() && !negative {
        let fraction = parts[2].split_once('.').map_or("", |(_, f)| f);
        if fraction.trim_end_matches('0').len() > CONTRACT_VALUE_MAX_SCALE as usize {
            return Err(value_violation(CONTRACT_VALUE_TOO_PRECISE));
        }
    }

    let parsed = match exponent {
        None => Decimal::from_str_exact(&text),
        Some(_) => Decimal::from_scientific(&text),
    };
    let value = match parsed {
        Ok(value) => value,
        Err(_) if negative => return Err(value_violation(CONTRACT_VALUE_NOT_POSITIVE)),
        Err(_) if exponent.is_some_and(|e| e[1..].starts_with('-')) => {
            return Err(value_violation(CONTRACT_VALUE_TOO_PRECISE))
        }
        Err(_) => return Err(value_violation(CONTRACT_VALUE_TOO_LARGE)),
    };
    validate_contract_value(value)?;
    Ok(value)
}

fn value_violation(reason: &'static str) -> ContractViolation {
    ContractViolation::InvalidValue {
        field: "contractValue",
        reason,
    }
}
