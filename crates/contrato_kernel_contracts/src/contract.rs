#![forbid(unsafe_code)]

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::visible_len;
use crate::company::Company;
use crate::{ContractViolation, Validate};

/// Select value that switches an option field to its free-text companion.
pub const OTHER_SENTINEL: &str = "Outro";

pub const EMAIL_INVALID: &str = "Email inválido";
pub const CUSTOM_SEGMENT_REQUIRED: &str = "Especifique o segmento";
pub const CUSTOM_PROJECT_TYPE_REQUIRED: &str = "Especifique o tipo de projeto";
pub const CUSTOM_DURATION_REQUIRED: &str = "Especifique a duração do contrato";
pub const CONTRACT_VALUE_NOT_POSITIVE: &str = "Valor do contrato deve ser positivo";
pub const CONTRACT_VALUE_TOO_LARGE: &str = "Valor do contrato excede o limite permitido";
pub const CONTRACT_VALUE_TOO_PRECISE: &str = "Valor do contrato deve ter no máximo 2 casas decimais";

/// Largest accepted contract value, in whole reais.
pub const CONTRACT_VALUE_MAX_UNITS: i64 = 1_000_000_000_000;
/// Values are kept to the cent.
pub const CONTRACT_VALUE_MAX_SCALE: u32 = 2;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// Closed option set rendered as a select in the submission form.
pub trait LabelledOption: Copy + Sized + 'static {
    fn label(self) -> &'static str;
    fn options() -> &'static [Self];

    fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::options()
            .iter()
            .copied()
            .find(|v| v.label().to_lowercase() == normalized)
    }
}

macro_rules! labelled_option {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl LabelledOption for $name {
            fn label(self) -> &'static str {
                self.as_str()
            }

            fn options() -> &'static [Self] {
                &[$(Self::$variant,)+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_option!(
    /// Kind of engagement being sold.
    ContractCategory {
        Consultoria => "Consultoria",
        Assessoria => "Assessoria",
    }
);

labelled_option!(CommercialTeam {
    Selva => "Selva",
    Cangaco => "Cangaço",
});

labelled_option!(BusinessSegment {
    Servico => "Serviço",
    Varejo => "Varejo",
    Industria => "Indústria",
    FoodService => "Food Service",
    ECommerce => "E-commerce",
    Saas => "SAAS",
    Franquia => "Franquia",
    Imobiliaria => "Imobiliária",
});

labelled_option!(ProjectType {
    Recorrente => "Recorrente",
    ImplementacaoUnica => "Implementação única",
    Consultoria => "Consultoria",
    MentoriaMensal => "Mentoria acom. mensal",
});

labelled_option!(LeadSource {
    Inbound => "Inbound",
    Outbound => "Outbound",
    Indicacao => "Indicação",
});

labelled_option!(PaymentMethod {
    Pix => "Pix",
    Boleto => "Boleto",
    CartaoCredito => "Cartão de crédito",
    Cheque => "Cheque",
});

labelled_option!(ContractDuration {
    DozeMeses => "12 meses",
    SeisMeses => "6 meses",
    TresMeses => "3 meses",
});

/// Either one of the fixed options or the user's own wording when "Outro" was picked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Choice<T> {
    Fixed(T),
    Other(String),
}

impl<T: LabelledOption> Choice<T> {
    pub fn label(&self) -> &str {
        match self {
            Choice::Fixed(v) => v.label(),
            Choice::Other(text) => text,
        }
    }

    /// Resolves a select value plus its companion text. Blank companion text for "Outro" is
    /// reported against `custom_field`.
    pub fn from_form(
        field: &'static str,
        custom_field: &'static str,
        raw: &str,
        custom: Option<&str>,
        invalid: &'static str,
        custom_required: &'static str,
    ) -> Result<Self, ContractViolation> {
        if raw.trim().eq_ignore_ascii_case(OTHER_SENTINEL) {
            return match custom.map(str::trim).filter(|v| !v.is_empty()) {
                Some(text) => Ok(Choice::Other(text.to_string())),
                None => Err(ContractViolation::InvalidValue {
                    field: custom_field,
                    reason: custom_required,
                }),
            };
        }
        T::from_label(raw)
            .map(Choice::Fixed)
            .ok_or(ContractViolation::InvalidValue {
                field,
                reason: invalid,
            })
    }
}

impl<T: LabelledOption> fmt::Display for Choice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let v = Self(raw.trim().to_string());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EmailAddress {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !EMAIL_REGEX.is_match(&self.0) {
            return Err(ContractViolation::InvalidValue {
                field: "email",
                reason: EMAIL_INVALID,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for OwnerId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must be <= 128 chars",
            });
        }
        if self.0.chars().any(char::is_control) {
            return Err(ContractViolation::InvalidValue {
                field: "owner_id",
                reason: "must not contain control characters",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractId(String);

impl ContractId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ContractId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "contract_id",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "contract_id",
                reason: "must be <= 64 chars",
            });
        }
        if !self.0.is_ascii() {
            return Err(ContractViolation::InvalidValue {
                field: "contract_id",
                reason: "must be ASCII",
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! string_newtype_serde {
    ($name:ident, $ctor:path) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                $ctor(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_newtype_serde!(OwnerId, OwnerId::new);
string_newtype_serde!(ContractId, ContractId::new);
string_newtype_serde!(EmailAddress, EmailAddress::parse_owned);

impl EmailAddress {
    fn parse_owned(raw: String) -> Result<Self, ContractViolation> {
        Self::parse(&raw)
    }
}

pub fn contract_value_max() -> Decimal {
    Decimal::new(CONTRACT_VALUE_MAX_UNITS, 0)
}

/// Money rule shared by the form and by rows read back from storage: positive, at most
/// `CONTRACT_VALUE_MAX_UNITS`, at most two decimal places.
pub fn validate_contract_value(value: Decimal) -> Result<(), ContractViolation> {
    let reason = if value <= Decimal::ZERO {
        CONTRACT_VALUE_NOT_POSITIVE
    } else if value > contract_value_max() {
        CONTRACT_VALUE_TOO_LARGE
    } else if value.normalize().scale() > CONTRACT_VALUE_MAX_SCALE {
        CONTRACT_VALUE_TOO_PRECISE
    } else {
        return Ok(());
    };
    Err(ContractViolation::InvalidValue {
        field: "contractValue",
        reason,
    })
}

fn require_other_text<T>(choice: &Choice<T>, field: &'static str) -> Result<(), ContractViolation> {
    match choice {
        Choice::Other(text) if text.trim().is_empty() => Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        }),
        _ => Ok(()),
    }
}

/// Contract-specific fields, kept apart from the id/owner/timestamp envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractPayload {
    pub company: Company,
    #[serde(rename = "contractType")]
    pub category: ContractCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub commercial_team: CommercialTeam,
    pub segment: Choice<BusinessSegment>,
    pub project_type: Choice<ProjectType>,
    pub sales_representative: String,
    pub bdr_representative: String,
    pub lead_source: LeadSource,
    pub sale_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub signer_name: String,
    pub signer_email: EmailAddress,
    pub contract_value: Decimal,
    pub payment_method: PaymentMethod,
    pub duration: Choice<ContractDuration>,
    pub deliverables: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub data_confirmed: bool,
}

impl Validate for ContractPayload {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.company.validate()?;
        for (field, value) in [
            ("salesRepresentative", &self.sales_representative),
            ("bdrRepresentative", &self.bdr_representative),
            ("signerName", &self.signer_name),
        ] {
            if visible_len(value) < 3 {
                return Err(ContractViolation::InvalidValue {
                    field,
                    reason: "must be at least 3 characters",
                });
            }
        }
        self.signer_email
            .validate()
            .map_err(|v| v.for_field("signerEmail"))?;
        require_other_text(&self.segment, "customSegment")?;
        require_other_text(&self.project_type, "customProjectType")?;
        require_other_text(&self.duration, "customDuration")?;
        if self.deliverables.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "deliverables",
                reason: "must not be empty",
            });
        }
        validate_contract_value(self.contract_value)?;
        if !self.data_confirmed {
            return Err(ContractViolation::InvalidValue {
                field: "dataConfirmed",
                reason: "must be true for persisted contracts",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    pub owner_id: OwnerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: ContractPayload,
}

impl ContractRecord {
    pub fn v1(
        id: ContractId,
        owner_id: OwnerId,
        now: DateTime<Utc>,
        payload: ContractPayload,
    ) -> Self {
        Self {
            id,
            owner_id,
            created_at: now,
            updated_at: now,
            payload,
        }
    }
}

/// Who is asking. Replaces ambient session state: every operation that touches records
/// receives one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallerContext {
    pub owner_id: Option<OwnerId>,
    pub elevated: bool,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn owner(owner_id: OwnerId) -> Self {
        Self {
            owner_id: Some(owner_id),
            elevated: false,
        }
    }

    pub fn elevated(owner_id: OwnerId) -> Self {
        Self {
            owner_id: Some(owner_id),
            elevated: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.owner_id.is_some()
    }

    /// Elevated callers see every record; everyone else only their own.
    pub fn can_read(&self, record_owner: &OwnerId) -> bool {
        match &self.owner_id {
            Some(_) if self.elevated => true,
            Some(owner) => owner == record_owner,
            None => false,
        }
    }
}
