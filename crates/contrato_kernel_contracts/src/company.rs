#![forbid(unsafe_code)]

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::{optional_text, require_min_chars};
use crate::contract::{BusinessSegment, Choice};
use crate::{ContractViolation, Validate};

pub const CNPJ_DIGITS: usize = 14;
pub const CNPJ_FORMATTED_LEN: usize = 18;

pub const CNPJ_REQUIRED: &str = "CNPJ é obrigatório";
pub const CNPJ_FORMAT_INVALID: &str = "Formato de CNPJ inválido";
pub const CNPJ_INVALID: &str = "CNPJ inválido";
pub const CEP_INVALID: &str = "CEP inválido";
pub const NAME_TOO_SHORT: &str = "Nome deve ter pelo menos 3 caracteres";
pub const OWNER_NAME_TOO_SHORT: &str = "Nome do proprietário deve ter pelo menos 3 caracteres";
pub const ADDRESS_TOO_SHORT: &str = "Endereço deve ter pelo menos 5 caracteres";
pub const PHONE_TOO_SHORT: &str = "Telefone deve ter pelo menos 8 caracteres";
pub const TRADE_NAME_TOO_SHORT: &str = "Nome fantasia deve ter pelo menos 3 caracteres";

// ASCII classes on purpose: `\d` would also accept non-Latin digits.
static FORMATTED_CNPJ_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{2}\.[0-9]{3}\.[0-9]{3}/[0-9]{4}-[0-9]{2}$").expect("cnpj regex is valid")
});
static CEP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}-[0-9]{3}$").expect("cep regex is valid"));

pub fn cnpj_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Input mask for the tax id field: keeps at most 14 digits and inserts `.`, `.`, `/`, `-`
/// after digits 2, 5, 8 and 12 whenever another digit follows.
pub fn format_cnpj_input(raw: &str) -> String {
    let mut out = String::with_capacity(CNPJ_FORMATTED_LEN);
    for (i, d) in raw
        .chars()
        .filter(char::is_ascii_digit)
        .take(CNPJ_DIGITS)
        .enumerate()
    {
        match i {
            2 | 5 => out.push('.'),
            8 => out.push('/'),
            12 => out.push('-'),
            _ => {}
        }
        out.push(d);
    }
    out
}

/// Brazilian company tax id, stored as its 14 canonical digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cnpj(String);

impl Cnpj {
    /// Accepts either the bare 14 digits or the exact `NN.NNN.NNN/NNNN-NN` form.
    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "cnpj",
                reason: CNPJ_REQUIRED,
            });
        }
        let bare = trimmed.len() == CNPJ_DIGITS && trimmed.bytes().all(|b| b.is_ascii_digit());
        if !bare && !FORMATTED_CNPJ_REGEX.is_match(trimmed) {
            return Err(ContractViolation::InvalidValue {
                field: "cnpj",
                reason: CNPJ_FORMAT_INVALID,
            });
        }
        let v = Self(cnpj_digits(trimmed));
        v.validate()?;
        Ok(v)
    }

    /// Lenient constructor for lookups: any input whose digits are exactly 14 long.
    pub fn from_digits_of(raw: &str) -> Result<Self, ContractViolation> {
        let v = Self(cnpj_digits(raw));
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn formatted(&self) -> String {
        format_cnpj_input(&self.0)
    }
}

impl Validate for Cnpj {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != CNPJ_DIGITS || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ContractViolation::InvalidValue {
                field: "cnpj",
                reason: CNPJ_INVALID,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl Serialize for Cnpj {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cnpj {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cnpj::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Postal code in `NNNNN-NNN` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cep(String);

impl Cep {
    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let v = Self(raw.trim().to_string());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for Cep {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !CEP_REGEX.is_match(&self.0) {
            return Err(ContractViolation::InvalidValue {
                field: "cep",
                reason: CEP_INVALID,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Cep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Cep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cep::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub cnpj: Cnpj,
    pub name: String,
    pub owner_name: String,
    pub address: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<Choice<BusinessSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cep: Option<Cep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
}

impl Company {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        cnpj: Cnpj,
        name: &str,
        owner_name: &str,
        address: &str,
        phone: &str,
        segment: Option<Choice<BusinessSegment>>,
        cep: Option<Cep>,
        trade_name: Option<&str>,
    ) -> Result<Self, ContractViolation> {
        let c = Self {
            cnpj,
            name: name.trim().to_string(),
            owner_name: owner_name.trim().to_string(),
            address: address.trim().to_string(),
            phone: phone.trim().to_string(),
            segment,
            cep,
            trade_name: optional_text(trade_name),
        };
        c.validate()?;
        Ok(c)
    }
}

impl Validate for Company {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.cnpj.validate()?;
        require_min_chars("name", &self.name, 3, NAME_TOO_SHORT)?;
        require_min_chars("ownerName", &self.owner_name, 3, OWNER_NAME_TOO_SHORT)?;
        require_min_chars("address", &self.address, 5, ADDRESS_TOO_SHORT)?;
        require_min_chars("phone", &self.phone, 8, PHONE_TOO_SHORT)?;
        if let Some(trade_name) = &self.trade_name {
            require_min_chars("tradeName", trade_name, 3, TRADE_NAME_TOO_SHORT)?;
        }
        if let Some(Choice::Other(text)) = &self.segment {
            if text.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "segment",
                    reason: crate::contract::CUSTOM_SEGMENT_REQUIRED,
                });
            }
        }
        if let Some(cep) = &self.cep {
            cep.validate()?;
        }
        Ok(())
    }
}
