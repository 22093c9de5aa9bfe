#![forbid(unsafe_code)]

//! Tax-id → company attributes, from a fixed demo directory or the live registry API.

use std::collections::BTreeMap;

use contrato_kernel_contracts::company::{cnpj_digits, Cep, Cnpj};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http::{build_http_agent, transport_error_kind, DEFAULT_USER_AGENT};

pub const NOT_AVAILABLE: &str = "Não disponível";

pub const LOOKUP_NOT_FOUND_MESSAGE: &str = "CNPJ não encontrado";
pub const LOOKUP_TRANSPORT_MESSAGE: &str =
    "Não foi possível conectar ao serviço de consulta de CNPJ. Tente novamente.";
pub const LOOKUP_UNAVAILABLE_MESSAGE: &str =
    "Serviço de consulta de CNPJ indisponível no momento. Tente novamente.";
pub const LOOKUP_MALFORMED_MESSAGE: &str = "Resposta inválida do serviço de consulta de CNPJ";

/// Best-effort registry view of a company, used to prefill the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub cnpj: Cnpj,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    pub owner_name: String,
    pub address: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cep: Option<Cep>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompanyLookupError {
    #[error("company registry transport failure ({kind})")]
    Transport { kind: &'static str },
    #[error("company registry answered http status {status}")]
    Status { status: u16 },
    #[error("company registry response is malformed: {detail}")]
    MalformedBody { detail: &'static str },
    #[error("company registry client misconfigured: {detail}")]
    Config { detail: String },
}

impl CompanyLookupError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CompanyLookupError::Transport { .. } => LOOKUP_TRANSPORT_MESSAGE,
            CompanyLookupError::Status { .. } | CompanyLookupError::Config { .. } => {
                LOOKUP_UNAVAILABLE_MESSAGE
            }
            CompanyLookupError::MalformedBody { .. } => LOOKUP_MALFORMED_MESSAGE,
        }
    }

    /// Whether trying the same lookup later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompanyLookupError::Transport { .. } | CompanyLookupError::Status { .. }
        )
    }
}

/// `Ok(None)` is the registry's explicit "no such company"; errors are everything else.
pub trait CompanyLookup {
    fn lookup(&self, cnpj: &Cnpj) -> Result<Option<CompanyProfile>, CompanyLookupError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCompanyDirectory {
    entries: BTreeMap<Cnpj, CompanyProfile>,
}

impl StaticCompanyDirectory {
    pub fn with_entries(entries: impl IntoIterator<Item = CompanyProfile>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|profile| (profile.cnpj.clone(), profile))
                .collect(),
        }
    }

    /// The two companies the demo environment knows about.
    pub fn demo() -> Result<Self, CompanyLookupError> {
        let config_err = |_| CompanyLookupError::Config {
            detail: "demo directory entry is invalid".to_string(),
        };
        Ok(Self::with_entries([
            CompanyProfile {
                cnpj: Cnpj::parse("12345678000199").map_err(config_err)?,
                name: "Empresa Demonstração Ltda".to_string(),
                trade_name: None,
                owner_name: "João Silva".to_string(),
                address: "Av. Paulista, 1000, São Paulo - SP, 01310-100".to_string(),
                phone: "(11) 3333-4444".to_string(),
                cep: Some(Cep::parse("01310-100").map_err(config_err)?),
            },
            CompanyProfile {
                cnpj: Cnpj::parse("98765432000188").map_err(config_err)?,
                name: "Tecnologia Avançada S.A.".to_string(),
                trade_name: None,
                owner_name: "Maria Souza".to_string(),
                address: "Rua das Flores, 500, Rio de Janeiro - RJ, 22000-100".to_string(),
                phone: "(21) 2222-3333".to_string(),
                cep: Some(Cep::parse("22000-100").map_err(config_err)?),
            },
        ]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CompanyLookup for StaticCompanyDirectory {
    fn lookup(&self, cnpj: &Cnpj) -> Result<Option<CompanyProfile>, CompanyLookupError> {
        let found = self.entries.get(cnpj).cloned();
        debug!(cnpj = cnpj.as_str(), found = found.is_some(), "static company lookup");
        Ok(found)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCompanyLookupConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct HttpCompanyLookup {
    config: HttpCompanyLookupConfig,
    agent: ureq::Agent,
}

impl HttpCompanyLookup {
    pub fn new(config: HttpCompanyLookupConfig) -> Result<Self, CompanyLookupError> {
        let agent = build_http_agent(config.timeout_ms, DEFAULT_USER_AGENT)
            .map_err(|detail| CompanyLookupError::Config { detail })?;
        Ok(Self { config, agent })
    }

    pub fn office_url(&self, cnpj: &Cnpj) -> String {
        format!(
            "{}/office/{}",
            self.config.endpoint.trim_end_matches('/'),
            cnpj.as_str()
        )
    }
}

impl CompanyLookup for HttpCompanyLookup {
    fn lookup(&self, cnpj: &Cnpj) -> Result<Option<CompanyProfile>, CompanyLookupError> {
        let mut req = self
            .agent
            .get(&self.office_url(cnpj))
            .set("Accept", "application/json");
        if let Some(key) = self.config.api_key.as_deref() {
            req = req.set("Authorization", key);
        }
        match req.call() {
            Ok(response) => {
                let body: Value =
                    response
                        .into_json()
                        .map_err(|_| CompanyLookupError::MalformedBody {
                            detail: "body is not json",
                        })?;
                let profile = parse_company_response(cnpj, &body)?;
                info!(cnpj = cnpj.as_str(), "company registry lookup hit");
                Ok(Some(profile))
            }
            Err(ureq::Error::Status(404, _)) => {
                info!(cnpj = cnpj.as_str(), "company registry lookup miss");
                Ok(None)
            }
            Err(ureq::Error::Status(status, _)) => {
                warn!(cnpj = cnpj.as_str(), status, "company registry lookup failed");
                Err(CompanyLookupError::Status { status })
            }
            Err(ureq::Error::Transport(transport)) => {
                let kind = transport_error_kind(&transport);
                warn!(cnpj = cnpj.as_str(), kind, "company registry unreachable");
                Err(CompanyLookupError::Transport { kind })
            }
        }
    }
}

fn non_empty_str<'a>(root: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .filter_map(|p| root.pointer(p).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

fn first_array<'a>(root: &'a Value, pointers: &[&str]) -> &'a [Value] {
    pointers
        .iter()
        .filter_map(|p| root.pointer(p).and_then(Value::as_array))
        .find(|v| !v.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Maps a registry office document onto a profile.
///
/// Owner: first member whose role mentions "administrador", else the first member.
/// Address and phone: the head office when listed, else the first office, else top level.
pub fn parse_company_response(
    cnpj: &Cnpj,
    body: &Value,
) -> Result<CompanyProfile, CompanyLookupError> {
    if !body.is_object() {
        return Err(CompanyLookupError::MalformedBody {
            detail: "body is not an object",
        });
    }
    let name = non_empty_str(body, &["/company/name", "/name", "/razao_social"]).ok_or(
        CompanyLookupError::MalformedBody {
            detail: "missing company name",
        },
    )?;
    let trade_name = non_empty_str(body, &["/alias", "/nome_fantasia"]).map(ToString::to_string);

    let members = first_array(body, &["/members", "/company/members", "/socios"]);
    let member_name = |m: &Value| -> Option<String> {
        non_empty_str(m, &["/person/name", "/name", "/nome"]).map(ToString::to_string)
    };
    let is_admin = |m: &Value| {
        non_empty_str(m, &["/role/text", "/role", "/tipo"])
            .map(|role| role.to_lowercase().contains("administrador"))
            .unwrap_or(false)
    };
    let owner_name = members
        .iter()
        .filter(|m| is_admin(*m))
        .find_map(member_name)
        .or_else(|| members.iter().find_map(member_name))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let offices = first_array(body, &["/offices"]);
    let office = offices
        .iter()
        .find(|o| o.pointer("/head").and_then(Value::as_bool) == Some(true))
        .or_else(|| offices.first())
        .unwrap_or(body);

    let (address, zip) = match office.pointer("/address") {
        Some(addr) => (format_address(addr), non_empty_str(addr, &["/zip"])),
        None => (None, None),
    };
    let cep = zip.and_then(cep_from_zip);
    let phone = first_array(office, &["/phones"])
        .iter()
        .find_map(format_phone)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Ok(CompanyProfile {
        cnpj: cnpj.clone(),
        name: name.to_string(),
        trade_name,
        owner_name,
        address: address.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        phone,
        cep,
    })
}

fn format_address(addr: &Value) -> Option<String> {
    let part = |p: &str| non_empty_str(addr, &[p]).map(ToString::to_string);
    let city_state = match (part("/city"), part("/state")) {
        (Some(city), Some(state)) => Some(format!("{city} - {state}")),
        (city, state) => city.or(state),
    };
    let segments: Vec<String> = [
        part("/street"),
        part("/number"),
        part("/details"),
        part("/district"),
        city_state,
        part("/zip"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if segments.is_empty() {
        return None;
    }
    Some(segments.join(", "))
}

fn format_phone(phone: &Value) -> Option<String> {
    let number = non_empty_str(phone, &["/number"])?;
    match non_empty_str(phone, &["/area"]) {
        Some(area) => Some(format!("({area}) {number}")),
        None => Some(number.to_string()),
    }
}

fn cep_from_zip(zip: &str) -> Option<Cep> {
    let digits = cnpj_digits(zip);
    if digits.len() != 8 {
        return None;
    }
    Cep::parse(&format!("{}-{}", &digits[..5], &digits[5..])).ok()
}
