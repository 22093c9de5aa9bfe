#![forbid(unsafe_code)]

use contrato_kernel_contracts::contract::ContractRecord;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::http::{build_http_agent, transport_error_kind, DEFAULT_USER_AGENT};

/// Flat JSON object sent to the automation webhook: every payload field at top level plus
/// `user_id`, `contract_id` and `data_criacao`. Envelope keys overwrite payload keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NotificationPayload(Map<String, Value>);

impl NotificationPayload {
    pub fn from_record(record: &ContractRecord) -> Result<Self, NotifyError> {
        let mut fields = match serde_json::to_value(&record.payload) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                return Err(NotifyError::Encode {
                    detail: "contract payload is not an object".to_string(),
                })
            }
            Err(err) => {
                return Err(NotifyError::Encode {
                    detail: err.to_string(),
                })
            }
        };
        fields.insert(
            "user_id".to_string(),
            Value::String(record.owner_id.as_str().to_string()),
        );
        fields.insert(
            "contract_id".to_string(),
            Value::String(record.id.as_str().to_string()),
        );
        fields.insert(
            "data_criacao".to_string(),
            Value::String(record.created_at.to_rfc3339()),
        );
        Ok(Self(fields))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contract_id(&self) -> Option<&str> {
        self.0.get("contract_id").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification payload encode failed: {detail}")]
    Encode { detail: String },
    #[error("webhook answered http status {status}")]
    Status { status: u16 },
    #[error("webhook transport failure ({kind})")]
    Transport { kind: &'static str },
    #[error("webhook client misconfigured: {detail}")]
    Config { detail: String },
}

/// Fire-once delivery of a persisted contract to downstream automation.
pub trait ContractNotifier {
    fn notify(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotifierConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    endpoint: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Result<Self, NotifyError> {
        let agent = build_http_agent(config.timeout_ms, DEFAULT_USER_AGENT)
            .map_err(|detail| NotifyError::Config { detail })?;
        Ok(Self {
            endpoint: config.endpoint,
            agent,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ContractNotifier for WebhookNotifier {
    fn notify(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_string(payload).map_err(|err| NotifyError::Encode {
            detail: err.to_string(),
        })?;
        let contract_id = payload.contract_id().unwrap_or_default();
        let req = self
            .agent
            .post(&self.endpoint)
            .set("content-type", "application/json")
            .set("x-contrato-contract-id", contract_id);
        match req.send_string(&body) {
            Ok(resp) if (200..=299).contains(&resp.status()) => {
                debug!(contract_id, status = resp.status(), "webhook delivered");
                Ok(())
            }
            Ok(resp) => {
                warn!(contract_id, status = resp.status(), "webhook not accepted");
                Err(NotifyError::Status {
                    status: resp.status(),
                })
            }
            Err(ureq::Error::Status(status, _)) => {
                warn!(contract_id, status, "webhook rejected notification");
                Err(NotifyError::Status { status })
            }
            Err(ureq::Error::Transport(transport)) => {
                let kind = transport_error_kind(&transport);
                warn!(contract_id, kind, "webhook unreachable");
                Err(NotifyError::Transport { kind })
            }
        }
    }
}
