#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use contrato_engines::notify::{ContractNotifier, NotificationPayload, NotifyError};
use contrato_kernel_contracts::contract::{
    CallerContext, ContractId, ContractPayload, ContractRecord, OwnerId,
};
use contrato_kernel_contracts::form::ContractForm;
use contrato_kernel_contracts::{ContractViolation, ReasonCodeId, ValidationErrors};
use contrato_storage::contracts::StorageError;
use contrato_storage::repo::ContractRepo;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::session::ContractSession;

pub mod reason_codes {
    use contrato_kernel_contracts::ReasonCodeId;

    // Submission reason-code namespace.
    pub const SUBMISSION_PERSISTED: ReasonCodeId = ReasonCodeId(0x4354_0001);
    pub const SUBMISSION_PERSISTED_NOTIFIED: ReasonCodeId = ReasonCodeId(0x4354_0002);
    pub const SUBMISSION_NOTIFICATION_FAILED: ReasonCodeId = ReasonCodeId(0x4354_0003);
    pub const SUBMISSION_VALIDATION_FAILED: ReasonCodeId = ReasonCodeId(0x4354_0101);
    pub const SUBMISSION_UNAUTHENTICATED: ReasonCodeId = ReasonCodeId(0x4354_0102);
    pub const SUBMISSION_IDEMPOTENCY_CONFLICT: ReasonCodeId = ReasonCodeId(0x4354_0103);
    pub const SUBMISSION_STORAGE_FAILED: ReasonCodeId = ReasonCodeId(0x4354_0104);
    pub const SUBMISSION_INTERNAL_ERROR: ReasonCodeId = ReasonCodeId(0x4354_01F1);

    pub const RETRIEVAL_UNAUTHENTICATED: ReasonCodeId = ReasonCodeId(0x4354_0201);
    pub const RETRIEVAL_NOT_FOUND: ReasonCodeId = ReasonCodeId(0x4354_0202);
    pub const RETRIEVAL_FORBIDDEN: ReasonCodeId = ReasonCodeId(0x4354_0203);
    pub const RETRIEVAL_STORAGE_FAILED: ReasonCodeId = ReasonCodeId(0x4354_0204);
}

pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;
/// Remembered idempotency keys across all owners; the oldest key is forgotten first.
pub const IDEMPOTENCY_KEYS_MAX: usize = 1024;
pub const IDEMPOTENCY_KEY_INVALID: &str = "Chave de idempotência inválida";

pub const SUBMITTED_MESSAGE: &str = "Contrato enviado com sucesso!";
pub const SUBMITTED_NOTIFICATION_FAILED_MESSAGE: &str =
    "Contrato salvo, mas a notificação externa falhou";

/// Result of a submission that reached durable storage. Notification is reported separately
/// so a degraded success can never be mistaken for a full one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Stored; no notifier configured, or an idempotent replay of an earlier submission.
    Persisted { record: ContractRecord },
    PersistedAndNotified { record: ContractRecord },
    PersistedNotificationFailed {
        record: ContractRecord,
        reason: NotifyError,
    },
}

impl SubmissionOutcome {
    pub fn record(&self) -> &ContractRecord {
        match self {
            SubmissionOutcome::Persisted { record }
            | SubmissionOutcome::PersistedAndNotified { record }
            | SubmissionOutcome::PersistedNotificationFailed { record, .. } => record,
        }
    }

    pub fn into_record(self) -> ContractRecord {
        match self {
            SubmissionOutcome::Persisted { record }
            | SubmissionOutcome::PersistedAndNotified { record }
            | SubmissionOutcome::PersistedNotificationFailed { record, .. } => record,
        }
    }

    pub fn is_full_success(&self) -> bool {
        !self.notification_degraded()
    }

    pub fn notification_degraded(&self) -> bool {
        matches!(self, SubmissionOutcome::PersistedNotificationFailed { .. })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SubmissionOutcome::Persisted { .. } => "PERSISTED",
            SubmissionOutcome::PersistedAndNotified { .. } => "PERSISTED_NOTIFIED",
            SubmissionOutcome::PersistedNotificationFailed { .. } => {
                "PERSISTED_NOTIFICATION_FAILED"
            }
        }
    }

    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            SubmissionOutcome::Persisted { .. } => reason_codes::SUBMISSION_PERSISTED,
            SubmissionOutcome::PersistedAndNotified { .. } => {
                reason_codes::SUBMISSION_PERSISTED_NOTIFIED
            }
            SubmissionOutcome::PersistedNotificationFailed { .. } => {
                reason_codes::SUBMISSION_NOTIFICATION_FAILED
            }
        }
    }

    pub fn user_message(&self) -> &'static str {
        if self.notification_degraded() {
            SUBMITTED_NOTIFICATION_FAILED_MESSAGE
        } else {
            SUBMITTED_MESSAGE
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission failed validation: {0}")]
    Validation(ValidationErrors),
    #[error("submission requires an authenticated owner")]
    Unauthenticated,
    #[error("idempotency key {key:?} was already used with a different payload")]
    IdempotencyConflict { key: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("submission internal error: {detail}")]
    Internal { detail: String },
}

impl SubmissionError {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            SubmissionError::Validation(_) => reason_codes::SUBMISSION_VALIDATION_FAILED,
            SubmissionError::Unauthenticated => reason_codes::SUBMISSION_UNAUTHENTICATED,
            SubmissionError::IdempotencyConflict { .. } => {
                reason_codes::SUBMISSION_IDEMPOTENCY_CONFLICT
            }
            SubmissionError::Storage(_) => reason_codes::SUBMISSION_STORAGE_FAILED,
            SubmissionError::Internal { .. } => reason_codes::SUBMISSION_INTERNAL_ERROR,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            SubmissionError::Validation(_) => "Verifique os campos destacados no formulário",
            SubmissionError::Unauthenticated => {
                "Você precisa estar logado para enviar um contrato"
            }
            SubmissionError::IdempotencyConflict { .. } => {
                "Este envio já foi registrado com dados diferentes"
            }
            SubmissionError::Storage(_) | SubmissionError::Internal { .. } => {
                "Erro ao salvar contrato. Tente novamente."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval requires an authenticated caller")]
    Unauthenticated,
    #[error("contract {id} not found")]
    NotFound { id: String },
    #[error("caller may not read contract {id}")]
    Forbidden { id: String },
    #[error(transparent)]
    Storage(StorageError),
}

impl RetrievalError {
    fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key, .. } => RetrievalError::NotFound { id: key },
            StorageError::Unauthorized { key, .. } => RetrievalError::Forbidden { id: key },
            // BackendDenied lands here: the service credentials failed, not the caller.
            other => RetrievalError::Storage(other),
        }
    }

    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            RetrievalError::Unauthenticated => reason_codes::RETRIEVAL_UNAUTHENTICATED,
            RetrievalError::NotFound { .. } => reason_codes::RETRIEVAL_NOT_FOUND,
            RetrievalError::Forbidden { .. } => reason_codes::RETRIEVAL_FORBIDDEN,
            RetrievalError::Storage(_) => reason_codes::RETRIEVAL_STORAGE_FAILED,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            RetrievalError::Unauthenticated => "Você precisa estar logado",
            RetrievalError::NotFound { .. } => "Contrato não encontrado",
            RetrievalError::Forbidden { .. } => "Você não tem acesso a este contrato",
            RetrievalError::Storage(_) => "Erro ao carregar contratos. Tente novamente.",
        }
    }
}

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    fingerprint: String,
    record: ContractRecord,
}

pub struct SubmissionPipeline {
    repo: Box<dyn ContractRepo + Send>,
    notifier: Option<Box<dyn ContractNotifier + Send>>,
    idempotency: BTreeMap<(OwnerId, String), IdempotencyEntry>,
    idempotency_order: VecDeque<(OwnerId, String)>,
    idempotency_capacity: usize,
}

impl SubmissionPipeline {
    pub fn new(
        repo: Box<dyn ContractRepo + Send>,
        notifier: Option<Box<dyn ContractNotifier + Send>>,
    ) -> Self {
        Self {
            repo,
            notifier,
            idempotency: BTreeMap::new(),
            idempotency_order: VecDeque::new(),
            idempotency_capacity: IDEMPOTENCY_KEYS_MAX,
        }
    }

    pub fn with_idempotency_capacity(mut self, capacity: usize) -> Self {
        self.idempotency_capacity = capacity.max(1);
        self.evict_idempotency_keys();
        self
    }

    pub fn remembered_idempotency_keys(&self) -> usize {
        self.idempotency.len()
    }

    fn remember_idempotency_key(&mut self, key: (OwnerId, String), entry: IdempotencyEntry) {
        if self.idempotency.insert(key.clone(), entry).is_none() {
            self.idempotency_order.push_back(key);
        }
        self.evict_idempotency_keys();
    }

    fn evict_idempotency_keys(&mut self) {
        while self.idempotency_order.len() > self.idempotency_capacity {
            if let Some(oldest) = self.idempotency_order.pop_front() {
                self.idempotency.remove(&oldest);
            }
        }
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn submit(
        &mut self,
        caller: &CallerContext,
        form: &ContractForm,
        idempotency_key: Option<&str>,
        session: &mut ContractSession,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        self.submit_at(caller, form, idempotency_key, session, Utc::now())
    }

    pub fn submit_at(
        &mut self,
        caller: &CallerContext,
        form: &ContractForm,
        idempotency_key: Option<&str>,
        session: &mut ContractSession,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let payload = form.validate().map_err(|errors| {
            info!(fields = errors.len(), "submission rejected by validation");
            SubmissionError::Validation(errors)
        })?;
        let Some(owner_id) = caller.owner_id.clone() else {
            warn!("submission rejected: no owner identity");
            return Err(SubmissionError::Unauthenticated);
        };

        let idempotency = match idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => {
                let key = normalize_idempotency_key(key)?;
                let fingerprint = payload_fingerprint(&payload)?;
                if let Some(entry) = self.idempotency.get(&(owner_id.clone(), key.clone())) {
                    if entry.fingerprint != fingerprint {
                        warn!(owner_id = owner_id.as_str(), "idempotency key reused");
                        return Err(SubmissionError::IdempotencyConflict { key });
                    }
                    info!(
                        contract_id = entry.record.id.as_str(),
                        "idempotent replay, returning stored contract"
                    );
                    return Ok(SubmissionOutcome::Persisted {
                        record: entry.record.clone(),
                    });
                }
                Some((key, fingerprint))
            }
            None => None,
        };

        let record = ContractRecord::v1(ContractId::generate(), owner_id.clone(), now, payload);
        let record = self.repo.insert_contract_row(record).map_err(|err| {
            error!(owner_id = owner_id.as_str(), error = %err, "contract persistence failed");
            SubmissionError::Storage(err)
        })?;
        info!(
            contract_id = record.id.as_str(),
            owner_id = owner_id.as_str(),
            "contract persisted"
        );

        if let Some((key, fingerprint)) = idempotency {
            self.remember_idempotency_key(
                (owner_id, key),
                IdempotencyEntry {
                    fingerprint,
                    record: record.clone(),
                },
            );
        }
        session.append(record.clone());

        let Some(notifier) = self.notifier.as_ref() else {
            return Ok(SubmissionOutcome::Persisted { record });
        };
        let delivery = NotificationPayload::from_record(&record)
            .and_then(|payload| notifier.notify(&payload));
        match delivery {
            Ok(()) => Ok(SubmissionOutcome::PersistedAndNotified { record }),
            Err(reason) => {
                warn!(
                    contract_id = record.id.as_str(),
                    error = %reason,
                    "contract saved but notification failed"
                );
                Ok(SubmissionOutcome::PersistedNotificationFailed { record, reason })
            }
        }
    }

    /// Reloads the caller's visible contracts into `session`.
    pub fn list_contracts<'s>(
        &self,
        caller: &CallerContext,
        session: &'s mut ContractSession,
    ) -> Result<&'s [ContractRecord], RetrievalError> {
        if !caller.is_authenticated() {
            return Err(RetrievalError::Unauthenticated);
        }
        let rows = self
            .repo
            .contract_rows_for(caller)
            .map_err(RetrievalError::from_storage)?;
        session.replace(rows);
        Ok(session.contracts())
    }

    pub fn contract_by_id(
        &self,
        caller: &CallerContext,
        id: &ContractId,
    ) -> Result<ContractRecord, RetrievalError> {
        if !caller.is_authenticated() {
            return Err(RetrievalError::Unauthenticated);
        }
        self.repo
            .contract_row_by_id(caller, id)
            .map_err(RetrievalError::from_storage)
    }
}

fn normalize_idempotency_key(key: &str) -> Result<String, SubmissionError> {
    if key.chars().count() > IDEMPOTENCY_KEY_MAX_LEN || key.chars().any(char::is_control) {
        let mut errors = ValidationErrors::new();
        errors.record(ContractViolation::InvalidValue {
            field: "idempotencyKey",
            reason: IDEMPOTENCY_KEY_INVALID,
        });
        return Err(SubmissionError::Validation(errors));
    }
    Ok(key.to_string())
}

/// SHA-256 over the serialized payload. Field order is fixed by the struct layout.
pub fn payload_fingerprint(payload: &ContractPayload) -> Result<String, SubmissionError> {
    let canonical = serde_json::to_vec(payload).map_err(|err| SubmissionError::Internal {
        detail: format!("payload encode failed: {err}"),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}
