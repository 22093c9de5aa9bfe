#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use contrato_engines::lookup::{CompanyLookup, CompanyProfile};
use contrato_kernel_contracts::contract::{
    CallerContext, ContractId, ContractPayload, ContractRecord, OwnerId,
};
use contrato_kernel_contracts::form::ContractForm;
use contrato_kernel_contracts::{ReasonCodeId, ValidationErrors};
use contrato_os::autofill::{lookup_company, AutofillError, LookupOutcome};
use contrato_os::config::{ConfigError, ContratoConfig, LookupMode, StoreMode};
use contrato_os::session::{
    ContractQuery, ContractSession, ContractSummary, DASHBOARD_RECENT_LIMIT,
};
use contrato_os::submission::{
    RetrievalError, SubmissionError, SubmissionOutcome, SubmissionPipeline,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const USER_ID_HEADER: &str = "x-contrato-user-id";
pub const ELEVATED_HEADER: &str = "x-contrato-elevated";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Cached per-caller sessions kept by one adapter process.
pub const SESSIONS_MAX: usize = 256;

pub type SharedRuntime = Arc<AdapterRuntime>;

/// Common envelope for every route: `status` is `ok` or `error`, `outcome` a stable label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterResponse<T: Serialize> {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl<T: Serialize> AdapterResponse<T> {
    pub fn ok(outcome: &str, data: T) -> Self {
        Self {
            status: "ok".to_string(),
            outcome: outcome.to_string(),
            reason: None,
            reason_code: None,
            data: Some(data),
            errors: BTreeMap::new(),
        }
    }

    pub fn error(outcome: &str, reason: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            outcome: outcome.to_string(),
            reason: Some(reason.into()),
            reason_code: None,
            data: None,
            errors: BTreeMap::new(),
        }
    }

    fn with_reason_code(mut self, code: ReasonCodeId) -> Self {
        self.reason_code = Some(code.0);
        self
    }

    fn with_errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = errors
            .iter()
            .map(|(field, message)| (field.to_string(), message.to_string()))
            .collect();
        self
    }
}

pub type HealthResponse = AdapterResponse<HealthReport>;
pub type CompanyLookupResponse = AdapterResponse<CompanyProfile>;
pub type ValidateContractResponse = AdapterResponse<ContractPayload>;
pub type SubmitContractResponse = AdapterResponse<ContractRecord>;
pub type ContractListResponse = AdapterResponse<Vec<ContractRecord>>;
pub type ContractSummaryResponse = AdapterResponse<ContractSummary>;
pub type ContractDetailResponse = AdapterResponse<ContractRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub lookup_mode: &'static str,
    pub store_mode: &'static str,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLookupRequest {
    pub cnpj: String,
}

/// Per-caller sessions, bounded; the least recently used session is dropped first.
struct SessionCache {
    // Keyed by owner and elevation: an elevated session lists every owner's contracts.
    sessions: BTreeMap<(OwnerId, bool), ContractSession>,
    order: VecDeque<(OwnerId, bool)>,
    capacity: usize,
}

impl SessionCache {
    fn new(capacity: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn session_mut(&mut self, owner_id: &OwnerId, elevated: bool) -> &mut ContractSession {
        let key = (owner_id.clone(), elevated);
        self.order.retain(|k| k != &key);
        self.order.push_back(key.clone());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.sessions.remove(&oldest);
            }
        }
        self.sessions
            .entry(key)
            .or_insert_with(|| ContractSession::new(Some(owner_id.clone())))
    }
}

/// Shared adapter state. Health and company lookup need no lock; the pipeline and the
/// session cache each sit behind their own mutex and are never held together.
pub struct AdapterRuntime {
    lookup: Box<dyn CompanyLookup + Send + Sync>,
    health: HealthReport,
    pipeline: Mutex<SubmissionPipeline>,
    sessions: Mutex<SessionCache>,
}

impl AdapterRuntime {
    pub fn new(
        lookup: Box<dyn CompanyLookup + Send + Sync>,
        pipeline: SubmissionPipeline,
    ) -> Self {
        let health = HealthReport {
            lookup_mode: "custom",
            store_mode: "custom",
            notifications_enabled: pipeline.notifications_enabled(),
        };
        Self {
            lookup,
            health,
            pipeline: Mutex::new(pipeline),
            sessions: Mutex::new(SessionCache::new(SESSIONS_MAX)),
        }
    }

    pub fn with_session_capacity(self, capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(SessionCache::new(capacity)),
            ..self
        }
    }

    pub fn from_config(config: &ContratoConfig) -> Result<Self, ConfigError> {
        let pipeline = SubmissionPipeline::new(config.build_repo(), config.build_notifier()?);
        let mut runtime = Self::new(config.build_lookup()?, pipeline);
        runtime.health.lookup_mode = match config.lookup {
            LookupMode::Static => "static",
            LookupMode::Http(_) => "http",
        };
        runtime.health.store_mode = match config.store {
            StoreMode::Memory => "memory",
            StoreMode::Rest(_) => "rest",
        };
        Ok(runtime)
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.clone()
    }

    pub fn lookup_company(&self, raw_cnpj: &str) -> Result<LookupOutcome, AutofillError> {
        lookup_company(self.lookup.as_ref(), raw_cnpj)
    }

    fn lock_pipeline(&self) -> Result<MutexGuard<'_, SubmissionPipeline>, String> {
        self.pipeline.lock().map_err(|_| LOCK_POISONED.to_string())
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, SessionCache>, String> {
        self.sessions.lock().map_err(|_| LOCK_POISONED.to_string())
    }

    pub fn cached_sessions(&self) -> Result<usize, String> {
        Ok(self.lock_sessions()?.sessions.len())
    }

    pub fn has_session(&self, owner_id: &OwnerId, elevated: bool) -> Result<bool, String> {
        Ok(self
            .lock_sessions()?
            .sessions
            .contains_key(&(owner_id.clone(), elevated)))
    }

    pub fn submit_contract(
        &self,
        caller: &CallerContext,
        form: &ContractForm,
        idempotency_key: Option<&str>,
    ) -> Result<Result<SubmissionOutcome, SubmissionError>, String> {
        let mut scratch = ContractSession::new(caller.owner_id.clone());
        let result = self
            .lock_pipeline()?
            .submit(caller, form, idempotency_key, &mut scratch);
        if let Some(owner_id) = caller.owner_id.as_ref() {
            if !scratch.is_empty() {
                let mut sessions = self.lock_sessions()?;
                let session = sessions.session_mut(owner_id, caller.elevated);
                for record in scratch.contracts() {
                    session.append(record.clone());
                }
            }
        }
        Ok(result)
    }

    /// Reloads the caller's rows and hands the refreshed session to `read`.
    fn with_refreshed_session<T>(
        &self,
        caller: &CallerContext,
        read: impl FnOnce(&ContractSession) -> T,
    ) -> Result<Result<T, RetrievalError>, String> {
        let Some(owner_id) = caller.owner_id.as_ref() else {
            return Ok(Err(RetrievalError::Unauthenticated));
        };
        let mut fresh = ContractSession::new(Some(owner_id.clone()));
        if let Err(err) = self.lock_pipeline()?.list_contracts(caller, &mut fresh) {
            return Ok(Err(err));
        }
        let mut sessions = self.lock_sessions()?;
        let session = sessions.session_mut(owner_id, caller.elevated);
        *session = fresh;
        Ok(Ok(read(session)))
    }

    pub fn list_contracts(
        &self,
        caller: &CallerContext,
        query: &ContractQuery,
    ) -> Result<Result<Vec<ContractRecord>, RetrievalError>, String> {
        self.with_refreshed_session(caller, |session| {
            session.query(query).into_iter().cloned().collect()
        })
    }

    pub fn recent_contracts(
        &self,
        caller: &CallerContext,
    ) -> Result<Result<Vec<ContractRecord>, RetrievalError>, String> {
        self.with_refreshed_session(caller, |session| {
            session
                .recent(DASHBOARD_RECENT_LIMIT)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn contract_summary(
        &self,
        caller: &CallerContext,
    ) -> Result<Result<ContractSummary, RetrievalError>, String> {
        self.with_refreshed_session(caller, ContractSession::summary)
    }

    pub fn contract_by_id(
        &self,
        caller: &CallerContext,
        raw_id: &str,
    ) -> Result<Result<ContractRecord, RetrievalError>, String> {
        if !caller.is_authenticated() {
            return Ok(Err(RetrievalError::Unauthenticated));
        }
        let Ok(id) = ContractId::new(raw_id) else {
            return Ok(Err(RetrievalError::NotFound {
                id: raw_id.to_string(),
            }));
        };
        Ok(self.lock_pipeline()?.contract_by_id(caller, &id))
    }
}

/// Identity set by the upstream gateway. Missing or malformed user ids mean anonymous.
pub fn caller_from_headers(headers: &HeaderMap) -> CallerContext {
    let owner_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| OwnerId::new(v).ok());
    let elevated = headers
        .get(ELEVATED_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    CallerContext { owner_id, elevated }
}

fn idempotency_key_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn build_router(runtime: SharedRuntime) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/companies/lookup", post(run_company_lookup))
        .route("/v1/contracts/validate", post(run_validate_contract))
        .route("/v1/contracts", post(run_submit_contract).get(run_list_contracts))
        .route("/v1/contracts/recent", get(run_recent_contracts))
        .route("/v1/contracts/summary", get(run_contract_summary))
        .route("/v1/contracts/:id", get(run_contract_detail))
        .with_state(runtime)
}

const LOCK_POISONED: &str = "adapter runtime lock poisoned";

/// Runs blocking work (locks, outbound HTTP) off the async executor.
async fn with_runtime<T, F>(runtime: SharedRuntime, f: F) -> Result<T, String>
where
    F: FnOnce(&AdapterRuntime) -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&runtime))
        .await
        .map_err(|err| format!("adapter worker failed: {err}"))?
}

fn internal_error<T: Serialize>(reason: String) -> (StatusCode, Json<AdapterResponse<T>>) {
    warn!(reason = reason.as_str(), "adapter internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AdapterResponse::error("INTERNAL_ERROR", reason)),
    )
}

async fn healthz(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(AdapterResponse::ok("HEALTHY", runtime.health_report())),
    )
}

async fn run_company_lookup(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<CompanyLookupRequest>,
) -> (StatusCode, Json<CompanyLookupResponse>) {
    let result = with_runtime(runtime, move |rt| Ok(rt.lookup_company(&request.cnpj))).await;
    match result {
        Err(reason) => internal_error(reason),
        Ok(Err(err)) => (
            StatusCode::BAD_REQUEST,
            Json(AdapterResponse::error("INVALID_CNPJ", err.user_message())),
        ),
        Ok(Ok(LookupOutcome::Found(profile))) => {
            (StatusCode::OK, Json(AdapterResponse::ok("FOUND", profile)))
        }
        Ok(Ok(outcome)) => {
            let status = match outcome {
                LookupOutcome::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            };
            let reason = outcome.user_message().unwrap_or_default();
            (status, Json(AdapterResponse::error(outcome.as_str(), reason)))
        }
    }
}

async fn run_validate_contract(
    Json(form): Json<ContractForm>,
) -> (StatusCode, Json<ValidateContractResponse>) {
    match form.validate() {
        Ok(payload) => (StatusCode::OK, Json(AdapterResponse::ok("VALID", payload))),
        Err(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(
                AdapterResponse::error(
                    "INVALID",
                    "Verifique os campos destacados no formulário",
                )
                .with_errors(&errors),
            ),
        ),
    }
}

async fn run_submit_contract(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(form): Json<ContractForm>,
) -> (StatusCode, Json<SubmitContractResponse>) {
    let caller = caller_from_headers(&headers);
    let key = idempotency_key_from_headers(&headers);
    let result = with_runtime(runtime, move |rt| {
        rt.submit_contract(&caller, &form, key.as_deref())
    })
    .await;
    match result {
        Err(reason) => internal_error(reason),
        Ok(Ok(outcome)) => {
            info!(
                contract_id = outcome.record().id.as_str(),
                outcome = outcome.as_str(),
                "contract submitted"
            );
            let mut response = AdapterResponse::ok(outcome.as_str(), outcome.record().clone())
                .with_reason_code(outcome.reason_code());
            response.reason = Some(outcome.user_message().to_string());
            (StatusCode::CREATED, Json(response))
        }
        Ok(Err(err)) => {
            let status = match &err {
                SubmissionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SubmissionError::Unauthenticated => StatusCode::UNAUTHORIZED,
                SubmissionError::IdempotencyConflict { .. } => StatusCode::CONFLICT,
                SubmissionError::Storage(_) => StatusCode::BAD_GATEWAY,
                SubmissionError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let mut response = AdapterResponse::error("REJECTED", err.user_message())
                .with_reason_code(err.reason_code());
            if let SubmissionError::Validation(errors) = &err {
                response = response.with_errors(errors);
            }
            (status, Json(response))
        }
    }
}

fn retrieval_status(err: &RetrievalError) -> StatusCode {
    match err {
        RetrievalError::Unauthenticated => StatusCode::UNAUTHORIZED,
        RetrievalError::Forbidden { .. } => StatusCode::FORBIDDEN,
        RetrievalError::NotFound { .. } => StatusCode::NOT_FOUND,
        RetrievalError::Storage(_) => StatusCode::BAD_GATEWAY,
    }
}

fn retrieval_response<T: Serialize>(
    result: Result<Result<T, RetrievalError>, String>,
) -> (StatusCode, Json<AdapterResponse<T>>) {
    match result {
        Err(reason) => internal_error(reason),
        Ok(Ok(data)) => (StatusCode::OK, Json(AdapterResponse::ok("OK", data))),
        Ok(Err(err)) => (
            retrieval_status(&err),
            Json(
                AdapterResponse::error("REJECTED", err.user_message())
                    .with_reason_code(err.reason_code()),
            ),
        ),
    }
}

async fn run_list_contracts(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Query(query): Query<ContractQuery>,
) -> (StatusCode, Json<ContractListResponse>) {
    let caller = caller_from_headers(&headers);
    retrieval_response(with_runtime(runtime, move |rt| rt.list_contracts(&caller, &query)).await)
}

async fn run_recent_contracts(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> (StatusCode, Json<ContractListResponse>) {
    let caller = caller_from_headers(&headers);
    retrieval_response(with_runtime(runtime, move |rt| rt.recent_contracts(&caller)).await)
}

async fn run_contract_summary(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> (StatusCode, Json<ContractSummaryResponse>) {
    let caller = caller_from_headers(&headers);
    retrieval_response(with_runtime(runtime, move |rt| rt.contract_summary(&caller)).await)
}

async fn run_contract_detail(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> (StatusCode, Json<ContractDetailResponse>) {
    let caller = caller_from_headers(&headers);
    retrieval_response(with_runtime(runtime, move |rt| rt.contract_by_id(&caller, &id)).await)
}
