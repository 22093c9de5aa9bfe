#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use contrato_engines::lookup::StaticCompanyDirectory;
use contrato_engines::notify::{ContractNotifier, NotificationPayload, NotifyError};
use contrato_kernel_contracts::company::CEP_INVALID;
use contrato_kernel_contracts::contract::{CallerContext, ContractId, ContractRecord, OwnerId};
use contrato_kernel_contracts::form::{ContractForm, CONFIRMATION_REQUIRED};
use contrato_os::autofill::{apply_to_form, lookup_company, LookupOutcome};
use contrato_os::session::ContractSession;
use contrato_os::submission::{
    reason_codes, RetrievalError, SubmissionError, SubmissionOutcome, SubmissionPipeline,
};
use contrato_storage::contracts::{ContractStore, StorageError};
use contrato_storage::repo::ContractRepo;
use serde_json::json;

#[derive(Debug, Default)]
struct RepoCalls {
    inserts: usize,
    lists: usize,
    gets: usize,
}

struct RecordingRepo {
    inner: ContractStore,
    calls: Arc<Mutex<RepoCalls>>,
    fail_inserts: bool,
}

impl ContractRepo for RecordingRepo {
    fn insert_contract_row(
        &mut self,
        record: ContractRecord,
    ) -> Result<ContractRecord, StorageError> {
        self.calls.lock().unwrap().inserts += 1;
        if self.fail_inserts {
            return Err(StorageError::Transport {
                detail: "connection refused".to_string(),
            });
        }
        self.inner.insert_contract_row(record)
    }

    fn contract_rows_for(
        &self,
        caller: &CallerContext,
    ) -> Result<Vec<ContractRecord>, StorageError> {
        self.calls.lock().unwrap().lists += 1;
        self.inner.contract_rows_for(caller)
    }

    fn contract_row_by_id(
        &self,
        caller: &CallerContext,
        id: &ContractId,
    ) -> Result<ContractRecord, StorageError> {
        self.calls.lock().unwrap().gets += 1;
        self.inner.contract_row_by_id(caller, id)
    }
}

struct RecordingNotifier {
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
    fail: bool,
}

impl ContractNotifier for RecordingNotifier {
    fn notify(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(NotifyError::Status { status: 500 });
        }
        Ok(())
    }
}

struct Harness {
    pipeline: SubmissionPipeline,
    repo_calls: Arc<Mutex<RepoCalls>>,
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
}

impl Harness {
    fn new(fail_inserts: bool, notifier_fails: bool) -> Self {
        let repo_calls = Arc::new(Mutex::new(RepoCalls::default()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let repo = RecordingRepo {
            inner: ContractStore::new_in_memory(),
            calls: repo_calls.clone(),
            fail_inserts,
        };
        let notifier = RecordingNotifier {
            sent: sent.clone(),
            fail: notifier_fails,
        };
        Self {
            pipeline: SubmissionPipeline::new(Box::new(repo), Some(Box::new(notifier))),
            repo_calls,
            sent,
        }
    }

    fn inserts(&self) -> usize {
        self.repo_calls.lock().unwrap().inserts
    }

    fn notifications(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

fn owner(id: &str) -> CallerContext {
    CallerContext::owner(OwnerId::new(id).unwrap())
}

fn valid_form() -> ContractForm {
    serde_json::from_value(json!({
        "cnpj": "12.345.678/0001-99",
        "name": "Empresa Demonstração Ltda",
        "ownerName": "João Silva",
        "address": "Av. Paulista, 1000, São Paulo - SP",
        "phone": "(11) 3333-4444",
        "cep": "01310-100",
        "contractType": "Consultoria",
        "commercialTeam": "Cangaço",
        "segment": "Outro",
        "customSegment": "Agronegócio",
        "projectType": "Implementação única",
        "salesRepresentative": "Carla Mendes",
        "bdrRepresentative": "Rafael Lima",
        "leadSource": "Indicação",
        "saleDate": "2024-05-01",
        "paymentDate": "2024-05-10T03:00:00.000Z",
        "signerName": "João Silva",
        "signerEmail": "joao@empresa.com.br",
        "contractValue": 1500,
        "paymentMethod": "Boleto",
        "duration": "6 meses",
        "deliverables": "Diagnóstico e plano comercial",
        "dataConfirmed": true
    }))
    .unwrap()
}

#[test]
fn at_submission_01_known_cnpj_prefills_company_fields() {
    let dir = StaticCompanyDirectory::demo().unwrap();
    let mut form = ContractForm {
        cnpj: "12345678000199".to_string(),
        ..ContractForm::default()
    };
    let outcome = lookup_company(&dir, &form.cnpj).unwrap();
    apply_to_form(outcome.profile().unwrap(), &mut form);
    assert_eq!(form.name, "Empresa Demonstração Ltda");
    assert_eq!(form.owner_name, "João Silva");
    assert_eq!(form.address, "Av. Paulista, 1000, São Paulo - SP, 01310-100");
}

#[test]
fn at_submission_02_unknown_cnpj_leaves_form_unchanged() {
    let dir = StaticCompanyDirectory::demo().unwrap();
    let form = ContractForm {
        cnpj: "11.111.111/0001-11".to_string(),
        name: "Digitado à mão".to_string(),
        ..ContractForm::default()
    };
    let before = form.clone();
    let outcome = lookup_company(&dir, &form.cnpj).unwrap();
    assert_eq!(outcome, LookupOutcome::NotFound);
    assert_eq!(outcome.user_message(), Some("CNPJ não encontrado"));
    assert_eq!(form, before);
}

#[test]
fn at_submission_03_valid_form_persists_once_and_notifies_once() {
    let mut h = Harness::new(false, false);
    let mut session = ContractSession::default();
    let outcome = h
        .pipeline
        .submit(&owner("owner_1"), &valid_form(), None, &mut session)
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::PersistedAndNotified { .. }));
    assert!(outcome.is_full_success());
    assert_eq!(h.inserts(), 1);
    assert_eq!(h.notifications(), 1);
    assert_eq!(session.len(), 1);

    let sent = h.sent.lock().unwrap();
    assert_eq!(sent[0].contract_id(), Some(outcome.record().id.as_str()));
    assert_eq!(sent[0].get("user_id"), Some(&json!("owner_1")));
    assert_eq!(sent[0].get("contractValue"), Some(&json!("1500")));
}

#[test]
fn at_submission_04_notification_failure_is_degraded_success() {
    let mut h = Harness::new(false, true);
    let mut session = ContractSession::default();
    let outcome = h
        .pipeline
        .submit(&owner("owner_1"), &valid_form(), None, &mut session)
        .unwrap();
    assert!(outcome.notification_degraded());
    assert!(!outcome.is_full_success());
    assert_eq!(outcome.as_str(), "PERSISTED_NOTIFICATION_FAILED");
    assert_eq!(outcome.reason_code(), reason_codes::SUBMISSION_NOTIFICATION_FAILED);
    assert_eq!(h.inserts(), 1);
    assert_eq!(h.notifications(), 1);

    let stored = h
        .pipeline
        .contract_by_id(&owner("owner_1"), &outcome.record().id)
        .unwrap();
    assert_eq!(&stored, outcome.record());
}

#[test]
fn at_submission_05_unconfirmed_form_never_reaches_storage() {
    let mut h = Harness::new(false, false);
    let mut session = ContractSession::default();
    let form = ContractForm {
        data_confirmed: false,
        ..valid_form()
    };
    let err = h
        .pipeline
        .submit(&owner("owner_1"), &form, None, &mut session)
        .unwrap_err();
    let SubmissionError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.message("dataConfirmed"), Some(CONFIRMATION_REQUIRED));
    assert_eq!(h.inserts(), 0);
    assert_eq!(h.notifications(), 0);
    assert!(session.is_empty());
}

#[test]
fn at_submission_06_malformed_cep_is_rejected_locally() {
    let mut h = Harness::new(false, false);
    let mut session = ContractSession::default();
    let form = ContractForm {
        cep: Some("1234567".to_string()),
        ..valid_form()
    };
    let err = h
        .pipeline
        .submit(&owner("owner_1"), &form, None, &mut session)
        .unwrap_err();
    let SubmissionError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.message("cep"), Some(CEP_INVALID));
    assert_eq!(h.inserts(), 0);
    assert_eq!(h.notifications(), 0);
}

#[test]
fn at_submission_07_anonymous_caller_never_reaches_storage() {
    let mut h = Harness::new(false, false);
    let mut session = ContractSession::default();
    let err = h
        .pipeline
        .submit(&CallerContext::anonymous(), &valid_form(), None, &mut session)
        .unwrap_err();
    assert_eq!(err, SubmissionError::Unauthenticated);
    assert_eq!(err.reason_code(), reason_codes::SUBMISSION_UNAUTHENTICATED);
    assert_eq!(h.inserts(), 0);
    assert_eq!(h.notifications(), 0);
}

#[test]
fn at_submission_08_storage_failure_stops_the_pipeline() {
    let mut h = Harness::new(true, false);
    let mut session = ContractSession::default();
    let err = h
        .pipeline
        .submit(&owner("owner_1"), &valid_form(), None, &mut session)
        .unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Storage(StorageError::Transport { .. })
    ));
    assert_eq!(err.user_message(), "Erro ao salvar contrato. Tente novamente.");
    assert_eq!(h.inserts(), 1);
    assert_eq!(h.notifications(), 0);
    assert!(session.is_empty());
}

#[test]
fn at_submission_09_idempotency_key_replays_and_detects_conflicts() {
    let mut h = Harness::new(false, false);
    let mut session = ContractSession::default();
    let caller = owner("owner_1");
    let first = h
        .pipeline
        .submit(&caller, &valid_form(), Some("form-123"), &mut session)
        .unwrap();
    let replay = h
        .pipeline
        .submit(&caller, &valid_form(), Some("form-123"), &mut session)
        .unwrap();
    assert!(matches!(replay, SubmissionOutcome::Persisted { .. }));
    assert_eq!(replay.record(), first.record());
    assert_eq!(h.inserts(), 1);
    assert_eq!(h.notifications(), 1);

    let changed = ContractForm {
        deliverables: "Outro escopo".to_string(),
        ..valid_form()
    };
    let err = h
        .pipeline
        .submit(&caller, &changed, Some("form-123"), &mut session)
        .unwrap_err();
    assert!(matches!(err, SubmissionError::IdempotencyConflict { .. }));

    // Keys are scoped per owner.
    h.pipeline
        .submit(&owner("owner_2"), &valid_form(), Some("form-123"), &mut session)
        .unwrap();
    // No key means independent submissions.
    h.pipeline
        .submit(&caller, &valid_form(), None, &mut session)
        .unwrap();
    assert_eq!(h.inserts(), 3);
}

#[test]
fn at_submission_10_retrieval_enforces_ownership() {
    let mut h = Harness::new(false, false);
    let mut session = ContractSession::default();
    let outcome = h
        .pipeline
        .submit(&owner("owner_1"), &valid_form(), None, &mut session)
        .unwrap();
    let id = outcome.record().id.clone();

    assert_eq!(
        h.pipeline.contract_by_id(&owner("owner_2"), &id),
        Err(RetrievalError::Forbidden {
            id: id.as_str().to_string()
        })
    );
    let missing = ContractId::new("missing").unwrap();
    assert!(matches!(
        h.pipeline.contract_by_id(&owner("owner_1"), &missing),
        Err(RetrievalError::NotFound { .. })
    ));
    assert_eq!(
        h.pipeline.contract_by_id(&CallerContext::anonymous(), &id),
        Err(RetrievalError::Unauthenticated)
    );
    let elevated = CallerContext::elevated(OwnerId::new("admin").unwrap());
    assert_eq!(
        h.pipeline.contract_by_id(&elevated, &id).unwrap().payload,
        valid_form().validate().unwrap()
    );
}

#[test]
fn at_submission_11_listing_refreshes_the_session() {
    let mut h = Harness::new(false, false);
    let mut scratch = ContractSession::default();
    h.pipeline
        .submit(&owner("owner_1"), &valid_form(), None, &mut scratch)
        .unwrap();
    h.pipeline
        .submit(&owner("owner_2"), &valid_form(), None, &mut scratch)
        .unwrap();

    let mut session = ContractSession::new(Some(OwnerId::new("owner_1").unwrap()));
    let listed = h
        .pipeline
        .list_contracts(&owner("owner_1"), &mut session)
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(session.len(), 1);

    let elevated = CallerContext::elevated(OwnerId::new("admin").unwrap());
    let mut admin_session = ContractSession::default();
    assert_eq!(
        h.pipeline
            .list_contracts(&elevated, &mut admin_session)
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        h.pipeline
            .list_contracts(&CallerContext::anonymous(), &mut ContractSession::default()),
        Err(RetrievalError::Unauthenticated)
    );
    assert_eq!(h.repo_calls.lock().unwrap().lists, 2);
}

#[test]
fn at_submission_12_validation_is_repeatable() {
    let form = ContractForm {
        cep: Some("1234567".to_string()),
        signer_email: "not-an-email".to_string(),
        data_confirmed: false,
        ..valid_form()
    };
    assert_eq!(form.validate().unwrap_err(), form.validate().unwrap_err());
}
