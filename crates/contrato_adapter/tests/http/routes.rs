#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use contrato_adapter::{build_router, AdapterRuntime, ELEVATED_HEADER, USER_ID_HEADER};
use contrato_engines::lookup::StaticCompanyDirectory;
use contrato_engines::notify::{ContractNotifier, NotificationPayload, NotifyError};
use contrato_os::submission::SubmissionPipeline;
use contrato_storage::contracts::ContractStore;
use serde_json::{json, Value};
use tower::ServiceExt;

struct FailingNotifier;

impl ContractNotifier for FailingNotifier {
    fn notify(&self, _payload: &NotificationPayload) -> Result<(), NotifyError> {
        Err(NotifyError::Transport { kind: "connection" })
    }
}

fn app_with(notifier: Option<Box<dyn ContractNotifier + Send>>) -> Router {
    let runtime = AdapterRuntime::new(
        Box::new(StaticCompanyDirectory::demo().unwrap()),
        SubmissionPipeline::new(Box::new(ContractStore::new_in_memory()), notifier),
    );
    build_router(Arc::new(runtime))
}

fn app() -> Router {
    app_with(None)
}

fn form() -> Value {
    json!({
        "cnpj": "12.345.678/0001-99",
        "name": "Empresa Demonstração Ltda",
        "ownerName": "João Silva",
        "address": "Av. Paulista, 1000, São Paulo - SP",
        "phone": "(11) 3333-4444",
        "contractType": "Consultoria",
        "commercialTeam": "Selva",
        "segment": "SAAS",
        "projectType": "Recorrente",
        "salesRepresentative": "Carla Mendes",
        "bdrRepresentative": "Rafael Lima",
        "leadSource": "Inbound",
        "saleDate": "2024-05-01",
        "paymentDate": "2024-05-10",
        "signerName": "João Silva",
        "signerEmail": "joao@empresa.com.br",
        "contractValue": 1500,
        "paymentMethod": "Pix",
        "duration": "12 meses",
        "deliverables": "Diagnóstico e plano comercial",
        "dataConfirmed": true
    })
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn at_http_01_healthz_reports_ok() {
    let (status, body) = send(&app(), "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["outcome"], "HEALTHY");
    assert_eq!(body["data"]["notifications_enabled"], false);
}

#[tokio::test]
async fn at_http_02_company_lookup_statuses() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/companies/lookup",
        None,
        Some(json!({"cnpj": "12.345.678/0001-99"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Empresa Demonstração Ltda");
    assert_eq!(body["data"]["ownerName"], "João Silva");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/companies/lookup",
        None,
        Some(json!({"cnpj": "11111111000111"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "CNPJ não encontrado");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/companies/lookup",
        None,
        Some(json!({"cnpj": "1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "CNPJ inválido");
}

#[tokio::test]
async fn at_http_03_validate_returns_field_errors() {
    let app = app();
    let (status, body) = send(&app, "POST", "/v1/contracts/validate", None, Some(form())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["company"]["cnpj"], "12345678000199");

    let mut bad = form();
    bad["cep"] = json!("1234567");
    bad["dataConfirmed"] = json!(false);
    let (status, body) = send(&app, "POST", "/v1/contracts/validate", None, Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["cep"], "CEP inválido");
    assert_eq!(
        body["errors"]["dataConfirmed"],
        "Você precisa confirmar que os dados estão corretos"
    );
}

#[tokio::test]
async fn at_http_04_submit_requires_identity_and_valid_form() {
    let app = app();
    let (status, _) = send(&app, "POST", "/v1/contracts", None, Some(form())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut bad = form();
    bad["dataConfirmed"] = json!(false);
    let (status, body) = send(&app, "POST", "/v1/contracts", Some("owner_1"), Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["dataConfirmed"].is_string());

    let (status, body) = send(&app, "GET", "/v1/contracts", Some("owner_1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn at_http_05_submit_then_retrieve_with_ownership() {
    let app = app();
    let (status, body) = send(&app, "POST", "/v1/contracts", Some("owner_1"), Some(form())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "PERSISTED");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/v1/contracts/{id}");
    let (status, body) = send(&app, "GET", &uri, Some("owner_1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payload"]["contractValue"], "1500");

    let (status, _) = send(&app, "GET", &uri, Some("owner_2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, "GET", "/v1/contracts/missing", Some("owner_1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header(USER_ID_HEADER, "admin")
        .header(ELEVATED_HEADER, "true")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn at_http_06_notification_failure_is_reported_as_degraded() {
    let app = app_with(Some(Box::new(FailingNotifier)));
    let (status, body) = send(&app, "POST", "/v1/contracts", Some("owner_1"), Some(form())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "PERSISTED_NOTIFICATION_FAILED");
    assert_eq!(
        body["reason"],
        "Contrato salvo, mas a notificação externa falhou"
    );
}

#[tokio::test]
async fn at_http_07_idempotency_conflict_is_409() {
    let app = app();
    let submit = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/v1/contracts")
            .header(USER_ID_HEADER, "owner_1")
            .header("idempotency-key", "form-42")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    let first = app.clone().oneshot(submit(form())).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let replay = app.clone().oneshot(submit(form())).await.unwrap();
    assert_eq!(replay.status(), StatusCode::CREATED);

    let mut changed = form();
    changed["deliverables"] = json!("Escopo diferente");
    let conflict = app.clone().oneshot(submit(changed)).await.unwrap();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let (_, body) = send(&app, "GET", "/v1/contracts", Some("owner_1"), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn at_http_08_list_filters_recent_and_summary() {
    let app = app();
    for (name, kind, value) in [
        ("Empresa Demonstração Ltda", "Consultoria", 1500),
        ("Tecnologia Avançada S.A.", "Assessoria", 2500),
        ("Padaria Central", "Consultoria", 900),
        ("Mercado Bom Preço", "Assessoria", 100),
    ] {
        let mut body = form();
        body["name"] = json!(name);
        body["contractType"] = json!(kind);
        body["contractValue"] = json!(value);
        let (status, _) = send(&app, "POST", "/v1/contracts", Some("owner_1"), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = send(&app, "POST", "/v1/contracts", Some("owner_2"), Some(form())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(
        &app,
        "GET",
        "/v1/contracts?search=padaria",
        Some("owner_1"),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(
        &app,
        "GET",
        "/v1/contracts?category=Assessoria",
        Some("owner_1"),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, "GET", "/v1/contracts/recent", Some("owner_1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, body) = send(&app, "GET", "/v1/contracts/summary", Some("owner_1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 4);
    assert_eq!(body["data"]["totalValue"], "5000");
    assert_eq!(body["data"]["byCategory"]["Consultoria"], 2);

    let (status, _) = send(&app, "GET", "/v1/contracts/summary", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn at_http_09_extreme_values_are_rejected_and_runtime_stays_healthy() {
    let app = app();
    for value in [
        json!("79228162514264337593543950335"),
        json!("1000000000000.01"),
        json!(1e40),
    ] {
        let mut body = form();
        body["contractValue"] = value;
        let (status, body) = send(&app, "POST", "/v1/contracts", Some("alice"), Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["errors"]["contractValue"],
            "Valor do contrato excede o limite permitido"
        );
    }

    let mut tiny = form();
    tiny["contractValue"] = json!("0.0000000000000000000000000000001");
    let (status, body) = send(&app, "POST", "/v1/contracts", Some("alice"), Some(tiny)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["contractValue"],
        "Valor do contrato deve ter no máximo 2 casas decimais"
    );

    for _ in 0..2 {
        let mut at_cap = form();
        at_cap["contractValue"] = json!("1000000000000");
        let (status, _) = send(&app, "POST", "/v1/contracts", Some("alice"), Some(at_cap)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, "GET", "/v1/contracts/summary", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);

    let (status, _) = send(&app, "GET", "/v1/contracts/summary", Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
