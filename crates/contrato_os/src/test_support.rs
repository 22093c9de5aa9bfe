#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use contrato_kernel_contracts::contract::{ContractCategory, ContractId, ContractRecord, OwnerId};
use contrato_kernel_contracts::form::ContractForm;
use rust_decimal::Decimal;
use serde_json::json;

pub(crate) fn valid_form() -> ContractForm {
    ContractForm {
        cnpj: "12.345.678/0001-99".to_string(),
        name: "Empresa Demonstração Ltda".to_string(),
        owner_name: "João Silva".to_string(),
        address: "Av. Paulista, 1000, São Paulo - SP".to_string(),
        phone: "(11) 3333-4444".to_string(),
        contract_type: "Consultoria".to_string(),
        commercial_team: "Selva".to_string(),
        segment: "Varejo".to_string(),
        project_type: "Recorrente".to_string(),
        sales_representative: "Carla Mendes".to_string(),
        bdr_representative: "Rafael Lima".to_string(),
        lead_source: "Inbound".to_string(),
        sale_date: "2024-05-01".to_string(),
        payment_date: "2024-05-10".to_string(),
        signer_name: "João Silva".to_string(),
        signer_email: "joao@empresa.com.br".to_string(),
        contract_value: Some(json!(1500)),
        payment_method: "Pix".to_string(),
        duration: "12 meses".to_string(),
        deliverables: "Diagnóstico e plano comercial".to_string(),
        data_confirmed: true,
        ..ContractForm::default()
    }
}

pub(crate) fn record_with(
    id: &str,
    cnpj: &str,
    name: &str,
    category: ContractCategory,
    value: Decimal,
    created_at: DateTime<Utc>,
) -> ContractRecord {
    let form = ContractForm {
        cnpj: cnpj.to_string(),
        name: name.to_string(),
        contract_type: category.as_str().to_string(),
        contract_value: Some(json!(value.to_string())),
        ..valid_form()
    };
    ContractRecord::v1(
        ContractId::new(id).unwrap(),
        OwnerId::new("owner_1").unwrap(),
        created_at,
        form.validate().unwrap(),
    )
}
