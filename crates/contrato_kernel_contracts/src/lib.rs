#![forbid(unsafe_code)]

pub mod common;
pub mod company;
pub mod contract;
pub mod form;

pub use common::{ContractViolation, ReasonCodeId, Validate, ValidationErrors};
