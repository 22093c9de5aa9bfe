#![forbid(unsafe_code)]

pub mod contracts;
pub mod repo;
pub mod rest;
