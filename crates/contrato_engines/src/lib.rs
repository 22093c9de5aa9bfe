#![forbid(unsafe_code)]

pub mod http;
pub mod lookup;
pub mod notify;
