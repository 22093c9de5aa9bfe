#![forbid(unsafe_code)]

pub mod autofill;
pub mod config;
pub mod session;
pub mod submission;

#[cfg(test)]
mod test_support;
