#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

/// A single field-scoped rule failure. `reason` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("{field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl ContractViolation {
    pub fn field(&self) -> &'static str {
        match self {
            ContractViolation::InvalidValue { field, .. } => field,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ContractViolation::InvalidValue { reason, .. } => reason,
        }
    }

    /// Re-scopes the violation to another form field, keeping the message.
    pub fn for_field(self, field: &'static str) -> Self {
        match self {
            ContractViolation::InvalidValue { reason, .. } => {
                ContractViolation::InvalidValue { field, reason }
            }
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

/// Field name to message map produced by form validation.
///
/// Only the first violation per field is kept, so running the same checks twice over the
/// same input always yields the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, &'static str>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, violation: ContractViolation) {
        self.0
            .entry(violation.field())
            .or_insert_with(|| violation.reason());
    }

    /// Records the violation if `result` failed and hands back the value otherwise.
    pub fn check<T>(&mut self, result: Result<T, ContractViolation>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(violation) => {
                self.record(violation);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn message(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, reason) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {reason}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Counts characters after trimming, which is what users see as "length".
pub fn visible_len(value: &str) -> usize {
    value.trim().chars().count()
}

pub fn require_min_chars(
    field: &'static str,
    value: &str,
    min: usize,
    reason: &'static str,
) -> Result<String, ContractViolation> {
    if visible_len(value) < min {
        return Err(ContractViolation::InvalidValue { field, reason });
    }
    Ok(value.trim().to_string())
}

pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
