//! Validation outcomes and their combination across a validator chain.

use thiserror::Error;

/// Outcome of validating one gossip message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    /// Deliver to handlers and forward.
    Accept,
    /// Drop silently; the sender is not penalised.
    Ignore,
    /// Drop and penalise the sender.
    Reject,
}

impl ValidationResult {
    pub fn is_accept(&self) -> bool {
        matches!(self, ValidationResult::Accept)
    }
}

/// Combine a topic's validator outcomes: reject wins over ignore, ignore
/// wins over accept. An empty chain accepts.
pub fn combine<I>(results: I) -> ValidationResult
where
    I: IntoIterator<Item = ValidationResult>,
{
    let mut ignored = false;
    for result in results {
        match result {
            ValidationResult::Accept => {}
            ValidationResult::Ignore => ignored = true,
            ValidationResult::Reject => return ValidationResult::Reject,
        }
    }
    if ignored {
        ValidationResult::Ignore
    } else {
        ValidationResult::Accept
    }
}

/// Why a validator could not accept a message. Logged once, then treated
/// as [`ValidationResult::Reject`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("instance id mismatch (want={expected}, have={actual})")]
    InstanceIdMismatch { expected: u64, actual: u64 },

    #[error("{field} {value} overflows int64")]
    IntegerOverflow { field: &'static str, value: u64 },

    #[error("{0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ValidationError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ValidationError::Invalid(reason.into())
    }
}

/// Reject values that do not fit a signed 64-bit integer.
pub fn check_i64(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if i64::try_from(value).is_err() {
        return Err(ValidationError::IntegerOverflow { field, value });
    }
    Ok(())
}

/// Reject messages bound to another instance.
pub fn check_instance_id(expected: u64, actual: u64) -> Result<(), ValidationError> {
    if expected != actual {
        return Err(ValidationError::InstanceIdMismatch { expected, actual });
    }
    Ok(())
}
