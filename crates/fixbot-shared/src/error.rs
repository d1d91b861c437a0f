//! Error types for the wizard engine.
//!
//! Infrastructure failures (storage, transport) stay `anyhow` at their
//! call sites; this enum carries only the domain failures the HTTP layer
//! distinguishes by status code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WizardError {
    /// A value fell outside its field's option domain, or free text could
    /// not be parsed. The session is left unmutated.
    #[error("invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Submit was attempted while at least one field is still open.
    #[error("cannot submit yet, still missing: {0}")]
    SubmitBlocked(String),
}

impl WizardError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
