//! Error taxonomy of the dispatch core.
//!
//! Every variant here ends up as the `error` message of an Error document;
//! the `Display` output is what callers see, so the wording is part of the
//! wire contract.

use crate::document::Document;
use std::fmt;

pub const TRANSACTION_NOT_FOUND: &str = "transaction not found";
pub const LICENCE_NOT_FOUND: &str = "licence not found";
pub const INVALID_PATH: &str = "invalid path";
pub const CONTENT_TYPE_NOT_JSON: &str = "in this request, header content type is not marked as json, add content-type:application/json to request header to fix it.";

/// Form validation failure, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("the field named {0} is requre but not found")]
    FieldNotFound(String),

    #[error("the field named {0} is marked as cannot be empty")]
    FieldCannotBeEmpty(String),
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            FieldError::FieldNotFound(name) | FieldError::FieldCannotBeEmpty(name) => name,
        }
    }
}

/// Malformed or unsupported input, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("error document parsing {0}")]
    Malformed(String),

    #[error("{}", CONTENT_TYPE_NOT_JSON)]
    UnsupportedContent,

    #[error("{}", INVALID_PATH)]
    InvalidPath,
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// Failures produced while dispatching a single document node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{}", TRANSACTION_NOT_FOUND)]
    NotFound,

    #[error(transparent)]
    Validation(#[from] FieldError),

    #[error("{}", LICENCE_NOT_FOUND)]
    Authorization,

    /// The validated form could not be bound to the handler's request type.
    #[error("error document parsing {0}")]
    Bind(String),

    /// Business logic failure, message passed through verbatim.
    #[error("{0}")]
    Handler(String),
}

impl DispatchError {
    /// Terminal Error document carrying this error's message.
    pub fn into_document(self) -> Document {
        Document::error(self.to_string())
    }
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry is sealed, transactions must be registered before serving")]
    Sealed,

    #[error("transaction {transaction} is already registered in department {department}")]
    DuplicateTransaction {
        department: String,
        transaction: String,
    },
}

/// Error a transaction handler returns; the message reaches the caller as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionError {
    message: String,
}

impl TransactionError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransactionError {}

impl From<String> for TransactionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TransactionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
