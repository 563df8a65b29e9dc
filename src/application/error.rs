use thiserror::Error;

use crate::domain::Cents;

/// Coarse classification of a [`LedgerError`], for callers that only need to
/// decide how to respond (status code, retry, message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidAmount,
    InsufficientFunds,
    AlreadyExists,
    InvalidInput,
    StorageFailure,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Catalog item not found: {0}")]
    ItemNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Invalid name: {0}")]
    InvalidName(&'static str),

    #[error("Invalid amount: {amount} cents ({reason})")]
    InvalidAmount { amount: Cents, reason: &'static str },

    #[error("Insufficient funds for {username}: balance {balance}, required {required}")]
    InsufficientFunds {
        username: String,
        balance: Cents,
        required: Cents,
    },

    #[error("Storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::ItemNotFound(_) => ErrorKind::NotFound,
            LedgerError::AccountAlreadyExists(_) => ErrorKind::AlreadyExists,
            LedgerError::InvalidName(_) => ErrorKind::InvalidInput,
            LedgerError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Only storage failures may succeed on a later attempt. The engine itself
    /// never retries.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }
}
