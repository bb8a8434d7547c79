use crate::types::{AccountId, Credits};
use thiserror::Error;

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Spendable balance too low for a debit or reservation
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Credits, available: Credits },

    /// Assigned (escrowed) balance too low for a release or payout debit
    #[error("Insufficient assigned balance: needed {needed}, available {available}")]
    InsufficientAssigned { needed: Credits, available: Credits },

    /// Account is soft-disabled and refuses this operation
    #[error("Account disabled: {0}")]
    AccountDisabled(AccountId),

    /// Checked arithmetic overflowed
    #[error("Balance overflow for {0}")]
    BalanceOverflow(AccountId),

    /// Rejected before any mutation; caller can retry with corrected input
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transaction id does not exist
    #[error("Transaction not found: {0}")]
    TransactionNotFound(u64),

    /// Resolution is terminal; the second resolve of a transaction fails
    #[error("Transaction already resolved: {0}")]
    TransactionAlreadyResolved(u64),

    /// External reference already used by an approved deposit
    #[error("Duplicate deposit reference: {0}")]
    DuplicateReference(String),

    /// Caller is not allowed to perform this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage-layer failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
