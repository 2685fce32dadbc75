use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::transaction::{TransactionId, TransactionStatus};
use crate::domain::wallet::LimitWindow;

pub type Result<T> = std::result::Result<T, SettlementError>;

/// Error taxonomy of the settlement engine.
///
/// `LedgerUnbalanced` and `TotalMismatch` are correctness gates: they indicate
/// a bug in entry construction and always block persistence.
/// `InsufficientBalance` and the withdrawal guards are expected runtime
/// rejections surfaced to the caller. Gateway errors are retryable externally;
/// the affected transaction is left `Pending`, never `Completed`.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("ledger unbalanced: debits {debits} != credits {credits}")]
    LedgerUnbalanced { debits: Decimal, credits: Decimal },

    #[error("principal entries sum to {principal}, expected total {total}")]
    TotalMismatch { principal: Decimal, total: Decimal },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("no active tax policy in effect")]
    TaxPolicyMissing,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("wallet for {owner} is {status}")]
    WalletInactive { owner: String, status: String },

    #[error("{window} withdrawal limit exceeded: {withdrawn} + {requested} > {limit}")]
    WithdrawalLimitExceeded {
        window: LimitWindow,
        withdrawn: Decimal,
        requested: Decimal,
        limit: Decimal,
    },

    #[error("payment gateway timed out for reference {reference}")]
    GatewayTimeout { reference: String },

    #[error("payment gateway failure: {reason}")]
    GatewayFailure { reason: String },

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("wallet for {0} not found")]
    WalletNotFound(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(Box::new(err))
    }
}
