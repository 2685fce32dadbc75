use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::UserId;
use super::commission::CommissionBreakdown;
use super::money::{balance_tolerance, round_minor};
use crate::error::{Result, SettlementError};

/// Globally unique ledger transaction identifier.
///
/// Generated at creation and never reused, even on retry: callers retrying the
/// same logical settlement must derive the id from an idempotency key instead
/// of generating a fresh one, so a retried capture cannot double-settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable id from a caller-supplied idempotency key.
    pub fn from_idempotency_key(key: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()))
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    OrderPayment,
    OrderRefund,
    WalletWithdrawal,
    WalletDeposit,
    Adjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Reversed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// The transaction state machine: `pending -> completed -> reversed`,
    /// `pending -> failed | cancelled`. No other transitions are permitted.
    pub fn can_transition(self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, to),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Reversed)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Reversed => "reversed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Closed chart of ledger accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Account {
    Cash,
    AccountsReceivable,
    AccountsPayable,
    CommissionRevenue,
    CommissionPayable,
    VatPayable,
    VatRevenue,
    WalletVendor,
    WalletDispatch,
    BankTransferFees,
}

/// One debit-or-credit line within a transaction.
///
/// Exactly one of `debit`/`credit` is normally non-zero; both default to zero.
/// Entries flagged `principal` carry the headline money movement of the
/// workflow; the ledger validates that their sum equals `total_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub account: Account,
    /// Party owning this line; `None` for platform-internal accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
    #[serde(default)]
    pub principal: bool,
    pub description: String,
}

impl Entry {
    pub fn debit(account: Account, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account,
            user: None,
            debit: amount,
            credit: Decimal::ZERO,
            principal: false,
            description: description.into(),
        }
    }

    pub fn credit(account: Account, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account,
            user: None,
            debit: Decimal::ZERO,
            credit: amount,
            principal: false,
            description: description.into(),
        }
    }

    pub fn for_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn as_principal(mut self) -> Self {
        self.principal = true;
        self
    }

    /// Positive for debit, negative for credit.
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatResponsibility {
    Platform,
    Vendor,
}

/// VAT facts recorded alongside a settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatSummary {
    /// Rate in percent.
    pub rate: Decimal,
    pub amount: Decimal,
    pub responsibility: VatResponsibility,
    /// Whether the platform withheld the tax at source.
    pub collected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedKind {
    Order,
    Withdrawal,
}

/// Weak back-reference to the business entity that caused the transaction.
/// Audit/UI only; the referenced entity is not owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub kind: RelatedKind,
    pub id: String,
}

impl RelatedEntity {
    pub fn order(id: impl Into<String>) -> Self {
        Self {
            kind: RelatedKind::Order,
            id: id.into(),
        }
    }

    pub fn withdrawal(id: impl Into<String>) -> Self {
        Self {
            kind: RelatedKind::Withdrawal,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_at: Option<DateTime<Utc>>,
}

/// Input to `Ledger::post`: a transaction before id assignment and validation.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    /// Caller-supplied id (derived from an idempotency key) or `None` to
    /// generate a fresh one.
    pub id: Option<TransactionId>,
    pub kind: TransactionType,
    pub entries: Vec<Entry>,
    pub total_amount: Decimal,
    pub currency: String,
    pub vat: Option<VatSummary>,
    pub commission: Option<CommissionBreakdown>,
    pub related: Option<RelatedEntity>,
    pub created_by: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TransactionDraft {
    pub fn new(kind: TransactionType, total_amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            entries: Vec::new(),
            total_amount,
            currency: currency.into(),
            vat: None,
            commission: None,
            related: None,
            created_by: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// A balanced double-entry ledger record.
///
/// Immutable once `Completed`, except for the single allowed transition to
/// `Reversed`. All mutation goes through [`crate::application::ledger::Ledger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub entries: Vec<Entry>,
    pub total_amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat: Option<VatSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedEntity>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub audit: Audit,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Transaction {
    pub fn debit_total(&self) -> Decimal {
        round_minor(self.entries.iter().map(|e| e.debit).sum())
    }

    pub fn credit_total(&self) -> Decimal {
        round_minor(self.entries.iter().map(|e| e.credit).sum())
    }

    fn principal_total(&self) -> Decimal {
        round_minor(
            self.entries
                .iter()
                .filter(|e| e.principal)
                .map(|e| e.debit + e.credit)
                .sum(),
        )
    }

    /// The engine's single most important correctness gate. Runs synchronously
    /// before any persistence.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(SettlementError::Validation(
                "transaction has no entries".to_string(),
            ));
        }
        if self
            .entries
            .iter()
            .any(|e| e.debit < Decimal::ZERO || e.credit < Decimal::ZERO)
        {
            return Err(SettlementError::Validation(
                "entry amounts must not be negative".to_string(),
            ));
        }

        let debits = self.debit_total();
        let credits = self.credit_total();
        if (debits - credits).abs() > balance_tolerance() {
            return Err(SettlementError::LedgerUnbalanced { debits, credits });
        }

        let principal = self.principal_total();
        if (principal - self.total_amount).abs() > balance_tolerance() {
            return Err(SettlementError::TotalMismatch {
                principal,
                total: self.total_amount,
            });
        }

        Ok(())
    }

    /// Moves the transaction to `to`, enforcing the state machine.
    pub fn transition(&mut self, to: TransactionStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(SettlementError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if to == TransactionStatus::Completed {
            self.audit.completed_at = Some(Utc::now());
        }
        self.status = to;
        Ok(())
    }

    /// Structural reversal: flips every entry's debit/credit in place and
    /// stamps the reversal audit fields. Only legal from `Completed`;
    /// reversing anything else is a caller error, never silently ignored.
    pub fn reverse(&mut self, reason: impl Into<String>, actor: Option<&str>) -> Result<()> {
        if self.status != TransactionStatus::Completed {
            return Err(SettlementError::InvalidTransition {
                from: self.status,
                to: TransactionStatus::Reversed,
            });
        }
        for entry in &mut self.entries {
            std::mem::swap(&mut entry.debit, &mut entry.credit);
        }
        self.status = TransactionStatus::Reversed;
        self.audit.reversal_reason = Some(reason.into());
        self.audit.reversed_by = actor.map(str::to_string);
        self.audit.reversed_at = Some(Utc::now());
        Ok(())
    }
}
