use chrono::Utc;
use tracing::debug;

use crate::domain::ports::UnitOfWork;
use crate::domain::transaction::{
    Audit, Transaction, TransactionDraft, TransactionId, TransactionStatus,
};
use crate::error::{Result, SettlementError};

/// The bookkeeping primitive: builds, validates and stages balanced
/// multi-entry transaction records.
///
/// The ledger never deduplicates: a caller retrying the same logical event
/// must supply the same idempotency-derived id on the draft rather than
/// letting a fresh one be generated.
pub struct Ledger;

impl Ledger {
    /// Validates the draft's balance and total invariants, assigns an id if
    /// the caller supplied none, and stages the transaction on the unit of
    /// work. Nothing is persisted until the unit commits.
    ///
    /// `status` must be `Completed`, or `Pending` for workflows awaiting
    /// manual approval.
    pub fn post(
        uow: &mut dyn UnitOfWork,
        draft: TransactionDraft,
        status: TransactionStatus,
    ) -> Result<Transaction> {
        if !matches!(
            status,
            TransactionStatus::Completed | TransactionStatus::Pending
        ) {
            return Err(SettlementError::Validation(format!(
                "transactions are posted as pending or completed, not {status}"
            )));
        }

        let now = Utc::now();
        let tx = Transaction {
            id: draft.id.unwrap_or_else(TransactionId::generate),
            kind: draft.kind,
            entries: draft.entries,
            total_amount: draft.total_amount,
            currency: draft.currency,
            vat: draft.vat,
            commission: draft.commission,
            related: draft.related,
            status,
            audit: Audit {
                created_by: draft.created_by,
                created_at: Some(now),
                completed_at: (status == TransactionStatus::Completed).then_some(now),
                ..Audit::default()
            },
            metadata: draft.metadata,
        };

        tx.validate()?;
        debug!(id = %tx.id, kind = ?tx.kind, total = %tx.total_amount, %status, "posting transaction");
        uow.stage_transaction(tx.clone());
        Ok(tx)
    }

    /// Structural reversal of a completed transaction: flips every entry's
    /// debit/credit in place and stamps the reversal audit fields. Reversing
    /// a non-completed or already-reversed transaction is a caller error.
    pub fn reverse(
        uow: &mut dyn UnitOfWork,
        id: &TransactionId,
        reason: &str,
        actor: Option<&str>,
    ) -> Result<Transaction> {
        let mut tx = uow
            .transaction(id)?
            .ok_or(SettlementError::TransactionNotFound(*id))?;
        tx.reverse(reason, actor)?;
        debug!(id = %tx.id, reason, "reversing transaction");
        uow.stage_transaction(tx.clone());
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SettlementStore;
    use crate::domain::transaction::{Account, Entry, TransactionType};
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn draft() -> TransactionDraft {
        let mut draft = TransactionDraft::new(TransactionType::Adjustment, dec!(50.00), "NGN");
        draft.entries = vec![
            Entry::debit(Account::Cash, dec!(50.00), "adjustment in").as_principal(),
            Entry::credit(Account::AccountsReceivable, dec!(50.00), "receivable cleared"),
        ];
        draft
    }

    #[tokio::test]
    async fn test_post_assigns_id_and_stamps_audit() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let tx = Ledger::post(&mut *uow, draft(), TransactionStatus::Completed).unwrap();
        uow.commit().await.unwrap();

        assert!(tx.audit.created_at.is_some());
        assert!(tx.audit.completed_at.is_some());
        let stored = store.transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored, tx);
    }

    #[tokio::test]
    async fn test_post_rejects_unbalanced_before_staging() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut bad = draft();
        bad.entries[1].credit = dec!(49.00);
        let err = Ledger::post(&mut *uow, bad, TransactionStatus::Completed);
        assert!(matches!(err, Err(SettlementError::LedgerUnbalanced { .. })));
        uow.commit().await.unwrap();

        assert!(store.transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_rejects_terminal_statuses() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = Ledger::post(&mut *uow, draft(), TransactionStatus::Reversed);
        assert!(matches!(err, Err(SettlementError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reverse_round_trip_nets_zero() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let tx = Ledger::post(&mut *uow, draft(), TransactionStatus::Completed).unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let reversed = Ledger::reverse(&mut *uow, &tx.id, "posted in error", Some("ops")).unwrap();
        uow.commit().await.unwrap();

        for (a, b) in tx.entries.iter().zip(&reversed.entries) {
            assert_eq!(a.signed_amount() + b.signed_amount(), Decimal::ZERO);
        }
        let stored = store.transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Reversed);
        assert_eq!(stored.audit.reversal_reason.as_deref(), Some("posted in error"));
    }

    #[tokio::test]
    async fn test_reverse_unknown_transaction() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = Ledger::reverse(&mut *uow, &TransactionId::generate(), "missing", None);
        assert!(matches!(err, Err(SettlementError::TransactionNotFound(_))));
    }
}
