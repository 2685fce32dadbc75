use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};

use crate::application::ledger::Ledger;
use crate::application::wallets::WalletManager;
use crate::domain::money::{Amount, balance_tolerance, round_minor};
use crate::domain::order::{Order, PaymentStatus};
use crate::domain::ports::{
    GatewayStatus, PaymentGatewayRef, SettlementStore, SettlementStoreRef, UnitOfWork,
    VendorDirectoryRef,
};
use crate::domain::transaction::{
    Account, Entry, RelatedEntity, Transaction, TransactionDraft, TransactionId, TransactionStatus,
    TransactionType, VatResponsibility, VatSummary,
};
use crate::domain::wallet::{BankAccount, CreditKind, DebitKind, withdrawal_fee};
use crate::domain::{OrderId, UserId, commission};
use crate::error::{Result, SettlementError};

/// Coordinates the tax resolver, the commission calculator, the ledger and
/// the wallet manager into the four settlement workflows.
///
/// Each workflow runs against a single unit of work: either every ledger
/// record and wallet mutation commits together, or none does. Payment-gateway
/// calls happen before the commit, never inside it, so a gateway timeout
/// leaves a withdrawal `Pending` and safely retryable.
pub struct SettlementEngine {
    store: SettlementStoreRef,
    gateway: PaymentGatewayRef,
    vendors: VendorDirectoryRef,
    wallets: WalletManager,
}

impl SettlementEngine {
    pub fn new(
        store: SettlementStoreRef,
        gateway: PaymentGatewayRef,
        vendors: VendorDirectoryRef,
    ) -> Self {
        Self {
            store,
            gateway,
            vendors,
            wallets: WalletManager::default(),
        }
    }

    /// Settles a confirmed order payment.
    ///
    /// Verifies the payment with the gateway, splits the money between the
    /// vendor, the platform and the delivery agent, records the VAT position,
    /// posts the balanced transaction and credits the beneficiary wallets —
    /// all in one atomic unit. A failed verification writes nothing at all:
    /// no failed-status transaction, simply no record.
    ///
    /// The gateway `reference` doubles as the idempotency key: retrying the
    /// same reference yields the same transaction id and is a no-op once
    /// settled.
    pub async fn capture_payment(&self, mut order: Order, reference: &str) -> Result<Transaction> {
        let verification = self.gateway.verify(reference).await?;
        if verification.status != GatewayStatus::Success {
            let reason = verification
                .reason
                .unwrap_or_else(|| "payment not confirmed".to_string());
            warn!(order = %order.id, reference, %reason, "payment verification failed");
            return Err(SettlementError::GatewayFailure { reason });
        }

        let total = order.total();
        if (verification.amount - total).abs() > balance_tolerance() {
            warn!(order = %order.id, reference, verified = %verification.amount, expected = %total,
                "verified amount does not match order total");
            return Err(SettlementError::GatewayFailure {
                reason: format!(
                    "verified amount {} does not match order total {total}",
                    verification.amount
                ),
            });
        }

        // Stateless resolution happens before the unit of work opens; only
        // the persistence scope below holds the store.
        let policy = self
            .store
            .active_policy(Utc::now())
            .await?
            .ok_or(SettlementError::TaxPolicyMissing)?;
        let profile = self.vendors.tax_profile(&order.vendor).await?;
        let breakdown = commission::compute(&order.lines, order.delivery_fee, order.has_dispatch());

        let vat_amount = policy.vat_amount(total, order.vat_category.as_deref());
        let vat = (!vat_amount.is_zero() && vat_amount >= policy.thresholds.minimum_collection)
            .then(|| {
                let responsibility = policy.resolve_responsibility(&profile, total);
                VatSummary {
                    rate: policy.rate_for(order.vat_category.as_deref()),
                    amount: vat_amount,
                    responsibility,
                    collected: responsibility == VatResponsibility::Platform,
                }
            });

        let id = TransactionId::from_idempotency_key(reference);
        let mut uow = self.store.begin().await?;
        if let Some(existing) = uow.transaction(&id)? {
            info!(order = %order.id, reference, tx = %id, "payment already settled");
            return Ok(existing);
        }

        let mut entries = vec![
            Entry::debit(Account::Cash, total, format!("Customer payment for order {}", order.id))
                .as_principal(),
        ];
        if !breakdown.vendor_amount.is_zero() {
            entries.push(
                Entry::credit(Account::WalletVendor, breakdown.vendor_amount, "Vendor share")
                    .for_user(order.vendor.clone()),
            );
        }
        if let Some(agent) = order.delivery_agent.clone()
            && !breakdown.dispatch_amount.is_zero()
        {
            entries.push(
                Entry::credit(Account::WalletDispatch, breakdown.dispatch_amount, "Delivery fee")
                    .for_user(agent),
            );
        }
        if !breakdown.platform_amount.is_zero() {
            entries.push(Entry::credit(
                Account::CommissionRevenue,
                breakdown.platform_amount,
                "Platform commission",
            ));
        }
        if let Some(vat) = &vat {
            let mut receivable =
                Entry::debit(Account::VatRevenue, vat.amount, "VAT on order total");
            if vat.responsibility == VatResponsibility::Vendor {
                receivable = receivable.for_user(order.vendor.clone());
            }
            entries.push(receivable);
            entries.push(Entry::credit(
                Account::VatPayable,
                vat.amount,
                "VAT payable to authority",
            ));
        }

        let mut draft = TransactionDraft::new(TransactionType::OrderPayment, total, &order.currency);
        draft.id = Some(id);
        draft.entries = entries;
        draft.vat = vat;
        draft.commission = Some(breakdown.clone());
        draft.related = Some(RelatedEntity::order(order.id.to_string()));
        draft.metadata.insert("payment_reference".to_string(), json!(reference));
        let tx = Ledger::post(&mut *uow, draft, TransactionStatus::Completed)?;

        if let Ok(amount) = Amount::new(breakdown.vendor_amount) {
            self.wallets
                .credit(&mut *uow, &order.vendor, amount, CreditKind::Earning, &order.currency)?;
        }
        if let Some(agent) = order.delivery_agent.clone()
            && let Ok(amount) = Amount::new(breakdown.dispatch_amount)
        {
            self.wallets
                .credit(&mut *uow, &agent, amount, CreditKind::Earning, &order.currency)?;
        }

        order.payment_status = PaymentStatus::Paid;
        order.payment_reference = Some(reference.to_string());
        uow.stage_order(order.clone());

        uow.commit().await?;
        info!(order = %order.id, tx = %tx.id, total = %total, "payment captured");
        Ok(tx)
    }

    /// Refunds part or all of a settled payment.
    ///
    /// Every commission and VAT component of the original settlement is
    /// scaled by `refund_amount / original_total` and clawed back from its
    /// beneficiary. A wallet that cannot cover its scaled share fails the
    /// whole workflow loudly — a reconciliation exception, never a silent
    /// clamp to zero.
    pub async fn refund(
        &self,
        order_id: &OrderId,
        refund_amount: Decimal,
        reference: &str,
        actor: Option<&str>,
    ) -> Result<Transaction> {
        let refund_amount = Amount::new(refund_amount)?.value();

        let related = RelatedEntity::order(order_id.to_string());
        let original = self
            .store
            .find_transaction(&related, TransactionType::OrderPayment)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.to_string()))?;
        if original.status != TransactionStatus::Completed {
            return Err(SettlementError::Validation(format!(
                "original payment is {}, not completed",
                original.status
            )));
        }
        if refund_amount > original.total_amount {
            return Err(SettlementError::Validation(format!(
                "refund {refund_amount} exceeds original total {}",
                original.total_amount
            )));
        }

        // idempotent retry: the gateway must not be asked to refund twice
        let id = TransactionId::from_idempotency_key(reference);
        if let Some(existing) = self.store.transaction(&id).await? {
            info!(order = %order_id, tx = %id, "refund already settled");
            return Ok(existing);
        }

        let payment_reference = original
            .metadata
            .get("payment_reference")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| reference.to_string());
        let gateway_refund = self.gateway.refund(&payment_reference, refund_amount).await?;
        if gateway_refund.status != GatewayStatus::Success {
            let reason = gateway_refund
                .reason
                .unwrap_or_else(|| "refund not accepted".to_string());
            warn!(order = %order_id, %reason, "gateway refund failed");
            return Err(SettlementError::GatewayFailure { reason });
        }

        let mut uow = self.store.begin().await?;
        if let Some(existing) = uow.transaction(&id)? {
            info!(order = %order_id, tx = %id, "refund already settled");
            return Ok(existing);
        }
        let mut order = uow
            .order(order_id)?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.to_string()))?;
        // re-read inside the atomic scope; the pre-read only fed the gateway
        let original = uow
            .transaction(&original.id)?
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .ok_or_else(|| {
                SettlementError::Validation(
                    "original payment changed while the refund was in flight".to_string(),
                )
            })?;

        let ratio = refund_amount / original.total_amount;
        let scaled = original
            .commission
            .as_ref()
            .map(|c| c.scale_to(refund_amount, original.total_amount))
            .unwrap_or_else(crate::domain::commission::CommissionBreakdown::zero);
        let scaled_vat = original.vat.as_ref().map(|v| VatSummary {
            rate: v.rate,
            amount: round_minor(v.amount * ratio),
            responsibility: v.responsibility,
            collected: v.collected,
        });

        let mut entries = vec![
            Entry::credit(
                Account::Cash,
                refund_amount,
                format!("Refund to customer for order {order_id}"),
            )
            .as_principal(),
        ];
        if !scaled.vendor_amount.is_zero() {
            entries.push(
                Entry::debit(Account::WalletVendor, scaled.vendor_amount, "Vendor share clawback")
                    .for_user(order.vendor.clone()),
            );
        }
        if let Some(agent) = order.delivery_agent.clone()
            && !scaled.dispatch_amount.is_zero()
        {
            entries.push(
                Entry::debit(
                    Account::WalletDispatch,
                    scaled.dispatch_amount,
                    "Delivery fee clawback",
                )
                .for_user(agent),
            );
        }
        if !scaled.platform_amount.is_zero() {
            entries.push(Entry::debit(
                Account::CommissionRevenue,
                scaled.platform_amount,
                "Platform commission reversal",
            ));
        }
        if let Some(vat) = scaled_vat.as_ref().filter(|v| !v.amount.is_zero()) {
            let mut receivable =
                Entry::credit(Account::VatRevenue, vat.amount, "VAT reversal on refund");
            if vat.responsibility == VatResponsibility::Vendor {
                receivable = receivable.for_user(order.vendor.clone());
            }
            entries.push(receivable);
            entries.push(Entry::debit(
                Account::VatPayable,
                vat.amount,
                "VAT payable reversal",
            ));
        }

        let mut draft =
            TransactionDraft::new(TransactionType::OrderRefund, refund_amount, &original.currency);
        draft.id = Some(id);
        draft.entries = entries;
        draft.vat = scaled_vat;
        draft.commission = Some(scaled.clone());
        draft.related = Some(related);
        draft.created_by = actor.map(str::to_string);
        draft
            .metadata
            .insert("original_transaction_id".to_string(), json!(original.id.to_string()));
        draft
            .metadata
            .insert("gateway_refund_id".to_string(), json!(gateway_refund.id));
        let tx = Ledger::post(&mut *uow, draft, TransactionStatus::Completed)?;

        for (owner, share) in [
            (Some(order.vendor.clone()), scaled.vendor_amount),
            (order.delivery_agent.clone(), scaled.dispatch_amount),
        ] {
            let (Some(owner), Ok(amount)) = (owner, Amount::new(share)) else {
                continue;
            };
            self.wallets
                .debit(&mut *uow, &owner, amount, DebitKind::Refund)
                .inspect_err(|err| {
                    error!(order = %order_id, owner = %owner, share = %share, %err,
                        "refund clawback failed; flagging for reconciliation");
                })?;
        }

        order.payment_status = if refund_amount == original.total_amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        uow.stage_order(order);

        uow.commit().await?;
        info!(order = %order_id, tx = %tx.id, amount = %refund_amount, "refund settled");
        Ok(tx)
    }

    /// Attaches a payout bank account to a party's wallet, creating the
    /// wallet if the party has not earned yet.
    pub async fn link_bank_account(&self, owner: &UserId, account: BankAccount) -> Result<()> {
        let mut uow = self.store.begin().await?;
        let mut wallet = uow.wallet(owner)?.unwrap_or_else(|| {
            crate::domain::wallet::Wallet::new(owner.clone(), "NGN", self.wallets.today())
        });
        wallet.bank_account = Some(account);
        uow.stage_wallet(wallet);
        uow.commit().await?;
        Ok(())
    }

    /// Places a withdrawal request: debits amount + fee from the wallet and
    /// posts a `Pending` withdrawal transaction awaiting approval.
    ///
    /// Balance and limits are re-read inside the same atomic scope that
    /// performs the debit, never from an earlier snapshot.
    pub async fn request_withdrawal(&self, owner: &UserId, amount: Amount) -> Result<Transaction> {
        let fee = withdrawal_fee(amount.value());
        let total = amount.value() + fee;

        let mut uow = self.store.begin().await?;
        let wallet = uow
            .wallet(owner)?
            .ok_or_else(|| SettlementError::WalletNotFound(owner.to_string()))?;
        match &wallet.bank_account {
            Some(account) if account.is_verified => {}
            _ => {
                return Err(SettlementError::Validation(
                    "no verified bank account on wallet".to_string(),
                ));
            }
        }
        self.wallets.can_withdraw(&wallet, total)?;
        let currency = wallet.currency.clone();
        self.wallets
            .debit(&mut *uow, owner, Amount::new(total)?, DebitKind::Withdrawal)?;

        let id = TransactionId::generate();
        let mut draft = TransactionDraft::new(TransactionType::WalletWithdrawal, total, &currency);
        draft.id = Some(id);
        draft.entries = vec![
            Entry::debit(Account::WalletVendor, total, "Withdrawal from wallet")
                .for_user(owner.clone())
                .as_principal(),
            Entry::credit(Account::AccountsPayable, amount.value(), "Payout owed to bank")
                .for_user(owner.clone()),
            Entry::credit(Account::BankTransferFees, fee, "Withdrawal fee"),
        ];
        draft.related = Some(RelatedEntity::withdrawal(id.to_string()));
        draft.created_by = Some(owner.to_string());
        draft.metadata.insert("fee".to_string(), json!(fee.to_string()));
        let tx = Ledger::post(&mut *uow, draft, TransactionStatus::Pending)?;

        uow.commit().await?;
        info!(owner = %owner, tx = %tx.id, amount = %amount, %fee, "withdrawal requested");
        Ok(tx)
    }

    /// Approves a pending withdrawal: instructs the gateway transfer first,
    /// then marks the transaction completed. A timeout or gateway failure
    /// aborts before any write, leaving the withdrawal `Pending` for retry.
    pub async fn approve_withdrawal(
        &self,
        id: &TransactionId,
        approver: Option<&str>,
    ) -> Result<Transaction> {
        let pending = self
            .store
            .transaction(id)
            .await?
            .ok_or(SettlementError::TransactionNotFound(*id))?;
        Self::require_pending_withdrawal(&pending)?;
        let owner = Self::withdrawal_owner(&pending)?;
        let payout = Self::credited(&pending, Account::AccountsPayable);

        let bank = self
            .store
            .wallet(&owner)
            .await?
            .ok_or_else(|| SettlementError::WalletNotFound(owner.to_string()))?
            .bank_account
            .ok_or_else(|| {
                SettlementError::Validation("no bank account on wallet".to_string())
            })?;

        // External network boundary: on timeout the transaction stays
        // pending, so the approval can simply be retried.
        let transfer = self.gateway.transfer(&bank, payout, &id.to_string()).await?;
        if transfer.status != GatewayStatus::Success {
            let reason = transfer
                .reason
                .unwrap_or_else(|| "transfer not accepted".to_string());
            warn!(tx = %id, owner = %owner, %reason, "gateway transfer failed; withdrawal stays pending");
            return Err(SettlementError::GatewayFailure { reason });
        }

        let mut uow = self.store.begin().await?;
        let mut tx = uow
            .transaction(id)?
            .ok_or(SettlementError::TransactionNotFound(*id))?;
        Self::require_pending_withdrawal(&tx)?;
        tx.transition(TransactionStatus::Completed)?;
        tx.audit.approved_by = approver.map(str::to_string);
        tx.metadata
            .insert("transfer_reference".to_string(), json!(transfer.reference));
        uow.stage_transaction(tx.clone());
        uow.commit().await?;

        info!(tx = %id, owner = %owner, amount = %payout, "withdrawal approved and transferred");
        Ok(tx)
    }

    /// Rejects a pending withdrawal: cancels it and posts a compensating
    /// deposit crediting the wallet back the full amount + fee.
    pub async fn reject_withdrawal(
        &self,
        id: &TransactionId,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Transaction> {
        let mut uow = self.store.begin().await?;
        let mut tx = uow
            .transaction(id)?
            .ok_or(SettlementError::TransactionNotFound(*id))?;
        Self::require_pending_withdrawal(&tx)?;
        let owner = Self::withdrawal_owner(&tx)?;
        let payout = Self::credited(&tx, Account::AccountsPayable);
        let fee = Self::credited(&tx, Account::BankTransferFees);
        let total = tx.total_amount;
        let currency = tx.currency.clone();

        tx.transition(TransactionStatus::Cancelled)?;
        if let Some(reason) = reason {
            tx.metadata
                .insert("rejection_reason".to_string(), json!(reason));
        }
        uow.stage_transaction(tx);

        self.wallets.credit(
            &mut *uow,
            &owner,
            Amount::new(total)?,
            CreditKind::Deposit,
            &currency,
        )?;

        let mut draft = TransactionDraft::new(TransactionType::WalletDeposit, total, &currency);
        draft.entries = vec![
            Entry::debit(Account::AccountsPayable, payout, "Payout obligation released")
                .for_user(owner.clone()),
            Entry::debit(Account::BankTransferFees, fee, "Withdrawal fee returned"),
            Entry::credit(Account::WalletVendor, total, "Withdrawal returned to wallet")
                .for_user(owner.clone())
                .as_principal(),
        ];
        draft.related = Some(RelatedEntity::withdrawal(id.to_string()));
        draft.created_by = actor.map(str::to_string);
        draft
            .metadata
            .insert("original_transaction_id".to_string(), json!(id.to_string()));
        let deposit = Ledger::post(&mut *uow, draft, TransactionStatus::Completed)?;

        uow.commit().await?;
        info!(tx = %id, owner = %owner, returned = %total, "withdrawal rejected and compensated");
        Ok(deposit)
    }

    fn require_pending_withdrawal(tx: &Transaction) -> Result<()> {
        if tx.kind != TransactionType::WalletWithdrawal {
            return Err(SettlementError::Validation(format!(
                "transaction {} is not a withdrawal",
                tx.id
            )));
        }
        if tx.status != TransactionStatus::Pending {
            return Err(SettlementError::InvalidTransition {
                from: tx.status,
                to: TransactionStatus::Completed,
            });
        }
        Ok(())
    }

    fn withdrawal_owner(tx: &Transaction) -> Result<UserId> {
        tx.entries
            .iter()
            .find(|e| e.principal)
            .and_then(|e| e.user.clone())
            .ok_or_else(|| {
                SettlementError::Validation(format!("withdrawal {} has no owner entry", tx.id))
            })
    }

    fn credited(tx: &Transaction, account: Account) -> Decimal {
        tx.entries
            .iter()
            .filter(|e| e.account == account)
            .map(|e| e.credit)
            .sum()
    }
}
