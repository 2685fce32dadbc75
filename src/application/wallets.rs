use chrono::{FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::UserId;
use crate::domain::money::Amount;
use crate::domain::ports::UnitOfWork;
use crate::domain::wallet::{CreditKind, DebitKind, Wallet};
use crate::error::{Result, SettlementError};

/// Reporting timezone for the rolling withdrawal windows (UTC+01:00, West
/// Africa Time). Window boundaries are calendar days in this offset, not in
/// whatever zone the host happens to run in.
pub const REPORTING_OFFSET_SECS: i32 = 3600;

/// Per-party balance operations, always executed against a unit of work so a
/// wallet mutation commits together with the ledger record that explains it.
#[derive(Debug, Clone)]
pub struct WalletManager {
    reporting_offset: FixedOffset,
}

impl Default for WalletManager {
    fn default() -> Self {
        Self {
            reporting_offset: FixedOffset::east_opt(REPORTING_OFFSET_SECS).expect("valid offset"),
        }
    }
}

impl WalletManager {
    pub fn new(reporting_offset: FixedOffset) -> Self {
        Self { reporting_offset }
    }

    /// Today's calendar date in the reporting timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.reporting_offset).date_naive()
    }

    /// Credits a party's wallet, creating it lazily on first credit.
    pub fn credit(
        &self,
        uow: &mut dyn UnitOfWork,
        owner: &UserId,
        amount: Amount,
        kind: CreditKind,
        currency: &str,
    ) -> Result<Wallet> {
        let mut wallet = uow
            .wallet(owner)?
            .unwrap_or_else(|| Wallet::new(owner.clone(), currency, self.today()));
        wallet.credit(amount.value(), kind);
        debug!(owner = %owner, amount = %amount, ?kind, balance = %wallet.balance, "wallet credit");
        uow.stage_wallet(wallet.clone());
        Ok(wallet)
    }

    /// Debits a party's wallet; fails with `InsufficientBalance` when the
    /// balance cannot cover it. Withdrawal debits feed the rolling windows.
    pub fn debit(
        &self,
        uow: &mut dyn UnitOfWork,
        owner: &UserId,
        amount: Amount,
        kind: DebitKind,
    ) -> Result<Wallet> {
        let mut wallet = uow
            .wallet(owner)?
            .ok_or_else(|| SettlementError::WalletNotFound(owner.to_string()))?;
        wallet.debit(amount.value(), kind, self.today())?;
        debug!(owner = %owner, amount = %amount, ?kind, balance = %wallet.balance, "wallet debit");
        uow.stage_wallet(wallet.clone());
        Ok(wallet)
    }

    /// Whether `total_deduction` may be withdrawn from `wallet` today, after
    /// lazy rollover of the daily and monthly windows.
    pub fn can_withdraw(&self, wallet: &Wallet, total_deduction: Decimal) -> Result<()> {
        wallet.can_withdraw(total_deduction, self.today())
    }
}
