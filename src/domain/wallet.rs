use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::error::{Result, SettlementError};

pub const DEFAULT_DAILY_LIMIT: Decimal = dec!(500_000);
pub const DEFAULT_MONTHLY_LIMIT: Decimal = dec!(5_000_000);

/// Flat floor of the withdrawal fee, in minor-unit currency terms.
pub const WITHDRAWAL_FEE_FLOOR: Decimal = dec!(100);
/// Percentage component of the withdrawal fee.
pub const WITHDRAWAL_FEE_RATE: Decimal = dec!(0.01);

/// Withdrawal fee policy: `max(1% of amount, 100)`.
pub fn withdrawal_fee(amount: Decimal) -> Decimal {
    (amount * WITHDRAWAL_FEE_RATE).max(WITHDRAWAL_FEE_FLOOR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Suspended,
    Frozen,
    Closed,
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Frozen => "frozen",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Which rolling window rejected a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitWindow {
    Daily,
    Monthly,
}

impl std::fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalLimits {
    pub daily: Decimal,
    pub monthly: Decimal,
    pub minimum_balance: Decimal,
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_LIMIT,
            monthly: DEFAULT_MONTHLY_LIMIT,
            minimum_balance: Decimal::ZERO,
        }
    }
}

/// A rolling-window counter anchored to a calendar date. The `anchor` is the
/// day the window was last written (for the monthly window, any day within
/// that month); the counter is valid only while the anchor matches "now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCounter {
    pub amount: Decimal,
    pub anchor: NaiveDate,
}

impl WindowCounter {
    fn reset_to(today: NaiveDate) -> Self {
        Self {
            amount: Decimal::ZERO,
            anchor: today,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalStats {
    pub daily: WindowCounter,
    pub monthly: WindowCounter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_name: String,
    pub account_number: String,
    pub bank_code: String,
    pub is_verified: bool,
}

/// Lifetime totals kept for audit reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletTotals {
    pub earnings: Decimal,
    pub withdrawals: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    /// Settlement proceeds; bumps `totals.earnings`.
    Earning,
    /// Money returned after a rejected or failed payout.
    Deposit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitKind {
    /// Payout to the party's bank; feeds the rolling windows.
    Withdrawal,
    /// Clawback of settled funds after a refund.
    Refund,
    Adjustment,
}

/// Per-party balance store.
///
/// Mutated only through the methods below, never by direct field assignment,
/// to preserve the rolling-window and audit-total invariants. Balance is never
/// negative after any sequence of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: UserId,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub limits: WithdrawalLimits,
    pub stats: WithdrawalStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<BankAccount>,
    #[serde(default)]
    pub totals: WalletTotals,
}

impl Wallet {
    /// Fresh wallet, created lazily on first credit.
    pub fn new(owner: UserId, currency: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            owner,
            balance: Decimal::ZERO,
            currency: currency.into(),
            status: WalletStatus::Active,
            limits: WithdrawalLimits::default(),
            stats: WithdrawalStats {
                daily: WindowCounter::reset_to(today),
                monthly: WindowCounter::reset_to(today),
            },
            bank_account: None,
            totals: WalletTotals::default(),
        }
    }

    /// Always succeeds; there is no upper bound on balance.
    pub fn credit(&mut self, amount: Decimal, kind: CreditKind) {
        self.balance += amount;
        if kind == CreditKind::Earning {
            self.totals.earnings += amount;
        }
    }

    /// Fails with `InsufficientBalance` when the balance cannot cover the
    /// debit (withdrawals additionally reserve the configured minimum
    /// balance). Withdrawal debits feed the rolling windows.
    pub fn debit(&mut self, amount: Decimal, kind: DebitKind, today: NaiveDate) -> Result<()> {
        let floor = match kind {
            DebitKind::Withdrawal => self.limits.minimum_balance,
            _ => Decimal::ZERO,
        };
        if self.balance - amount < floor {
            return Err(SettlementError::InsufficientBalance {
                required: amount + floor,
                available: self.balance,
            });
        }
        self.balance -= amount;
        if kind == DebitKind::Withdrawal {
            self.record_withdrawal(amount, today);
        }
        Ok(())
    }

    /// Rolls the daily window forward when the stored date is not `today`, and
    /// the monthly window when the stored month is not the current month, then
    /// adds `amount` to both counters and the lifetime total.
    pub fn record_withdrawal(&mut self, amount: Decimal, today: NaiveDate) {
        if self.stats.daily.anchor != today {
            self.stats.daily = WindowCounter::reset_to(today);
        }
        if !same_month(self.stats.monthly.anchor, today) {
            self.stats.monthly = WindowCounter::reset_to(today);
        }
        self.stats.daily.amount += amount;
        self.stats.monthly.amount += amount;
        self.totals.withdrawals += amount;
    }

    /// Counter value the daily window would hold after lazy rollover.
    pub fn daily_withdrawn(&self, today: NaiveDate) -> Decimal {
        if self.stats.daily.anchor == today {
            self.stats.daily.amount
        } else {
            Decimal::ZERO
        }
    }

    /// Counter value the monthly window would hold after lazy rollover.
    pub fn monthly_withdrawn(&self, today: NaiveDate) -> Decimal {
        if same_month(self.stats.monthly.anchor, today) {
            self.stats.monthly.amount
        } else {
            Decimal::ZERO
        }
    }

    /// Whether a deduction of `amount` may be withdrawn today. Requires an
    /// active wallet and that the deduction fits both rolling windows,
    /// evaluated after the lazy rollover.
    pub fn can_withdraw(&self, amount: Decimal, today: NaiveDate) -> Result<()> {
        if self.status != WalletStatus::Active {
            return Err(SettlementError::WalletInactive {
                owner: self.owner.to_string(),
                status: self.status.to_string(),
            });
        }
        let daily = self.daily_withdrawn(today);
        if daily + amount > self.limits.daily {
            return Err(SettlementError::WithdrawalLimitExceeded {
                window: LimitWindow::Daily,
                withdrawn: daily,
                requested: amount,
                limit: self.limits.daily,
            });
        }
        let monthly = self.monthly_withdrawn(today);
        if monthly + amount > self.limits.monthly {
            return Err(SettlementError::WithdrawalLimitExceeded {
                window: LimitWindow::Monthly,
                withdrawn: monthly,
                requested: amount,
                limit: self.limits.monthly,
            });
        }
        Ok(())
    }
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
