use std::io::Write;

use crate::domain::wallet::Wallet;
use crate::error::{Result, SettlementError};

/// Writes final wallet balances as CSV.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    pub fn write_wallets(&mut self, wallets: &[Wallet]) -> Result<()> {
        self.writer
            .write_record([
                "owner",
                "balance",
                "currency",
                "status",
                "total_earnings",
                "total_withdrawals",
            ])
            .map_err(SettlementError::internal)?;
        for wallet in wallets {
            // normalized so 3000.0 and 3000.00 both print as 3000
            self.writer
                .write_record([
                    wallet.owner.to_string(),
                    wallet.balance.normalize().to_string(),
                    wallet.currency.clone(),
                    wallet.status.to_string(),
                    wallet.totals.earnings.normalize().to_string(),
                    wallet.totals.withdrawals.normalize().to_string(),
                ])
                .map_err(SettlementError::internal)?;
        }
        self.writer.flush().map_err(SettlementError::internal)?;
        Ok(())
    }
}
