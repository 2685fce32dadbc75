//! Application layer containing the settlement workflows.
//!
//! [`settlement::SettlementEngine`] is the primary entry point: it coordinates
//! the tax resolver, the commission calculator, [`ledger::Ledger`] and
//! [`wallets::WalletManager`] into the four money-moving workflows, each
//! executed against a single unit of work.

pub mod ledger;
pub mod settlement;
pub mod wallets;
