use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::order::Order;
use super::tax::{TaxPolicy, VendorTaxProfile};
use super::transaction::{RelatedEntity, Transaction, TransactionId, TransactionType};
use super::wallet::{BankAccount, Wallet};
use super::{OrderId, UserId};
use crate::error::Result;

/// An atomic, all-or-nothing scope over the persistent store.
///
/// A unit of work isolates one settlement workflow: reads observe the store
/// plus this unit's own staged writes, and `commit` applies every staged write
/// together or not at all. Dropping the unit without committing aborts it —
/// no partial state survives. Implementations serialize units of work, so a
/// balance read through a unit cannot go stale before its debit commits.
///
/// Reads and staging are synchronous; `commit` is the only suspend point.
#[async_trait]
pub trait UnitOfWork: Send {
    fn wallet(&self, owner: &UserId) -> Result<Option<Wallet>>;
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>>;
    fn order(&self, id: &OrderId) -> Result<Option<Order>>;

    fn stage_wallet(&mut self, wallet: Wallet);
    fn stage_transaction(&mut self, tx: Transaction);
    fn stage_order(&mut self, order: Order);

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Storage port for the settlement engine.
///
/// The direct read methods are for lookups outside any workflow (reports,
/// pre-reads); anything a workflow writes, and every read its decision depends
/// on, must go through a [`UnitOfWork`] from `begin`.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>>;
    async fn find_transaction(
        &self,
        related: &RelatedEntity,
        kind: TransactionType,
    ) -> Result<Option<Transaction>>;
    async fn transactions(&self) -> Result<Vec<Transaction>>;
    async fn wallet(&self, owner: &UserId) -> Result<Option<Wallet>>;
    async fn wallets(&self) -> Result<Vec<Wallet>>;

    async fn active_policy(&self, at: DateTime<Utc>) -> Result<Option<TaxPolicy>>;
    async fn put_policy(&self, policy: TaxPolicy) -> Result<()>;
}

pub type SettlementStoreRef = Arc<dyn SettlementStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct GatewayVerification {
    pub status: GatewayStatus,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayTransfer {
    pub status: GatewayStatus,
    pub reference: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub status: GatewayStatus,
    pub id: String,
    pub reason: Option<String>,
}

/// The external payment gateway. Card/transfer processing and webhook
/// verification live behind it; the engine only consumes outcomes.
///
/// Calls are network boundaries, cancellable independently of any store
/// transaction: implementations surface timeouts as
/// [`crate::error::SettlementError::GatewayTimeout`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification>;
    async fn transfer(
        &self,
        bank: &BankAccount,
        amount: Decimal,
        reference: &str,
    ) -> Result<GatewayTransfer>;
    async fn refund(&self, reference: &str, amount: Decimal) -> Result<GatewayRefund>;
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;

/// Read-only view of vendor registration data, owned by the user service.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn tax_profile(&self, vendor: &UserId) -> Result<VendorTaxProfile>;
}

pub type VendorDirectoryRef = Arc<dyn VendorDirectory>;
