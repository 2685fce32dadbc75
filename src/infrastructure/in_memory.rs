use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::order::Order;
use crate::domain::ports::{SettlementStore, UnitOfWork};
use crate::domain::tax::{TaxPolicy, select_active};
use crate::domain::transaction::{RelatedEntity, Transaction, TransactionId, TransactionType};
use crate::domain::wallet::Wallet;
use crate::domain::{OrderId, UserId};
use crate::error::Result;

#[derive(Default)]
struct StoreState {
    wallets: HashMap<UserId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    orders: HashMap<OrderId, Order>,
    policies: Vec<TaxPolicy>,
}

/// In-memory store. Ideal for tests and event-log replay where persistence
/// across runs is not required.
///
/// A single mutex guards the whole state: a unit of work owns the guard from
/// `begin` until commit or drop, which serializes settlements and makes the
/// balance check-then-debit read-modify-write safe.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seeding hook: inserts a wallet directly, outside any workflow.
    pub async fn seed_wallet(&self, wallet: Wallet) {
        self.state.lock().await.wallets.insert(wallet.owner.clone(), wallet);
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<StoreState>,
    wallets: HashMap<UserId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    orders: HashMap<OrderId, Order>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn wallet(&self, owner: &UserId) -> Result<Option<Wallet>> {
        Ok(self
            .wallets
            .get(owner)
            .or_else(|| self.guard.wallets.get(owner))
            .cloned())
    }

    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .get(id)
            .or_else(|| self.guard.transactions.get(id))
            .cloned())
    }

    fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self
            .orders
            .get(id)
            .or_else(|| self.guard.orders.get(id))
            .cloned())
    }

    fn stage_wallet(&mut self, wallet: Wallet) {
        self.wallets.insert(wallet.owner.clone(), wallet);
    }

    fn stage_transaction(&mut self, tx: Transaction) {
        self.transactions.insert(tx.id, tx);
    }

    fn stage_order(&mut self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.guard;
        for (owner, wallet) in self.wallets {
            state.wallets.insert(owner, wallet);
        }
        for (id, tx) in self.transactions {
            state.transactions.insert(id, tx);
        }
        for (id, order) in self.orders {
            state.orders.insert(id, order);
        }
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            wallets: HashMap::new(),
            transactions: HashMap::new(),
            orders: HashMap::new(),
        }))
    }

    async fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.get(id).cloned())
    }

    async fn find_transaction(
        &self,
        related: &RelatedEntity,
        kind: TransactionType,
    ) -> Result<Option<Transaction>> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .values()
            .find(|tx| tx.kind == kind && tx.related.as_ref() == Some(related))
            .cloned())
    }

    async fn transactions(&self) -> Result<Vec<Transaction>> {
        let mut all: Vec<Transaction> =
            self.state.lock().await.transactions.values().cloned().collect();
        all.sort_by_key(|tx| tx.audit.created_at);
        Ok(all)
    }

    async fn wallet(&self, owner: &UserId) -> Result<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(owner).cloned())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let mut all: Vec<Wallet> = self.state.lock().await.wallets.values().cloned().collect();
        all.sort_by(|a, b| a.owner.0.cmp(&b.owner.0));
        Ok(all)
    }

    async fn active_policy(&self, at: DateTime<Utc>) -> Result<Option<TaxPolicy>> {
        Ok(select_active(&self.state.lock().await.policies, at).cloned())
    }

    async fn put_policy(&self, policy: TaxPolicy) -> Result<()> {
        let mut state = self.state.lock().await;
        state.policies.retain(|p| p.version != policy.version);
        state.policies.push(policy);
        Ok(())
    }
}
