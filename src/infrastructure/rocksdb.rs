use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::order::Order;
use crate::domain::ports::{SettlementStore, UnitOfWork};
use crate::domain::tax::{TaxPolicy, select_active};
use crate::domain::transaction::{RelatedEntity, Transaction, TransactionId, TransactionType};
use crate::domain::wallet::Wallet;
use crate::domain::{OrderId, UserId};
use crate::error::{Result, SettlementError};

/// Column family for wallet states.
pub const CF_WALLETS: &str = "wallets";
/// Column family for ledger transactions.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column family for order payment state.
pub const CF_ORDERS: &str = "orders";
/// Column family for versioned tax policies.
pub const CF_POLICIES: &str = "policies";

/// Persistent store implementation using RocksDB.
///
/// Each entity lives in its own column family. A unit of work stages writes
/// into a single `WriteBatch`, applied atomically by one `db.write` at
/// commit; the store-level mutex serializes units of work so the balance
/// check-then-debit read-modify-write cannot interleave.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    txn_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at `path`, ensuring the required
    /// column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_WALLETS, CF_TRANSACTIONS, CF_ORDERS, CF_POLICIES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(SettlementError::internal)?;

        Ok(Self {
            db: Arc::new(db),
            txn_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SettlementError::internal(std::io::Error::other(format!(
                "column family {name} not found"
            )))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(SettlementError::internal)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(SettlementError::internal)?,
            )),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(SettlementError::internal)?;
            values.push(serde_json::from_slice(&value).map_err(SettlementError::internal)?);
        }
        Ok(values)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(SettlementError::internal)
}

struct RocksDbUnitOfWork {
    store: RocksDbStore,
    _guard: OwnedMutexGuard<()>,
    wallets: HashMap<UserId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    orders: HashMap<OrderId, Order>,
}

#[async_trait]
impl UnitOfWork for RocksDbUnitOfWork {
    fn wallet(&self, owner: &UserId) -> Result<Option<Wallet>> {
        if let Some(wallet) = self.wallets.get(owner) {
            return Ok(Some(wallet.clone()));
        }
        self.store.get(CF_WALLETS, owner.0.as_bytes())
    }

    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        if let Some(tx) = self.transactions.get(id) {
            return Ok(Some(tx.clone()));
        }
        self.store.get(CF_TRANSACTIONS, id.to_string().as_bytes())
    }

    fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        if let Some(order) = self.orders.get(id) {
            return Ok(Some(order.clone()));
        }
        self.store.get(CF_ORDERS, id.0.as_bytes())
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
        let mut batch = WriteBatch::default();
        let wallets_cf = self.store.cf(CF_WALLETS)?;
        for (owner, wallet) in &self.wallets {
            batch.put_cf(wallets_cf, owner.0.as_bytes(), encode(wallet)?);
        }
        let transactions_cf = self.store.cf(CF_TRANSACTIONS)?;
        for (id, tx) in &self.transactions {
            batch.put_cf(transactions_cf, id.to_string().as_bytes(), encode(tx)?);
        }
        let orders_cf = self.store.cf(CF_ORDERS)?;
        for (id, order) in &self.orders {
            batch.put_cf(orders_cf, id.0.as_bytes(), encode(order)?);
        }
        self.store.db.write(batch).map_err(SettlementError::internal)
    }
}

#[async_trait]
impl SettlementStore for RocksDbStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.txn_lock.clone().lock_owned().await;
        Ok(Box::new(RocksDbUnitOfWork {
            store: self.clone(),
            _guard: guard,
            wallets: HashMap::new(),
            transactions: HashMap::new(),
            orders: HashMap::new(),
        }))
    }

    async fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.get(CF_TRANSACTIONS, id.to_string().as_bytes())
    }

    async fn find_transaction(
        &self,
        related: &RelatedEntity,
        kind: TransactionType,
    ) -> Result<Option<Transaction>> {
        let all: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        Ok(all
            .into_iter()
            .find(|tx| tx.kind == kind && tx.related.as_ref() == Some(related)))
    }

    async fn transactions(&self) -> Result<Vec<Transaction>> {
        let mut all: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        all.sort_by_key(|tx| tx.audit.created_at);
        Ok(all)
    }

    async fn wallet(&self, owner: &UserId) -> Result<Option<Wallet>> {
        self.get(CF_WALLETS, owner.0.as_bytes())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let mut all: Vec<Wallet> = self.scan(CF_WALLETS)?;
        all.sort_by(|a, b| a.owner.0.cmp(&b.owner.0));
        Ok(all)
    }

    async fn active_policy(&self, at: DateTime<Utc>) -> Result<Option<TaxPolicy>> {
        let policies: Vec<TaxPolicy> = self.scan(CF_POLICIES)?;
        Ok(select_active(&policies, at).cloned())
    }

    async fn put_policy(&self, policy: TaxPolicy) -> Result<()> {
        let cf = self.cf(CF_POLICIES)?;
        self.db
            .put_cf(cf, policy.version.to_be_bytes(), encode(&policy)?)
            .map_err(SettlementError::internal)
    }
}
