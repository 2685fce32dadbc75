use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use oja_ledger::application::settlement::SettlementEngine;
use oja_ledger::domain::order::{Order, OrderLine};
use oja_ledger::domain::ports::SettlementStore;
use oja_ledger::domain::tax::TaxPolicy;
use oja_ledger::domain::wallet::BankAccount;
use oja_ledger::domain::{OrderId, UserId};
use oja_ledger::infrastructure::gateway::ScriptedGateway;
use oja_ledger::infrastructure::in_memory::InMemoryStore;
use oja_ledger::infrastructure::vendors::InMemoryVendorDirectory;

pub struct Harness {
    pub engine: SettlementEngine,
    pub store: InMemoryStore,
    pub gateway: ScriptedGateway,
    pub vendors: InMemoryVendorDirectory,
}

/// Engine wired to in-memory adapters with the default NGN policy active.
pub async fn harness() -> Harness {
    let store = InMemoryStore::new();
    let gateway = ScriptedGateway::new();
    let vendors = InMemoryVendorDirectory::new();
    store
        .put_policy(TaxPolicy::default_ngn(Utc::now() - Duration::days(30)))
        .await
        .unwrap();
    let engine = SettlementEngine::new(
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        Arc::new(vendors.clone()),
    );
    Harness {
        engine,
        store,
        gateway,
        vendors,
    }
}

/// The worked example: one line at store price 9,000 listed at 9,675, plus a
/// 1,075 delivery fee fulfilled by an agent. Order total 10,750.
pub fn example_order(id: &str) -> Order {
    Order {
        id: OrderId::from(id),
        customer: UserId::from("customer-1"),
        vendor: UserId::from("vendor-1"),
        lines: vec![OrderLine {
            store_price: dec!(9_000),
            listed_price: dec!(9_675),
            quantity: 1,
        }],
        delivery_fee: dec!(1_075),
        delivery_agent: Some(UserId::from("rider-1")),
        vat_category: None,
        currency: "NGN".to_string(),
        payment_status: Default::default(),
        payment_reference: None,
    }
}

pub fn verified_bank_account() -> BankAccount {
    BankAccount {
        account_name: "Ada Obi".to_string(),
        account_number: "0123456789".to_string(),
        bank_code: "058".to_string(),
        is_verified: true,
    }
}

/// Captures `order` after registering its payment with the gateway.
pub async fn settle_payment(h: &Harness, order: Order, reference: &str) {
    h.gateway.record_payment(reference, order.total());
    h.engine.capture_payment(order, reference).await.unwrap();
}

pub async fn balance_of(h: &Harness, owner: &str) -> Decimal {
    h.store
        .wallet(&UserId::from(owner))
        .await
        .unwrap()
        .map(|w| w.balance)
        .unwrap_or_default()
}
