mod common;

use common::{balance_of, example_order, harness, settle_payment};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use oja_ledger::domain::UserId;
use oja_ledger::domain::order::PaymentStatus;
use oja_ledger::domain::ports::{SettlementStore, UnitOfWork};
use oja_ledger::domain::tax::VendorTaxProfile;
use oja_ledger::domain::transaction::{Account, TransactionStatus, VatResponsibility};
use oja_ledger::domain::{OrderId, commission};
use oja_ledger::error::SettlementError;

#[tokio::test]
async fn test_capture_settles_worked_example() {
    let h = harness().await;
    let order = example_order("order-1");
    h.gateway.record_payment("PAY-1", dec!(10_750));

    let tx = h.engine.capture_payment(order, "PAY-1").await.unwrap();

    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.total_amount, dec!(10_750));
    assert_eq!(tx.debit_total(), tx.credit_total());

    // VAT is computed on the order total, not the goods subtotal
    let vat = tx.vat.as_ref().unwrap();
    assert_eq!(vat.amount, dec!(806.25));
    assert_eq!(vat.rate, dec!(7.5));
    assert_eq!(vat.responsibility, VatResponsibility::Platform);
    assert!(vat.collected);

    let commission = tx.commission.as_ref().unwrap();
    assert_eq!(commission.vendor_amount, dec!(9_000));
    assert_eq!(commission.platform_amount, dec!(675));
    assert_eq!(commission.dispatch_amount, dec!(1_075));
    assert_eq!(commission.platform_rate, dec!(7.5));

    // every leg including the VAT sub-split combines to 10,750 + 806.25
    assert_eq!(tx.debit_total(), dec!(11_556.25));

    assert_eq!(balance_of(&h, "vendor-1").await, dec!(9_000));
    assert_eq!(balance_of(&h, "rider-1").await, dec!(1_075));
}

#[tokio::test]
async fn test_capture_marks_order_paid() {
    let h = harness().await;
    settle_payment(&h, example_order("order-1"), "PAY-1").await;

    let uow = h.store.begin().await.unwrap();
    let stored = uow.order(&OrderId::from("order-1")).unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.payment_reference.as_deref(), Some("PAY-1"));
}

#[tokio::test]
async fn test_failed_verification_writes_nothing() {
    let h = harness().await;
    // nothing recorded at the gateway for this reference
    let err = h
        .engine
        .capture_payment(example_order("order-1"), "PAY-404")
        .await;

    assert!(matches!(err, Err(SettlementError::GatewayFailure { .. })));
    assert!(h.store.transactions().await.unwrap().is_empty());
    assert!(h.store.wallets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_amount_mismatch_writes_nothing() {
    let h = harness().await;
    h.gateway.record_payment("PAY-1", dec!(9_999));

    let err = h.engine.capture_payment(example_order("order-1"), "PAY-1").await;

    assert!(matches!(err, Err(SettlementError::GatewayFailure { .. })));
    assert!(h.store.transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_capture_retry_does_not_double_credit() {
    let h = harness().await;
    settle_payment(&h, example_order("order-1"), "PAY-1").await;
    let first = h.store.transactions().await.unwrap();

    // the caller retries the same logical event with the same reference
    let tx = h
        .engine
        .capture_payment(example_order("order-1"), "PAY-1")
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(tx.id, first[0].id);
    assert_eq!(h.store.transactions().await.unwrap().len(), 1);
    assert_eq!(balance_of(&h, "vendor-1").await, dec!(9_000));
}

#[tokio::test]
async fn test_missing_tax_policy_blocks_settlement() {
    let h = harness().await;
    let store = oja_ledger::infrastructure::in_memory::InMemoryStore::new();
    let engine = oja_ledger::application::settlement::SettlementEngine::new(
        std::sync::Arc::new(store.clone()),
        std::sync::Arc::new(h.gateway.clone()),
        std::sync::Arc::new(h.vendors.clone()),
    );
    h.gateway.record_payment("PAY-1", dec!(10_750));

    let err = engine.capture_payment(example_order("order-1"), "PAY-1").await;

    assert!(matches!(err, Err(SettlementError::TaxPolicyMissing)));
    assert!(store.transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registered_vendor_carries_vat_liability() {
    let h = harness().await;
    h.vendors
        .set_profile(
            UserId::from("vendor-1"),
            VendorTaxProfile {
                vat_registered: true,
                annual_turnover: dec!(1_000_000),
            },
        )
        .await;
    h.gateway.record_payment("PAY-1", dec!(10_750));

    let tx = h
        .engine
        .capture_payment(example_order("order-1"), "PAY-1")
        .await
        .unwrap();

    let vat = tx.vat.as_ref().unwrap();
    assert_eq!(vat.responsibility, VatResponsibility::Vendor);
    assert!(!vat.collected);

    // the receivable leg is tagged to the liable vendor
    let receivable = tx
        .entries
        .iter()
        .find(|e| e.account == Account::VatRevenue)
        .unwrap();
    assert_eq!(receivable.user, Some(UserId::from("vendor-1")));
}

#[tokio::test]
async fn test_order_without_agent_has_no_dispatch_leg() {
    let h = harness().await;
    let mut order = example_order("order-1");
    order.delivery_agent = None;
    order.delivery_fee = Decimal::ZERO;
    h.gateway.record_payment("PAY-1", dec!(9_675));

    let tx = h.engine.capture_payment(order, "PAY-1").await.unwrap();

    assert_eq!(tx.total_amount, dec!(9_675));
    assert!(
        tx.entries
            .iter()
            .all(|e| e.account != Account::WalletDispatch)
    );
    assert_eq!(balance_of(&h, "rider-1").await, Decimal::ZERO);
}

#[tokio::test]
async fn test_commission_matches_calculator_output() {
    let h = harness().await;
    let order = example_order("order-1");
    let expected = commission::compute(&order.lines, order.delivery_fee, true);
    settle_payment(&h, order, "PAY-1").await;

    let tx = &h.store.transactions().await.unwrap()[0];
    assert_eq!(tx.commission.as_ref().unwrap(), &expected);
}
