use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::ports::{
    GatewayRefund, GatewayStatus, GatewayTransfer, GatewayVerification, PaymentGateway,
};
use crate::domain::wallet::BankAccount;
use crate::error::{Result, SettlementError};

/// Outcome a [`ScriptedGateway`] produces for transfer/refund calls.
#[derive(Debug, Clone, Default)]
pub enum GatewayScript {
    #[default]
    Succeed,
    Fail(String),
    Timeout,
}

/// A scriptable payment-gateway double for tests and event-log replay.
///
/// `record_payment` registers a reference the gateway will verify as paid;
/// transfer and refund outcomes follow their configured scripts. Real
/// card/transfer processing lives outside this crate.
#[derive(Default, Clone)]
pub struct ScriptedGateway {
    payments: Arc<Mutex<HashMap<String, Decimal>>>,
    transfer_script: Arc<Mutex<GatewayScript>>,
    refund_script: Arc<Mutex<GatewayScript>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a successful customer payment of `amount` under `reference`.
    pub fn record_payment(&self, reference: &str, amount: Decimal) {
        self.payments
            .lock()
            .expect("gateway lock")
            .insert(reference.to_string(), amount);
    }

    pub fn script_transfer(&self, script: GatewayScript) {
        *self.transfer_script.lock().expect("gateway lock") = script;
    }

    pub fn script_refund(&self, script: GatewayScript) {
        *self.refund_script.lock().expect("gateway lock") = script;
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification> {
        let payments = self.payments.lock().expect("gateway lock");
        Ok(match payments.get(reference) {
            Some(amount) => GatewayVerification {
                status: GatewayStatus::Success,
                amount: *amount,
                reason: None,
            },
            None => GatewayVerification {
                status: GatewayStatus::Failed,
                amount: Decimal::ZERO,
                reason: Some(format!("unknown payment reference {reference}")),
            },
        })
    }

    async fn transfer(
        &self,
        _bank: &BankAccount,
        _amount: Decimal,
        reference: &str,
    ) -> Result<GatewayTransfer> {
        let script = self.transfer_script.lock().expect("gateway lock").clone();
        match script {
            GatewayScript::Succeed => Ok(GatewayTransfer {
                status: GatewayStatus::Success,
                reference: format!("TRF-{reference}"),
                reason: None,
            }),
            GatewayScript::Fail(reason) => Ok(GatewayTransfer {
                status: GatewayStatus::Failed,
                reference: reference.to_string(),
                reason: Some(reason),
            }),
            GatewayScript::Timeout => Err(SettlementError::GatewayTimeout {
                reference: reference.to_string(),
            }),
        }
    }

    async fn refund(&self, reference: &str, _amount: Decimal) -> Result<GatewayRefund> {
        let script = self.refund_script.lock().expect("gateway lock").clone();
        match script {
            GatewayScript::Succeed => Ok(GatewayRefund {
                status: GatewayStatus::Success,
                id: format!("RFD-{reference}"),
                reason: None,
            }),
            GatewayScript::Fail(reason) => Ok(GatewayRefund {
                status: GatewayStatus::Failed,
                id: reference.to_string(),
                reason: Some(reason),
            }),
            GatewayScript::Timeout => Err(SettlementError::GatewayTimeout {
                reference: reference.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_verify_known_and_unknown_references() {
        let gateway = ScriptedGateway::new();
        gateway.record_payment("PAY-1", dec!(10_750));

        let ok = gateway.verify("PAY-1").await.unwrap();
        assert_eq!(ok.status, GatewayStatus::Success);
        assert_eq!(ok.amount, dec!(10_750));

        let missing = gateway.verify("PAY-2").await.unwrap();
        assert_eq!(missing.status, GatewayStatus::Failed);
    }

    #[tokio::test]
    async fn test_scripted_transfer_outcomes() {
        let gateway = ScriptedGateway::new();
        let bank = BankAccount {
            account_name: "Ada".to_string(),
            account_number: "0123456789".to_string(),
            bank_code: "058".to_string(),
            is_verified: true,
        };

        let ok = gateway.transfer(&bank, dec!(100), "W-1").await.unwrap();
        assert_eq!(ok.status, GatewayStatus::Success);

        gateway.script_transfer(GatewayScript::Timeout);
        assert!(matches!(
            gateway.transfer(&bank, dec!(100), "W-1").await,
            Err(SettlementError::GatewayTimeout { .. })
        ));
    }
}
