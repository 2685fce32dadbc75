use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};

use crate::domain::{OrderId, UserId};
use crate::domain::order::Order;
use crate::error::{Result, SettlementError};

/// One line of a settlement event log.
///
/// Events are the outcomes the engine consumes from its collaborators: a
/// gateway-confirmed payment, an approved refund, and the wallet lifecycle
/// around withdrawals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SettlementEvent {
    Payment {
        order: Order,
        reference: String,
    },
    Refund {
        order: OrderId,
        amount: Decimal,
        reference: String,
        #[serde(default)]
        actor: Option<String>,
    },
    LinkBank {
        user: UserId,
        account_name: String,
        account_number: String,
        bank_code: String,
    },
    WithdrawalRequest {
        user: UserId,
        amount: Decimal,
    },
    WithdrawalApprove {
        user: UserId,
        #[serde(default)]
        approver: Option<String>,
    },
    WithdrawalReject {
        user: UserId,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Reads settlement events from a JSON-lines source.
///
/// Wraps any `Read` and yields a lazy iterator of `Result<SettlementEvent>`,
/// so large event logs stream without loading into memory. Blank lines are
/// skipped.
pub struct EventReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn events(self) -> impl Iterator<Item = Result<SettlementEvent>> {
        self.reader
            .lines()
            .map(|line| -> Result<Option<SettlementEvent>> {
                let line = line.map_err(SettlementError::internal)?;
                if line.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&line)
                    .map(Some)
                    .map_err(SettlementError::internal)
            })
            .filter_map(Result::transpose)
    }
}
