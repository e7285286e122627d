use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::gate::GateResult;
use super::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    Skipped,
    Executed,
    Hold,
    Error,
}

/// One row of the trade ledger. Field order matches the file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub signal_type: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: LedgerStatus,
    pub pnl: Decimal, // realized later; always zero at append time
    pub notes: String,
}

impl LedgerEntry {
    /// Signal stopped by a blocking gate.
    pub fn skipped(signal: &Signal, failed: &GateResult) -> Self {
        Self {
            timestamp: Utc::now(),
            signal_type: signal.action.as_str().to_string(),
            price: signal.price.unwrap_or(Decimal::ZERO),
            quantity: Decimal::ZERO,
            status: LedgerStatus::Skipped,
            pnl: Decimal::ZERO,
            notes: format!(
                "[{}] {} fail: {}",
                signal.display_symbol(),
                failed.gate,
                failed.detail
            ),
        }
    }

    /// Signal that reached the decision authority.
    pub fn decided(signal: &Signal, decision: &Decision, order_quantity: Decimal) -> Self {
        let (status, quantity) = if decision.action.is_trade() {
            (LedgerStatus::Executed, order_quantity)
        } else {
            (LedgerStatus::Hold, Decimal::ZERO)
        };
        Self {
            timestamp: Utc::now(),
            signal_type: decision.action.as_str().to_string(),
            price: signal.price.unwrap_or(Decimal::ZERO),
            quantity,
            status,
            pnl: Decimal::ZERO,
            notes: format!("[{}] {}", signal.display_symbol(), decision.reason),
        }
    }

    /// Processing fault after the signal was accepted.
    pub fn error(signal: &Signal, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            signal_type: signal.action.as_str().to_string(),
            price: signal.price.unwrap_or(Decimal::ZERO),
            quantity: Decimal::ZERO,
            status: LedgerStatus::Error,
            pnl: Decimal::ZERO,
            notes: format!("[{}] {message}", signal.display_symbol()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::decision::{DecisionAction, DecisionSource};
    use crate::models::gate::GateKind;
    use rust_decimal_macros::dec;

    fn signal() -> Signal {
        Signal::from_payload(br#"{"symbol":"BTCUSD","action":"BUY","price":65000}"#).unwrap()
    }

    #[test]
    fn test_skipped_names_gate() {
        let failed = GateResult::new("price_sanity", GateKind::Blocking, false, "price missing");
        let entry = LedgerEntry::skipped(&signal(), &failed);
        assert_eq!(entry.status, LedgerStatus::Skipped);
        assert!(entry.notes.contains("price_sanity"));
        assert_eq!(entry.quantity, Decimal::ZERO);
    }

    #[test]
    fn test_trade_decision_is_executed() {
        let decision = Decision {
            action: DecisionAction::Sell,
            reason: "divergence confirmed".into(),
            source: DecisionSource::RemoteAuthority,
        };
        let entry = LedgerEntry::decided(&signal(), &decision, dec!(2));
        assert_eq!(entry.status, LedgerStatus::Executed);
        assert_eq!(entry.signal_type, "SELL");
        assert_eq!(entry.quantity, dec!(2));
        assert_eq!(entry.price, dec!(65000));
    }

    #[test]
    fn test_hold_decision_has_no_quantity() {
        let decision = Decision::fallback("timeout");
        let entry = LedgerEntry::decided(&signal(), &decision, dec!(2));
        assert_eq!(entry.status, LedgerStatus::Hold);
        assert_eq!(entry.quantity, Decimal::ZERO);
    }
}
