use anyhow::Context;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::filters::{Gate, GateVerdict};
use crate::models::gate::GateKind;
use crate::models::params::ConfigSnapshot;
use crate::models::signal::{ActionHint, Signal};

/// Rejects alerts whose action is neither buy nor sell.
pub struct ActionHintGate;

impl Gate for ActionHintGate {
    fn name(&self) -> &str {
        "action_hint"
    }

    fn kind(&self) -> GateKind {
        GateKind::Blocking
    }

    fn evaluate(&self, signal: &Signal, _config: &ConfigSnapshot) -> anyhow::Result<GateVerdict> {
        Ok(match signal.action {
            ActionHint::Buy | ActionHint::Sell => GateVerdict::pass(signal.action.as_str()),
            ActionHint::Unknown => GateVerdict::fail("action is not BUY or SELL"),
        })
    }
}

/// Price must be present and strictly positive.
pub struct PriceSanityGate;

impl Gate for PriceSanityGate {
    fn name(&self) -> &str {
        "price_sanity"
    }

    fn kind(&self) -> GateKind {
        GateKind::Blocking
    }

    fn evaluate(&self, signal: &Signal, _config: &ConfigSnapshot) -> anyhow::Result<GateVerdict> {
        Ok(match signal.price {
            None => GateVerdict::fail("price missing"),
            Some(p) if p <= Decimal::ZERO => GateVerdict::fail(format!("non-positive price {p}")),
            Some(p) => GateVerdict::pass(format!("price {p}")),
        })
    }
}

/// Symbol must be on the configured allowlist when one is set.
pub struct SymbolAllowlistGate;

impl Gate for SymbolAllowlistGate {
    fn name(&self) -> &str {
        "symbol_allowlist"
    }

    fn kind(&self) -> GateKind {
        GateKind::Blocking
    }

    fn evaluate(&self, signal: &Signal, config: &ConfigSnapshot) -> anyhow::Result<GateVerdict> {
        if signal.symbol.is_empty() {
            return Ok(GateVerdict::fail("symbol missing"));
        }
        Ok(if config.trading.allows_symbol(&signal.symbol) {
            GateVerdict::pass(format!("{} allowed", signal.symbol))
        } else {
            GateVerdict::fail(format!("{} not in allowed_symbols", signal.symbol))
        })
    }
}

/// Reward:risk of the alert's own stop/target against `min_rr_ratio`.
pub struct RewardRiskGate;

impl Gate for RewardRiskGate {
    fn name(&self) -> &str {
        "reward_risk"
    }

    fn kind(&self) -> GateKind {
        GateKind::Advisory
    }

    fn evaluate(&self, signal: &Signal, config: &ConfigSnapshot) -> anyhow::Result<GateVerdict> {
        let (Some(price), Some(stop), Some(target)) =
            (signal.price, signal.decimal("stop"), signal.decimal("target"))
        else {
            return Ok(GateVerdict::fail("no stop/target provided"));
        };

        let (risk, reward) = match signal.action {
            ActionHint::Buy => (price - stop, target - price),
            ActionHint::Sell => (stop - price, price - target),
            ActionHint::Unknown => return Ok(GateVerdict::fail("direction unknown")),
        };
        if risk <= Decimal::ZERO {
            return Ok(GateVerdict::fail("stop on the wrong side of price"));
        }

        let ratio = reward.checked_div(risk).context("reward:risk overflow")?;
        let min = Decimal::from_f64_retain(config.trading.min_rr_ratio).unwrap_or(Decimal::TWO);
        let detail = format!("rr={} (min {})", ratio.round_dp(2), min.round_dp(2));
        Ok(if ratio >= min {
            GateVerdict::pass(detail)
        } else {
            GateVerdict::fail(detail)
        })
    }
}

/// Risk budget per trade and the quantity it implies at the alert's stop.
pub struct PositionSizeGate;

impl Gate for PositionSizeGate {
    fn name(&self) -> &str {
        "position_size"
    }

    fn kind(&self) -> GateKind {
        GateKind::Advisory
    }

    fn evaluate(&self, signal: &Signal, config: &ConfigSnapshot) -> anyhow::Result<GateVerdict> {
        let params = &config.trading;
        if params.risk_per_trade > params.max_daily_risk {
            return Ok(GateVerdict::fail(format!(
                "risk_per_trade {} exceeds max_daily_risk {}",
                params.risk_per_trade, params.max_daily_risk
            )));
        }

        let budget = params.account_size * params.risk_per_trade;
        let (Some(price), Some(stop)) = (signal.price, signal.decimal("stop")) else {
            return Ok(GateVerdict::fail(format!(
                "no stop provided; risk budget {budget:.2}"
            )));
        };

        let distance = (price - stop).abs().to_f64().context("stop distance out of range")?;
        if distance == 0.0 {
            return Ok(GateVerdict::fail("stop equals price"));
        }
        let quantity = budget / distance;
        Ok(GateVerdict::pass(format!(
            "risk budget {budget:.2}, quantity {quantity:.4} at stop {stop}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::TradingParams;

    fn signal(body: &str) -> Signal {
        Signal::from_payload(body.as_bytes()).unwrap()
    }

    fn config() -> ConfigSnapshot {
        ConfigSnapshot::default()
    }

    #[test]
    fn test_action_hint() {
        let cfg = config();
        assert!(ActionHintGate.evaluate(&signal(r#"{"action":"buy"}"#), &cfg).unwrap().passed);
        assert!(!ActionHintGate.evaluate(&signal(r#"{"action":"flat"}"#), &cfg).unwrap().passed);
    }

    #[test]
    fn test_price_sanity() {
        let cfg = config();
        assert!(PriceSanityGate.evaluate(&signal(r#"{"price":1.5}"#), &cfg).unwrap().passed);
        assert!(!PriceSanityGate.evaluate(&signal(r#"{"price":0}"#), &cfg).unwrap().passed);
        assert!(!PriceSanityGate.evaluate(&signal(r#"{}"#), &cfg).unwrap().passed);
    }

    #[test]
    fn test_symbol_allowlist() {
        let mut cfg = config();
        let btc = signal(r#"{"symbol":"BTCUSD"}"#);
        assert!(SymbolAllowlistGate.evaluate(&btc, &cfg).unwrap().passed);

        cfg.trading = TradingParams {
            allowed_symbols: vec!["ETHUSD".into()],
            ..TradingParams::default()
        };
        let verdict = SymbolAllowlistGate.evaluate(&btc, &cfg).unwrap();
        assert!(!verdict.passed);
        assert!(verdict.detail.contains("BTCUSD"));
    }

    #[test]
    fn test_reward_risk_long() {
        let cfg = config();
        // risk 1000, reward 3000 -> 3.0 >= 2.0
        let s = signal(r#"{"action":"BUY","price":65000,"stop":64000,"target":68000}"#);
        let verdict = RewardRiskGate.evaluate(&s, &cfg).unwrap();
        assert!(verdict.passed, "{}", verdict.detail);
        assert!(verdict.detail.starts_with("rr=3"));

        // risk 1000, reward 1000 -> 1.0 < 2.0
        let s = signal(r#"{"action":"BUY","price":65000,"stop":64000,"target":66000}"#);
        assert!(!RewardRiskGate.evaluate(&s, &cfg).unwrap().passed);
    }

    #[test]
    fn test_reward_risk_short_and_missing() {
        let cfg = config();
        let s = signal(r#"{"action":"SELL","price":100,"stop":105,"target":80}"#);
        assert!(RewardRiskGate.evaluate(&s, &cfg).unwrap().passed);

        let s = signal(r#"{"action":"SELL","price":100,"stop":95,"target":80}"#);
        assert!(!RewardRiskGate.evaluate(&s, &cfg).unwrap().passed);

        let s = signal(r#"{"action":"SELL","price":100}"#);
        assert_eq!(
            RewardRiskGate.evaluate(&s, &cfg).unwrap().detail,
            "no stop/target provided"
        );
    }

    #[test]
    fn test_position_size() {
        let cfg = config();
        // budget 100000 * 0.02 = 2000, distance 1000 -> quantity 2
        let s = signal(r#"{"action":"BUY","price":65000,"stop":64000}"#);
        let verdict = PositionSizeGate.evaluate(&s, &cfg).unwrap();
        assert!(verdict.passed);
        assert!(verdict.detail.contains("quantity 2.0000"), "{}", verdict.detail);

        let s = signal(r#"{"action":"BUY","price":65000}"#);
        assert!(!PositionSizeGate.evaluate(&s, &cfg).unwrap().passed);
    }
}
