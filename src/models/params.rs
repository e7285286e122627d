use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder prefix shipped in default documents; treated as unset.
const PLACEHOLDER_PREFIX: &str = "YOUR_";

/// Contents of `connections.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub webhook_url: String,
    pub decision_api_key: String,
    pub openai_api_key: String,
    pub notify_webhook: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Contents of `trading_params.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingParams {
    pub account_size: f64,   // Account equity in quote currency (e.g. 100000)
    pub risk_per_trade: f64, // Fraction of equity risked per trade (e.g. 0.02)
    pub max_daily_risk: f64, // Fraction of equity risked per day (e.g. 0.05)
    pub min_win_rate: f64,   // (e.g. 0.55)
    pub min_rr_ratio: f64,   // Minimum reward:risk for the advisory gate (e.g. 2.0)
    pub order_quantity: f64, // Quantity recorded for executed decisions
    pub allowed_symbols: Vec<String>, // Empty = every symbol allowed
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            webhook_url: "http://0.0.0.0:8000/webhook/tradingview".into(),
            decision_api_key: "YOUR_DECISION_API_KEY".into(),
            openai_api_key: "YOUR_OPENAI_API_KEY".into(),
            notify_webhook: "YOUR_NOTIFY_WEBHOOK_URL".into(),
            extra: BTreeMap::new(),
        }
    }
}

impl ConnectionSettings {
    /// Bearer credential for the decision authority, if one is really set.
    pub fn decision_credential(&self) -> Option<&str> {
        let key = self.decision_api_key.trim();
        if key.is_empty() || key.starts_with(PLACEHOLDER_PREFIX) {
            None
        } else {
            Some(key)
        }
    }
}

impl Default for TradingParams {
    fn default() -> Self {
        Self {
            account_size: 100_000.0,
            risk_per_trade: 0.02,
            max_daily_risk: 0.05,
            min_win_rate: 0.55,
            min_rr_ratio: 2.0,
            order_quantity: 1.0,
            allowed_symbols: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl TradingParams {
    pub fn allows_symbol(&self, symbol: &str) -> bool {
        self.allowed_symbols.is_empty()
            || self
                .allowed_symbols
                .iter()
                .any(|s| s.eq_ignore_ascii_case(symbol))
    }
}

/// Immutable view of both documents. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub connections: ConnectionSettings,
    pub trading: TradingParams,
}

impl ConfigSnapshot {
    pub fn new(connections: ConnectionSettings, trading: TradingParams) -> Self {
        Self {
            version: 1,
            connections,
            trading,
        }
    }

    pub fn same_content(&self, other: &ConfigSnapshot) -> bool {
        self.connections == other.connections && self.trading == other.trading
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::new(ConnectionSettings::default(), TradingParams::default())
    }
}
