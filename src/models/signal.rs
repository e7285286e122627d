use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionHint {
    Buy,
    Sell,
    Unknown,
}

impl ActionHint {
    /// Case-insensitive; anything other than buy/sell maps to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => ActionHint::Buy,
            "SELL" | "SHORT" => ActionHint::Sell,
            _ => ActionHint::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionHint::Buy => "BUY",
            ActionHint::Sell => "SELL",
            ActionHint::Unknown => "UNKNOWN",
        }
    }
}

/// One inbound alert. Built once by the intake and only ever borrowed afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub symbol: String,
    pub action: ActionHint,
    pub price: Option<Decimal>,
    /// Full payload as sent by the provider, recognized fields included.
    pub fields: Map<String, Value>,
}

impl Signal {
    /// Parse a raw request body.
    pub fn from_payload(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(fields) = value else {
            return Err(ValidationError::NotAnObject);
        };
        Self::from_fields(fields)
    }

    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ValidationError> {
        let symbol = match fields.get("symbol") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "symbol",
                    expected: "string",
                })
            }
        };

        let action = match fields.get("action") {
            None | Some(Value::Null) => ActionHint::Unknown,
            Some(Value::String(s)) => ActionHint::parse(s),
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "action",
                    expected: "string",
                })
            }
        };

        let price = match fields.get("price") {
            None | Some(Value::Null) => None,
            Some(v) => Some(decimal_field(v).ok_or_else(|| ValidationError::BadPrice(v.to_string()))?),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            symbol,
            action,
            price,
            fields,
        })
    }

    /// Optional numeric field from the opaque part of the payload.
    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        self.fields.get(key).and_then(decimal_field)
    }

    pub fn display_symbol(&self) -> &str {
        if self.symbol.is_empty() {
            "N/A"
        } else {
            &self.symbol
        }
    }
}

/// Numbers and numeric strings both occur in alert templates.
fn decimal_field(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
