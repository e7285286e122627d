use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionAction {
    Buy,
    Sell,
    Hold,
}

impl DecisionAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(DecisionAction::Buy),
            "SELL" => Some(DecisionAction::Sell),
            "HOLD" => Some(DecisionAction::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Buy => "BUY",
            DecisionAction::Sell => "SELL",
            DecisionAction::Hold => "HOLD",
        }
    }

    pub fn is_trade(&self) -> bool {
        !matches!(self, DecisionAction::Hold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    LocalDefault,
    RemoteAuthority,
    ErrorFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reason: String,
    pub source: DecisionSource,
}

impl Decision {
    pub fn hold(source: DecisionSource, reason: impl Into<String>) -> Self {
        Self {
            action: DecisionAction::Hold,
            reason: reason.into(),
            source,
        }
    }

    /// Remote call failed in some way; uncertainty resolves to inaction.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self::hold(DecisionSource::ErrorFallback, reason)
    }
}
