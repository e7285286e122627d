use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::decision::DecisionClient;
use crate::error::TransportError;
use crate::models::decision::{Decision, DecisionAction, DecisionSource};
use crate::models::gate::GateResult;
use crate::models::params::{ConfigSnapshot, TradingParams};
use crate::models::signal::Signal;

/// HTTP client for an external decision service.
///
/// One POST per signal, bearer credential taken from the current config,
/// bounded by the client timeout. No retries: a failed call is a HOLD.
pub struct RemoteAuthority {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DecisionRequest<'a> {
    signal: &'a Map<String, Value>,
    advisory: &'a [GateResult],
    trading_params: &'a TradingParams,
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    #[serde(alias = "action")]
    decision: Option<String>,
    reason: Option<String>,
}

impl RemoteAuthority {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .context("Failed to build decision HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    async fn request(
        &self,
        credential: &str,
        signal: &Signal,
        advisory: &[GateResult],
        config: &ConfigSnapshot,
    ) -> Result<Decision, TransportError> {
        let body = DecisionRequest {
            signal: &signal.fields,
            advisory,
            trading_params: &config.trading,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body: text });
        }

        let parsed: DecisionResponse = serde_json::from_str(&text)
            .map_err(|e| TransportError::MalformedResponse(format!("{e}: {text}")))?;
        let raw_action = parsed
            .decision
            .ok_or_else(|| TransportError::MalformedResponse("missing decision".into()))?;
        let action = DecisionAction::parse(&raw_action).ok_or_else(|| {
            TransportError::MalformedResponse(format!("unknown decision {raw_action:?}"))
        })?;

        Ok(Decision {
            action,
            reason: parsed
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "no reason given".into()),
            source: DecisionSource::RemoteAuthority,
        })
    }
}

#[async_trait]
impl DecisionClient for RemoteAuthority {
    fn name(&self) -> &'static str {
        "remote_authority"
    }

    async fn decide(
        &self,
        signal: &Signal,
        advisory: &[GateResult],
        config: &ConfigSnapshot,
    ) -> Decision {
        let Some(credential) = config.connections.decision_credential() else {
            warn!("Decision API key not configured, holding {}", signal.display_symbol());
            return Decision::hold(DecisionSource::LocalDefault, "credential missing");
        };

        match self.request(credential, signal, advisory, config).await {
            Ok(decision) => {
                info!(
                    "Remote decision for {}: {} ({})",
                    signal.display_symbol(),
                    decision.action.as_str(),
                    decision.reason
                );
                decision
            }
            Err(e) => {
                error!("Decision request for {} failed: {e}", signal.display_symbol());
                Decision::fallback(format!("decision request failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::ConnectionSettings;
    use axum::{
        http::{header::AUTHORIZATION, HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/decision")
    }

    fn signal() -> Signal {
        Signal::from_payload(br#"{"symbol":"BTCUSD","action":"BUY","price":65000}"#).unwrap()
    }

    fn config_with_key(key: &str) -> ConfigSnapshot {
        ConfigSnapshot::new(
            ConnectionSettings {
                decision_api_key: key.into(),
                ..ConnectionSettings::default()
            },
            TradingParams::default(),
        )
    }

    fn client(endpoint: String) -> RemoteAuthority {
        RemoteAuthority::new(endpoint, Duration::from_millis(500)).unwrap()
    }

    fn assert_fallback(decision: &Decision) {
        assert_eq!(decision.action, DecisionAction::Hold);
        assert_eq!(decision.source, DecisionSource::ErrorFallback);
    }

    #[tokio::test]
    async fn test_remote_decision_with_bearer() {
        let app = Router::new().route(
            "/decision",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
                if auth != Some("Bearer sk-test") {
                    return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
                }
                let symbol = body["signal"]["symbol"].as_str().unwrap_or("").to_string();
                let has_params = body["trading_params"]["min_rr_ratio"].is_number();
                (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "decision": "BUY",
                        "reason": format!("{symbol} params={has_params}")
                    })),
                )
            }),
        );
        let endpoint = serve(app).await;

        let decision = client(endpoint)
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_eq!(decision.action, DecisionAction::Buy);
        assert_eq!(decision.source, DecisionSource::RemoteAuthority);
        assert_eq!(decision.reason, "BTCUSD params=true");
    }

    #[tokio::test]
    async fn test_missing_credential_skips_network() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/decision",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"decision": "BUY"}))
                }
            }),
        );
        let endpoint = serve(app).await;

        let decision = client(endpoint)
            .decide(&signal(), &[], &ConfigSnapshot::default())
            .await;
        assert_eq!(decision.action, DecisionAction::Hold);
        assert_eq!(decision.reason, "credential missing");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_error_falls_back() {
        let app = Router::new().route(
            "/decision",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
        );
        let decision = client(serve(app).await)
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_fallback(&decision);
        assert!(decision.reason.contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back() {
        let app = Router::new().route("/decision", post(|| async { "definitely not json" }));
        let decision = client(serve(app).await)
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_fallback(&decision);
    }

    #[tokio::test]
    async fn test_unknown_action_falls_back() {
        let app = Router::new().route(
            "/decision",
            post(|| async { Json(serde_json::json!({"action": "MAYBE", "reason": "?"})) }),
        );
        let decision = client(serve(app).await)
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_fallback(&decision);
        assert!(decision.reason.contains("MAYBE"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let app = Router::new().route(
            "/decision",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(serde_json::json!({"decision": "BUY"}))
            }),
        );
        let decision = client(serve(app).await)
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_fallback(&decision);
    }

    #[tokio::test]
    async fn test_connection_refused_falls_back() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let decision = client(format!("http://{addr}/decision"))
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_fallback(&decision);
    }

    #[tokio::test]
    async fn test_missing_reason_defaults() {
        let app = Router::new().route(
            "/decision",
            post(|| async { Json(serde_json::json!({"decision": "sell"})) }),
        );
        let decision = client(serve(app).await)
            .decide(&signal(), &[], &config_with_key("sk-test"))
            .await;
        assert_eq!(decision.action, DecisionAction::Sell);
        assert_eq!(decision.reason, "no reason given");
    }
}
