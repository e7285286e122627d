use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::models::params::{ConnectionSettings, TradingParams};
use crate::store::config_store::{ConfigStore, CONNECTIONS_DOC, TRADING_PARAMS_DOC};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps the local config documents in step with a remote copy.
///
/// Each tick fetches `<base_url>/<document>`; when the remote content differs
/// from the local file and parses as the expected document, the local file is
/// overwritten and the store is reloaded. Runs on its own task and never
/// touches the request path.
pub struct ConfigRefresher {
    base_url: String,
    interval: Duration,
    store: Arc<ConfigStore>,
    http: reqwest::Client,
}

impl ConfigRefresher {
    pub fn new(base_url: String, interval: Duration, store: Arc<ConfigStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("Failed to build config refresh HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            interval,
            store,
            http,
        })
    }

    /// Spawn the refresh loop. The first refresh runs immediately.
    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.refresh_once().await {
                            Ok(0) => debug!("Config refresh: local documents up to date"),
                            Ok(n) => info!("Config refresh: {n} document(s) updated"),
                            Err(e) => error!("Config refresh failed: {e:#}"),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Check every document once. Returns how many were replaced.
    pub async fn refresh_once(&self) -> Result<usize> {
        let mut updated = 0;
        for name in [CONNECTIONS_DOC, TRADING_PARAMS_DOC] {
            match self.refresh_document(name).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => warn!("Skipping refresh of {name}: {e:#}"),
            }
        }

        if updated > 0 {
            self.store.reload().await?;
        }
        Ok(updated)
    }

    async fn refresh_document(&self, name: &str) -> Result<bool> {
        let remote = self.fetch(name).await?;
        let path = self.store.document_path(name);
        let local = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let (local_digest, remote_digest) = (fingerprint(&local), fingerprint(&remote));
        if local_digest == remote_digest {
            return Ok(false);
        }

        validate_document(name, &remote)?;
        tokio::fs::write(&path, &remote)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(
            "Updated {} from remote ({} -> {})",
            path.display(),
            &local_digest[..12],
            &remote_digest[..12]
        );
        Ok(true)
    }

    async fn fetch(&self, name: &str) -> Result<String, TransportError> {
        let url = format!("{}/{}", self.base_url, name);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body });
        }
        Ok(body)
    }
}

fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Refuse to install a remote document the store would reject on reload.
fn validate_document(name: &str, text: &str) -> Result<()> {
    match name {
        CONNECTIONS_DOC => {
            serde_json::from_str::<ConnectionSettings>(text)
                .with_context(|| format!("remote {name} is malformed"))?;
        }
        TRADING_PARAMS_DOC => {
            serde_json::from_str::<TradingParams>(text)
                .with_context(|| format!("remote {name} is malformed"))?;
        }
        _ => anyhow::bail!("unknown config document {name}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Router};

    async fn serve_remote(connections: &'static str) -> String {
        let app = Router::new().route(
            "/:name",
            get(move |Path(name): Path<String>| async move {
                match name.as_str() {
                    CONNECTIONS_DOC => (StatusCode::OK, connections.to_string()),
                    _ => (StatusCode::NOT_FOUND, String::new()),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(validate_document(CONNECTIONS_DOC, "{}").is_ok());
        assert!(validate_document(TRADING_PARAMS_DOC, "<html>").is_err());
        assert!(validate_document("other.json", "{}").is_err());
    }

    #[tokio::test]
    async fn test_refresh_overwrites_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        ConfigStore::ensure_defaults(dir.path()).await.unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).await);

        let base = serve_remote(r#"{"decision_api_key": "sk-remote"}"#).await;
        let refresher = ConfigRefresher::new(base, Duration::from_secs(3600), store.clone()).unwrap();

        let updated = refresher.refresh_once().await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            store.current().await.connections.decision_credential(),
            Some("sk-remote")
        );

        // Second pass sees identical content and changes nothing.
        let version = store.current().await.version;
        assert_eq!(refresher.refresh_once().await.unwrap(), 0);
        assert_eq!(store.current().await.version, version);
    }

    #[tokio::test]
    async fn test_malformed_remote_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        ConfigStore::ensure_defaults(dir.path()).await.unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).await);
        let before = std::fs::read_to_string(dir.path().join(CONNECTIONS_DOC)).unwrap();

        let base = serve_remote("not json at all").await;
        let refresher = ConfigRefresher::new(base, Duration::from_secs(3600), store).unwrap();

        assert_eq!(refresher.refresh_once().await.unwrap(), 0);
        let after = std::fs::read_to_string(dir.path().join(CONNECTIONS_DOC)).unwrap();
        assert_eq!(before, after);
    }
}
