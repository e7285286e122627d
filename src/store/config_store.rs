use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::models::params::{ConfigSnapshot, ConnectionSettings, TradingParams};

pub const CONNECTIONS_DOC: &str = "connections.json";
pub const TRADING_PARAMS_DOC: &str = "trading_params.json";

/// Owns the active configuration snapshot.
///
/// Readers take an `Arc` of the current snapshot and keep it for as long as
/// they need; `reload` builds a complete new snapshot before swapping it in,
/// so nobody ever sees half of an update.
///
/// A missing document falls back to its default contents. A malformed
/// document is reported and the previous snapshot stays active.
pub struct ConfigStore {
    dir: PathBuf,
    active: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Load both documents from `dir`. Never fails: a bad document at
    /// startup is logged and defaults are used until a reload succeeds.
    pub async fn open(dir: impl Into<PathBuf>) -> Self {
        let store = Self {
            dir: dir.into(),
            active: RwLock::new(Arc::new(ConfigSnapshot::default())),
        };

        match store.load().await {
            Ok(snapshot) => *store.active.write().await = Arc::new(snapshot),
            Err(e) => error!("Config load failed, using defaults: {e}"),
        }

        store
    }

    /// Write default documents for any that do not exist yet.
    pub async fn ensure_defaults(dir: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        write_default_if_absent(&dir.join(CONNECTIONS_DOC), &ConnectionSettings::default()).await?;
        write_default_if_absent(&dir.join(TRADING_PARAMS_DOC), &TradingParams::default()).await?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Current snapshot.
    pub async fn current(&self) -> Arc<ConfigSnapshot> {
        self.active.read().await.clone()
    }

    /// Read both documents into a fresh snapshot without activating it.
    pub async fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        let connections =
            or_default(read_document::<ConnectionSettings>(&self.document_path(CONNECTIONS_DOC)).await)?;
        let trading =
            or_default(read_document::<TradingParams>(&self.document_path(TRADING_PARAMS_DOC)).await)?;
        Ok(ConfigSnapshot::new(connections, trading))
    }

    /// Re-read the documents and atomically replace the active snapshot.
    ///
    /// Unchanged content returns the active snapshot as is; the version only
    /// moves when something actually changed.
    pub async fn reload(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let fresh = match self.load().await {
            Ok(s) => s,
            Err(e) => {
                error!("Config reload rejected, keeping previous snapshot: {e}");
                return Err(e);
            }
        };

        let mut active = self.active.write().await;
        if active.same_content(&fresh) {
            return Ok(active.clone());
        }

        let next = Arc::new(ConfigSnapshot {
            version: active.version + 1,
            ..fresh
        });
        info!("Config reloaded: version {} -> {}", active.version, next.version);
        *active = next.clone();
        Ok(next)
    }
}

async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn or_default<T: Default>(result: Result<T, ConfigError>) -> Result<T, ConfigError> {
    match result {
        Err(ConfigError::Missing(path)) => {
            warn!("Config document {} not found, using defaults", path.display());
            Ok(T::default())
        }
        other => other,
    }
}

async fn write_default_if_absent<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await?;
    warn!(
        "Created default config document {}; edit it to set real credentials and parameters",
        path.display()
    );
    Ok(())
}
