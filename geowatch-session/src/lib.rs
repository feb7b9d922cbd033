//! Per-(engine, account) browser session persistence.
//!
//! A session is the opaque storage state of a browser context — cookies plus
//! local/session storage — captured after a successful crawl so later runs
//! skip Cloudflare and login walls. Files live at
//! `<session_dir>/<engine>_<account>.json` and are replaced atomically.
//! A blob older than the TTL is logically absent.

use chrono::{DateTime, Duration, Utc};
use geowatch_core::{Engine, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_TTL_HOURS: u64 = 24;
pub const DEFAULT_ACCOUNT: &str = "default";

/// On-disk envelope. `written_at` is the freshness anchor; the state itself
/// is opaque to everything outside the browser layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionEnvelope {
    written_at: DateTime<Utc>,
    state: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ttl_hours(dir, DEFAULT_TTL_HOURS)
    }

    pub fn with_ttl_hours(dir: impl Into<PathBuf>, ttl_hours: u64) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::hours(ttl_hours as i64),
        }
    }

    pub fn path_for(&self, engine: Engine, account: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", engine.as_str(), account))
    }

    /// Load the stored state, or `None` when absent, unreadable, or older
    /// than the TTL.
    pub async fn load(&self, engine: Engine, account: &str) -> Option<serde_json::Value> {
        let path = self.path_for(engine, account);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        let envelope: SessionEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%engine, account, %err, "discarding unparsable session file");
                return None;
            }
        };

        if Utc::now() - envelope.written_at >= self.ttl {
            debug!(%engine, account, "session file is past its TTL");
            return None;
        }

        debug!(%engine, account, "loaded warm session");
        Some(envelope.state)
    }

    /// Write the state atomically: temp file in the same directory, then
    /// rename. A concurrent `load` sees either the old blob or the new one,
    /// never a partial write.
    pub async fn save(&self, engine: Engine, account: &str, state: serde_json::Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let envelope = SessionEnvelope {
            written_at: Utc::now(),
            state,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let path = self.path_for(engine, account);
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(%engine, account, "saved session");
        Ok(())
    }

    /// Remove the blob. Removing an absent blob is fine.
    pub async fn clear(&self, engine: Engine, account: &str) -> Result<()> {
        let path = self.path_for(engine, account);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
