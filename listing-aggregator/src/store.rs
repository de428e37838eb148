use crate::types::{AggregatorError, AnnouncementMeta, AnnouncementRecord, Result, StoredArtifact};
use crate::utils::hash::sanitize_key;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Write-once store of per-announcement artifacts under
/// `<root>/<exchange>/<exchange>_<key>.json`.
///
/// An artifact on disk means the announcement is processed. Keys are claimed
/// under a process-wide lock before any work starts so two workers never
/// extract or write the same key.
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Exclusive right to write one artifact. Released on drop.
pub struct KeyClaim {
    path: PathBuf,
    exchange: String,
    key: String,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl KeyClaim {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyClaim {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.path);
    }
}

#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub path: PathBuf,
    pub artifact: StoredArtifact,
}

impl LoadedArtifact {
    /// Records with provenance filled in; placeholders yield nothing.
    pub fn records(&self) -> Vec<AnnouncementRecord> {
        match &self.artifact {
            StoredArtifact::Records(records) => records
                .iter()
                .cloned()
                .map(|mut record| {
                    record.provenance = Some(self.path.display().to_string());
                    record
                })
                .collect(),
            StoredArtifact::Placeholder(_) => Vec::new(),
        }
    }
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, exchange: &str, key: &str) -> PathBuf {
        let exchange = sanitize_key(&exchange.to_lowercase());
        let key = sanitize_key(key);
        self.root.join(&exchange).join(format!("{}_{}.json", exchange, key))
    }

    pub fn exists(&self, exchange: &str, key: &str) -> bool {
        self.artifact_path(exchange, key).exists()
    }

    /// Returns `None` when the key is already processed or held by another worker.
    pub fn claim(&self, exchange: &str, key: &str) -> Option<KeyClaim> {
        let path = self.artifact_path(exchange, key);
        let mut in_flight = self.in_flight.lock();

        if in_flight.contains(&path) || path.exists() {
            return None;
        }
        in_flight.insert(path.clone());

        Some(KeyClaim {
            path,
            exchange: exchange.to_string(),
            key: key.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub async fn write_records(&self, claim: &KeyClaim, records: Vec<AnnouncementRecord>) -> Result<PathBuf> {
        let count = records.len();
        let path = self.write_artifact(claim, &StoredArtifact::Records(records)).await?;
        info!("Stored {} records for {}/{} at {}", count, claim.exchange, claim.key, path.display());
        Ok(path)
    }

    pub async fn write_placeholder(&self, claim: &KeyClaim, meta: AnnouncementMeta) -> Result<PathBuf> {
        let meta = AnnouncementMeta {
            content: String::new(),
            ..meta
        };
        let path = self.write_artifact(claim, &StoredArtifact::Placeholder(meta)).await?;
        debug!("Stored placeholder for {}/{}", claim.exchange, claim.key);
        Ok(path)
    }

    /// Serializes in memory, writes a temp file next to the target, syncs it and renames it into place.
    async fn write_artifact(&self, claim: &KeyClaim, artifact: &StoredArtifact) -> Result<PathBuf> {
        let path = claim.path.clone();
        if tokio::fs::try_exists(&path).await? {
            return Err(AggregatorError::AlreadyExists {
                path: path.display().to_string(),
            });
        }

        let dir = path
            .parent()
            .ok_or_else(|| AggregatorError::General(format!("artifact path has no parent: {}", path.display())))?;
        tokio::fs::create_dir_all(dir).await?;

        let bytes = serde_json::to_vec_pretty(artifact)?;
        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(path)
    }

    /// Every readable artifact, ordered by path. Corrupt files are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<LoadedArtifact>> {
        let mut artifacts = Vec::new();
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(artifacts);
        }

        let mut exchanges = tokio::fs::read_dir(&self.root).await?;
        while let Some(exchange_dir) = exchanges.next_entry().await? {
            if !exchange_dir.file_type().await?.is_dir() {
                continue;
            }

            let mut files = tokio::fs::read_dir(exchange_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if !is_artifact_file(&path) {
                    continue;
                }

                match read_artifact(&path).await {
                    Ok(artifact) => artifacts.push(LoadedArtifact { path, artifact }),
                    Err(e) => warn!("Skipping unreadable artifact {}: {}", path.display(), e),
                }
            }
        }

        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(artifacts)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.load_all().await?.len())
    }
}

fn is_artifact_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden && path.extension().and_then(|e| e.to_str()) == Some("json")
}

async fn read_artifact(path: &Path) -> Result<StoredArtifact> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, EffectiveDate, MarketType};
    use tempfile::TempDir;

    fn meta() -> AnnouncementMeta {
        AnnouncementMeta {
            exchange: "binance".to_string(),
            title: "Binance Will List FOO".to_string(),
            url: "https://www.binance.com/en/support/announcement/abc".to_string(),
            release_time: None,
            content: "Binance will list FOO/USDT".to_string(),
        }
    }

    fn record() -> AnnouncementRecord {
        AnnouncementRecord {
            symbol: "FOO/USDT".to_string(),
            action: Action::Listing,
            market_type: MarketType::Spot,
            date: EffectiveDate::from_iso("2025-08-08"),
            exchange: "binance".to_string(),
            title: String::new(),
            url: String::new(),
            release_time: None,
            content: String::new(),
            provenance: None,
        }
    }

    #[test]
    fn unsafe_keys_are_hashed_into_file_names() {
        let store = ArtifactStore::new("/tmp/store");
        let path = store.artifact_path("Bybit", "https://announcements.bybit.com/x?y=1");
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("bybit_"));
        assert_eq!(name.len(), "bybit_".len() + 64 + ".json".len());
    }

    #[test]
    fn claims_are_exclusive_until_dropped() {
        let store = ArtifactStore::new("/tmp/store-claims");
        let first = store.claim("binance", "abc").unwrap();
        assert_eq!(first.exchange(), "binance");
        assert_eq!(first.key(), "abc");
        assert!(first.path().ends_with("binance/binance_abc.json"));
        assert!(store.claim("binance", "abc").is_none());
        drop(first);
        assert!(store.claim("binance", "abc").is_some());
    }

    #[tokio::test]
    async fn written_artifacts_block_new_claims_and_load_back() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let claim = store.claim("binance", "abc").unwrap();
        store.write_records(&claim, vec![record()]).await.unwrap();
        drop(claim);

        assert!(store.exists("binance", "abc"));
        assert!(store.claim("binance", "abc").is_none());

        let claim = store.claim("binance", "old").unwrap();
        store.write_placeholder(&claim, meta()).await.unwrap();
        assert!(store.write_placeholder(&claim, meta()).await.is_err());

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let records: Vec<_> = loaded.iter().flat_map(|a| a.records()).collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].provenance.as_deref().unwrap().ends_with("binance_abc.json"));

        let placeholder = loaded.iter().find_map(|a| match &a.artifact {
            StoredArtifact::Placeholder(m) => Some(m.clone()),
            _ => None,
        });
        assert_eq!(placeholder.unwrap().content, "");
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let exchange_dir = dir.path().join("okx");
        std::fs::create_dir_all(&exchange_dir).unwrap();
        std::fs::write(exchange_dir.join("okx_1.json"), b"{not json").unwrap();
        std::fs::write(exchange_dir.join(".pending.tmp"), b"[]").unwrap();

        let store = ArtifactStore::new(dir.path());
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
