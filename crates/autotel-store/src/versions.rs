use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use autotel_domain::{ConfigManifest, ConfigVersionRecord};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::error::StoreError;
use crate::layout::DataLayout;

/// How many version records are kept on disk. The previous successful
/// version must always survive for rollback, so this can never go below 2.
pub const DEFAULT_RETENTION: usize = 5;

/// Persistence for applied configuration versions and the verified manifest
/// cache. The orchestrator is the only writer; the supervisor and the API
/// read.
#[async_trait]
pub trait VersionStore: Send + Sync + 'static {
    /// Persist a version's config bytes and its record.
    async fn record_version(
        &self,
        record: &ConfigVersionRecord,
        config_bytes: &[u8],
    ) -> Result<(), StoreError>;

    async fn get_record(&self, version: u64) -> Result<Option<ConfigVersionRecord>, StoreError>;

    /// All records, ascending by version.
    async fn list_records(&self) -> Result<Vec<ConfigVersionRecord>, StoreError>;

    async fn latest_record(&self) -> Result<Option<ConfigVersionRecord>, StoreError> {
        Ok(self.list_records().await?.into_iter().last())
    }

    async fn read_version_bytes(&self, version: u64) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace `current.yaml` (write-temp-then-rename).
    async fn write_current(&self, bytes: &[u8]) -> Result<(), StoreError>;

    async fn read_current(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Persist a manifest that already passed signature verification.
    /// Unverified manifests must never reach this method.
    async fn cache_manifest(&self, manifest: &ConfigManifest) -> Result<(), StoreError>;

    async fn load_cached_manifest(&self) -> Result<Option<ConfigManifest>, StoreError>;

    /// Drop version records beyond `keep` most recent. Returns the evicted
    /// version numbers.
    async fn gc(&self, keep: usize) -> Result<Vec<u64>, StoreError>;
}

// ── Filesystem implementation ─────────────────────────────────────────────────

pub struct FsVersionStore {
    layout: DataLayout,
}

impl FsVersionStore {
    pub fn new(layout: DataLayout) -> Self {
        FsVersionStore { layout }
    }

    async fn read_optional(&self, path: std::path::PathBuf) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

#[async_trait]
impl VersionStore for FsVersionStore {
    async fn record_version(
        &self,
        record: &ConfigVersionRecord,
        config_bytes: &[u8],
    ) -> Result<(), StoreError> {
        let config_path = self.layout.version_config(record.version);
        write_atomic(&config_path, config_bytes).await?;

        let meta_path = self.layout.version_meta(record.version);
        let meta = serde_json::to_vec_pretty(record)?;
        write_atomic(&meta_path, &meta).await?;

        debug!(version = record.version, hash = %record.hash, "recorded config version");
        Ok(())
    }

    async fn get_record(&self, version: u64) -> Result<Option<ConfigVersionRecord>, StoreError> {
        match self.read_optional(self.layout.version_meta(version)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_records(&self) -> Result<Vec<ConfigVersionRecord>, StoreError> {
        let dir = self.layout.versions_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut records = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&dir, e))? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".meta.json") else { continue };
            let Ok(version) = stem.parse::<u64>() else { continue };
            if let Some(record) = self.get_record(version).await? {
                records.insert(version, record);
            }
        }
        Ok(records.into_values().collect())
    }

    async fn read_version_bytes(&self, version: u64) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_optional(self.layout.version_config(version)).await
    }

    async fn write_current(&self, bytes: &[u8]) -> Result<(), StoreError> {
        write_atomic(&self.layout.current_config(), bytes).await
    }

    async fn read_current(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_optional(self.layout.current_config()).await
    }

    async fn cache_manifest(&self, manifest: &ConfigManifest) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.layout.manifest_cache(), &bytes).await
    }

    async fn load_cached_manifest(&self) -> Result<Option<ConfigManifest>, StoreError> {
        match self.read_optional(self.layout.manifest_cache()).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(manifest) => Ok(Some(manifest)),
                Err(e) => {
                    // A corrupt cache is discarded, not fatal.
                    warn!(error = %e, "manifest cache unreadable, ignoring");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn gc(&self, keep: usize) -> Result<Vec<u64>, StoreError> {
        let keep = keep.max(2);
        let records = self.list_records().await?;
        if records.len() <= keep {
            return Ok(Vec::new());
        }

        let evict_count = records.len() - keep;
        let mut evicted = Vec::with_capacity(evict_count);
        for record in records.into_iter().take(evict_count) {
            for path in
                [self.layout.version_config(record.version), self.layout.version_meta(record.version)]
            {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StoreError::io(&path, e)),
                }
            }
            evicted.push(record.version);
        }
        debug!(evicted = ?evicted, "garbage collected config versions");
        Ok(evicted)
    }
}

// ── In-memory implementation ──────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    records: BTreeMap<u64, (ConfigVersionRecord, Vec<u8>)>,
    current: Option<Vec<u8>>,
    manifest: Option<ConfigManifest>,
}

/// In-memory [`VersionStore`]. All data is lost on process exit; suitable
/// for tests.
#[derive(Clone, Default)]
pub struct InMemoryVersionStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn record_version(
        &self,
        record: &ConfigVersionRecord,
        config_bytes: &[u8],
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.records.insert(record.version, (record.clone(), config_bytes.to_vec()));
        Ok(())
    }

    async fn get_record(&self, version: u64) -> Result<Option<ConfigVersionRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.records.get(&version).map(|(r, _)| r.clone()))
    }

    async fn list_records(&self) -> Result<Vec<ConfigVersionRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.records.values().map(|(r, _)| r.clone()).collect())
    }

    async fn read_version_bytes(&self, version: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.records.get(&version).map(|(_, b)| b.clone()))
    }

    async fn write_current(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.write().await.current = Some(bytes.to_vec());
        Ok(())
    }

    async fn read_current(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().await.current.clone())
    }

    async fn cache_manifest(&self, manifest: &ConfigManifest) -> Result<(), StoreError> {
        self.inner.write().await.manifest = Some(manifest.clone());
        Ok(())
    }

    async fn load_cached_manifest(&self) -> Result<Option<ConfigManifest>, StoreError> {
        Ok(self.inner.read().await.manifest.clone())
    }

    async fn gc(&self, keep: usize) -> Result<Vec<u64>, StoreError> {
        let keep = keep.max(2);
        let mut guard = self.inner.write().await;
        if guard.records.len() <= keep {
            return Ok(Vec::new());
        }
        let evict_count = guard.records.len() - keep;
        let evicted: Vec<u64> = guard.records.keys().take(evict_count).copied().collect();
        for version in &evicted {
            guard.records.remove(version);
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotel_domain::{ConfigSource, GeneratedConfig};

    fn generated(content: &str) -> GeneratedConfig {
        GeneratedConfig::new(content.as_bytes().to_vec(), vec!["common/hostmetrics".into()], vec![])
    }

    async fn fs_store() -> (tempfile::TempDir, FsVersionStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure().await.unwrap();
        (dir, FsVersionStore::new(layout))
    }

    #[tokio::test]
    async fn record_and_read_back_round_trips() {
        let (_dir, store) = fs_store().await;
        let gen = generated("receivers: {}\n");
        let record = ConfigVersionRecord::new(1, &gen, ConfigSource::Initial);

        store.record_version(&record, &gen.config_bytes).await.unwrap();

        let loaded = store.get_record(1).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        let bytes = store.read_version_bytes(1).await.unwrap().unwrap();
        assert_eq!(bytes, gen.config_bytes);
    }

    #[tokio::test]
    async fn list_records_is_ascending() {
        let (_dir, store) = fs_store().await;
        for v in [3u64, 1, 2] {
            let gen = generated(&format!("v: {v}\n"));
            store
                .record_version(&ConfigVersionRecord::new(v, &gen, ConfigSource::Auto), &gen.config_bytes)
                .await
                .unwrap();
        }
        let versions: Vec<u64> =
            store.list_records().await.unwrap().iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(store.latest_record().await.unwrap().unwrap().version, 3);
    }

    #[tokio::test]
    async fn gc_keeps_most_recent_and_never_below_two() {
        let (_dir, store) = fs_store().await;
        for v in 1u64..=6 {
            let gen = generated(&format!("v: {v}\n"));
            store
                .record_version(&ConfigVersionRecord::new(v, &gen, ConfigSource::Auto), &gen.config_bytes)
                .await
                .unwrap();
        }

        let evicted = store.gc(3).await.unwrap();
        assert_eq!(evicted, vec![1, 2, 3]);
        let remaining: Vec<u64> =
            store.list_records().await.unwrap().iter().map(|r| r.version).collect();
        assert_eq!(remaining, vec![4, 5, 6]);

        // keep=0 is clamped to the retention floor of 2.
        let evicted = store.gc(0).await.unwrap();
        assert_eq!(evicted, vec![4]);
        assert_eq!(store.list_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn current_config_write_is_atomic_replace() {
        let (_dir, store) = fs_store().await;
        store.write_current(b"a: 1\n").await.unwrap();
        store.write_current(b"a: 2\n").await.unwrap();
        assert_eq!(store.read_current().await.unwrap().unwrap(), b"a: 2\n");
    }

    #[tokio::test]
    async fn manifest_cache_round_trips_and_survives_corruption() {
        use chrono::Utc;
        let (dir, store) = fs_store().await;
        let manifest = ConfigManifest {
            version: "2024-02-01".into(),
            integrations: vec![],
            global_variables: Default::default(),
            signature: "sig".into(),
            signed_at: Utc::now(),
            issuer: "config-service".into(),
        };
        store.cache_manifest(&manifest).await.unwrap();
        assert_eq!(store.load_cached_manifest().await.unwrap().unwrap().version, "2024-02-01");

        // Corrupt cache is discarded, not an error.
        std::fs::write(dir.path().join("cache/last_manifest.json"), b"{not json").unwrap();
        assert!(store.load_cached_manifest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_store_matches_contract() {
        let store = InMemoryVersionStore::new();
        let gen = generated("x: 1\n");
        store
            .record_version(&ConfigVersionRecord::new(1, &gen, ConfigSource::Initial), &gen.config_bytes)
            .await
            .unwrap();
        assert_eq!(store.latest_record().await.unwrap().unwrap().version, 1);
        assert!(store.read_version_bytes(1).await.unwrap().is_some());
        assert!(store.get_record(9).await.unwrap().is_none());
    }
}
