use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Filesystem layout under the agent's data directory:
///
/// ```text
/// <data_dir>/
///   config/
///     current.yaml
///     versions/<n>.yaml
///     versions/<n>.meta.json
///   cache/
///     last_manifest.json
///   runtime/
///     supervisor.pid
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DataLayout { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_dir(&self) -> PathBuf {
        self.data_dir.join("config")
    }

    pub fn current_config(&self) -> PathBuf {
        self.config_dir().join("current.yaml")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.config_dir().join("versions")
    }

    pub fn version_config(&self, version: u64) -> PathBuf {
        self.versions_dir().join(format!("{}.yaml", version))
    }

    pub fn version_meta(&self, version: u64) -> PathBuf {
        self.versions_dir().join(format!("{}.meta.json", version))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn manifest_cache(&self) -> PathBuf {
        self.cache_dir().join("last_manifest.json")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.data_dir.join("runtime")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir().join("supervisor.pid")
    }

    /// Create every directory of the layout.
    pub async fn ensure(&self) -> Result<(), StoreError> {
        for dir in
            [self.config_dir(), self.versions_dir(), self.cache_dir(), self.runtime_dir()]
        {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn write_pid(&self, pid: u32) -> Result<(), StoreError> {
        let path = self.pid_file();
        std::fs::write(&path, format!("{}\n", pid)).map_err(|e| StoreError::io(&path, e))
    }

    pub fn remove_pid(&self) -> Result<(), StoreError> {
        let path = self.pid_file();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
