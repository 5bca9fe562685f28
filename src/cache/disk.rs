//! Disk-backed cache store so a precache survives process restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheStore;
use crate::error::{Error, Result};
use crate::net::Response;

/// On-disk form of one cached response.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: String,
    stored_at: DateTime<Utc>,
}

/// Cache store laid out as one directory per cache and one JSON file per
/// entry, named by the SHA-256 of the request key.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    /// Creates a store rooted at `root`. Nothing is created until first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(Error::Cache(format!("invalid cache name: {name:?}")));
        }
        Ok(self.root.join(name))
    }

    fn entry_file(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{hex}.json")
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn cache_names(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.cache_dir(name)?).await?;
        Ok(())
    }

    async fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>> {
        let path = self.cache_dir(name)?.join(Self::entry_file(key));
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: StoredEntry = serde_json::from_str(&contents)?;
        // Digest collision or a hand-edited file: treat as a miss.
        if entry.key != key {
            log::warn!("Cache entry {} holds key {:?}, expected {key:?}", path.display(), entry.key);
            return Ok(None);
        }
        let body = BASE64
            .decode(entry.body)
            .map_err(|e| Error::Cache(format!("corrupt body in {}: {e}", path.display())))?;

        Ok(Some(Response {
            status: entry.status,
            status_text: entry.status_text,
            headers: entry.headers,
            body: body.into(),
        }))
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<()> {
        let dir = self.cache_dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;

        let entry = StoredEntry {
            key: key.to_string(),
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry)?;

        let path = dir.join(Self::entry_file(key));
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.cache_dir(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn disk_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let resp = Response::new(200, "OK", vec![0u8, 159, 146, 150])
            .with_header("content-type", "image/png");

        DiskCacheStore::new(dir.path())
            .put("vuanh-v1.0.0", "GET http://localhost/icon.png", resp.clone())
            .await
            .unwrap();

        let store = DiskCacheStore::new(dir.path());
        let loaded = store
            .lookup("vuanh-v1.0.0", "GET http://localhost/icon.png")
            .await
            .unwrap();
        assert_eq!(loaded, Some(resp));
        assert_eq!(store.cache_names().await.unwrap(), vec!["vuanh-v1.0.0"]);
    }

    #[tokio::test]
    async fn disk_store_missing_root_has_no_caches() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path().join("never-created"));
        assert_eq!(store.root(), dir.path().join("never-created"));
        assert!(store.cache_names().await.unwrap().is_empty());
        assert_eq!(store.lookup("any", "GET /").await.unwrap(), None);
        assert!(!store.delete("any").await.unwrap());
    }

    #[tokio::test]
    async fn disk_store_delete_removes_generation() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path());
        store.open("vuanh-v1").await.unwrap();
        store
            .put("vuanh-runtime", "GET /a", Response::new(200, "OK", "a"))
            .await
            .unwrap();

        assert!(store.delete("vuanh-v1").await.unwrap());
        assert_eq!(store.cache_names().await.unwrap(), vec!["vuanh-runtime"]);
    }

    #[tokio::test]
    async fn disk_store_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::new(dir.path());
        assert!(matches!(store.open("../x").await, Err(Error::Cache(_))));
        assert!(matches!(store.open("").await, Err(Error::Cache(_))));
    }

    #[test]
    fn entry_file_is_stable_hex() {
        let a = DiskCacheStore::entry_file("GET /");
        assert_eq!(a, DiskCacheStore::entry_file("GET /"));
        assert_ne!(a, DiskCacheStore::entry_file("GET /index.html"));
        assert_eq!(a.len(), 64 + ".json".len());
    }
}
