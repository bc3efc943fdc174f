//! Filesystem object store for raw document bytes.
//!
//! Stores objects under a base directory keyed by storage path, with
//! HMAC-signed time-limited read URLs for download handoff.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use docflow_core::{Error, ObjectStore, Result};

type HmacSha256 = Hmac<Sha256>;

/// Filesystem implementation of ObjectStore.
pub struct FilesystemStore {
    base_path: PathBuf,
    /// Secret for signed URL tokens.
    signing_key: Vec<u8>,
    /// Base URL prefix signed URLs are issued under.
    public_base: String,
}

impl FilesystemStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        signing_key: impl Into<Vec<u8>>,
        public_base: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            signing_key: signing_key.into(),
            public_base: public_base.into(),
        }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        // Reject traversal components in keys.
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(Error::InvalidInput(format!("invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(relative))
    }

    fn sign(&self, key: &str, expires: i64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| Error::Internal(format!("HMAC key error: {}", e)))?;
        mac.update(format!("{}:{}", key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a signed URL token issued by [`ObjectStore::signed_url`].
    pub fn verify_token(&self, key: &str, expires: i64, token: &str) -> Result<bool> {
        if expires < Utc::now().timestamp() {
            return Ok(false);
        }
        let expected = self.sign(key, expires)?;
        Ok(constant_time_eq(expected.as_bytes(), token.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        debug!(
            subsystem = "db",
            component = "storage",
            op = "put",
            key = %key,
            size = data.len(),
            "Storing object"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp sibling then rename so readers never see a
        // partial object.
        let tmp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&tmp_path, &full_path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::Storage(format!("object not found: {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: i64) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl_secs;
        let token = self.sign(key, expires)?;
        Ok(format!(
            "{}/{}?expires={}&token={}",
            self.public_base.trim_end_matches('/'),
            key,
            expires,
            token
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(dir: &Path) -> FilesystemStore {
        FilesystemStore::new(dir, b"test-signing-key".to_vec(), "http://localhost/files")
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = std::env::temp_dir().join(format!("docflow-store-{}", uuid::Uuid::new_v4()));
        let store = test_store(&dir);

        store.put("docs/a/file.pdf", b"content").await.unwrap();
        let data = store.get("docs/a/file.pdf").await.unwrap();
        assert_eq!(data, b"content");

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_get_missing_is_storage_error() {
        let dir = std::env::temp_dir().join(format!("docflow-store-{}", uuid::Uuid::new_v4()));
        let store = test_store(&dir);

        let err = store.get("missing/key").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = std::env::temp_dir().join(format!("docflow-store-{}", uuid::Uuid::new_v4()));
        let store = test_store(&dir);
        store.delete("never/existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_key_rejected() {
        let dir = std::env::temp_dir().join(format!("docflow-store-{}", uuid::Uuid::new_v4()));
        let store = test_store(&dir);

        let err = store.put("../escape", b"x").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_signed_url_verifies() {
        let dir = std::env::temp_dir().join(format!("docflow-store-{}", uuid::Uuid::new_v4()));
        let store = test_store(&dir);

        let url = store.signed_url("docs/a/file.pdf", 900).await.unwrap();
        let query = url.split('?').nth(1).unwrap();
        let mut expires = 0i64;
        let mut token = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "token" => token = v.to_string(),
                _ => {}
            }
        }

        assert!(store.verify_token("docs/a/file.pdf", expires, &token).unwrap());
        assert!(!store.verify_token("docs/b/other.pdf", expires, &token).unwrap());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let dir = std::env::temp_dir().join(format!("docflow-store-{}", uuid::Uuid::new_v4()));
        let store = test_store(&dir);

        let expires = Utc::now().timestamp() - 10;
        let token = store.sign("docs/a/file.pdf", expires).unwrap();
        assert!(!store.verify_token("docs/a/file.pdf", expires, &token).unwrap());
    }
}
