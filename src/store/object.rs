// src/store/object.rs
//! Object stores for evidence media: a local directory and Supabase Storage.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::ObjectStore;
use crate::error::DependencyError;

const STAGE: &str = "object_store";

/// `incidents/<uuid>.<ext>`, keeping the caller's extension when it has one.
fn object_key(name: &str) -> String {
    let ext = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    format!("incidents/{}.{ext}", Uuid::new_v4())
}

/// Writes under a directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn store(&self, name: &str, _content_type: &str, bytes: &[u8]) -> Result<String, DependencyError> {
        let path = self.root.join(object_key(name));
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DependencyError::failed(STAGE, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DependencyError::failed(STAGE, e))?;
        Ok(format!("file://{}", path.display()))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Supabase Storage bucket; objects must be publicly readable for the returned URL to resolve.
pub struct SupabaseObjectStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl SupabaseObjectStore {
    pub fn new(base_url: &str, bucket: &str, service_key: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{key}", self.base_url, self.bucket)
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn store(&self, name: &str, content_type: &str, bytes: &[u8]) -> Result<String, DependencyError> {
        let key = object_key(name);
        let url = format!("{}/storage/v1/object/{}/{key}", self.base_url, self.bucket);
        self.http
            .post(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| DependencyError::failed(STAGE, e))?
            .error_for_status()
            .map_err(|e| DependencyError::failed(STAGE, e))?;
        Ok(self.public_url(&key))
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_sane_extensions() {
        assert!(object_key("photo.JPG").ends_with(".jpg"));
        assert!(object_key("no_extension").ends_with(".bin"));
        assert!(object_key("weird.p/ng").ends_with(".bin"));
        assert!(object_key("a.png").starts_with("incidents/"));
    }

    #[tokio::test]
    async fn local_store_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let url = store.store("scene.png", "image/png", b"\x89PNG").await.unwrap();
        let path = url.strip_prefix("file://").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"\x89PNG");
    }

    #[test]
    fn supabase_public_url_shape() {
        let s = SupabaseObjectStore::new("https://proj.supabase.co/", "incident-images", "k".into());
        assert_eq!(
            s.public_url("incidents/x.jpg"),
            "https://proj.supabase.co/storage/v1/object/public/incident-images/incidents/x.jpg"
        );
    }
}
