//! Object-storage upload of local artifacts.
//!
//! Every regular file in a directory is put into a bucket keyed by its file
//! name. Subdirectories are not descended into.

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::StorageConfig;
use crate::error::{EtlError, Result};

/// One uploaded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedObject {
    pub source: PathBuf,
    pub key: String,
    pub bytes: u64,
}

/// Outcome of uploading one directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReport {
    pub bucket: String,
    pub objects: Vec<UploadedObject>,
    pub duration_ms: u64,
}

impl UploadReport {
    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.bytes).sum()
    }
}

/// Puts local files into one bucket.
pub struct ArtifactUploader {
    bucket: String,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ArtifactUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ArtifactUploader<{}>", self.bucket)
    }
}

impl ArtifactUploader {
    /// Uploader backed by an existing store.
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
        }
    }

    /// Uploader for an S3 bucket.
    ///
    /// Explicit keys in `config` take precedence; otherwise credentials come
    /// from the standard AWS environment variables.
    pub fn s3(config: &StorageConfig, bucket: &str) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        Ok(Self::new(bucket, store))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload every regular file in `dir`, in file name order.
    ///
    /// Stops at the first failed put; objects already written stay.
    pub async fn upload_dir(&self, dir: &Path) -> Result<UploadReport> {
        let start = Instant::now();
        info!("Uploading {} to bucket {}", dir.display(), self.bucket);

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut objects = Vec::with_capacity(files.len());
        for path in files {
            objects.push(self.upload_file(&path).await?);
        }

        info!(
            "Uploaded {} files to bucket {}",
            objects.len(),
            self.bucket
        );
        Ok(UploadReport {
            bucket: self.bucket.clone(),
            objects,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn upload_file(&self, path: &Path) -> Result<UploadedObject> {
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                EtlError::Config(format!("file name is not valid UTF-8: {}", path.display()))
            })?
            .to_string();

        let data = tokio::fs::read(path).await?;
        let bytes = data.len() as u64;

        info!("Uploading: {} to {}/{}", path.display(), self.bucket, key);
        let location = ObjectPath::from(key.as_str());
        self.store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|source| {
                error!("Error: uploading {}: {}", key, source);
                EtlError::Upload {
                    file: path.display().to_string(),
                    source,
                }
            })?;

        Ok(UploadedObject {
            source: path.to_path_buf(),
            key,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_dir_puts_files_by_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b_visa.csv"), "code,visa\n1,Business\n").unwrap();
        std::fs::write(dir.path().join("a_airport.csv"), "ident\nKLAX\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("skip.csv"), "x").unwrap();

        let store = Arc::new(InMemory::new());
        let uploader = ArtifactUploader::new("misc-data", store.clone());
        let report = uploader.upload_dir(dir.path()).await.unwrap();

        let keys: Vec<&str> = report.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a_airport.csv", "b_visa.csv"]);
        assert_eq!(report.bucket, "misc-data");
        assert_eq!(report.total_bytes(), 11 + 21);

        let stored = store
            .get(&ObjectPath::from("b_visa.csv"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&stored[..], b"code,visa\n1,Business\n");
        assert!(store.get(&ObjectPath::from("skip.csv")).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_dir_uploads_nothing() {
        let dir = TempDir::new().unwrap();
        let uploader = ArtifactUploader::new("empty", Arc::new(InMemory::new()));
        let report = uploader.upload_dir(dir.path()).await.unwrap();
        assert!(report.objects.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let uploader = ArtifactUploader::new("misc", Arc::new(InMemory::new()));
        let err = uploader
            .upload_dir(&dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Io(_)));
    }

    #[test]
    fn test_s3_builder_with_explicit_endpoint() {
        let config = StorageConfig {
            region: Some("us-west-2".into()),
            endpoint: Some("http://localhost:9000".into()),
            access_key_id: Some("key".into()),
            secret_access_key: Some("secret".into()),
            misc_data_bucket: "misc".into(),
            immigration_data_bucket: "immigration".into(),
        };
        let uploader = ArtifactUploader::s3(&config, &config.misc_data_bucket).unwrap();
        assert_eq!(uploader.bucket(), "misc");
    }
}
