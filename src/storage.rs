use async_trait::async_trait;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, FileStoreKind, S3Settings};

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Physical home of attachment bytes. Keys are the attachment URLs derived by the rules module.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(&self, url: &str, bytes: &[u8]) -> Result<(), FileStoreError>;
    async fn delete(&self, url: &str) -> Result<(), FileStoreError>;
}

// ---------------- Local filesystem ----------------
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.root.join(url)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, url: &str, bytes: &[u8]) -> Result<(), FileStoreError> {
        let path = self.path_for(url);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FileStoreError::Other(format!("create dir {}: {e}", dir.display())))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write failed path={} err={e}", path.display());
            FileStoreError::Other(e.to_string())
        })
    }

    async fn delete(&self, url: &str) -> Result<(), FileStoreError> {
        let path = self.path_for(url);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FileStoreError::NotFound),
            Err(e) => Err(FileStoreError::Other(e.to_string())),
        }
    }
}

// ---------------- S3 (MinIO compatible) ----------------
pub struct S3FileStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3FileStore {
    pub async fn new(settings: &S3Settings) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()))
            .endpoint_url(endpoint);
        if !settings.access_key.is_empty() && !settings.secret_key.is_empty() {
            let creds = Credentials::new(
                settings.access_key.clone(),
                settings.secret_key.clone(),
                None,
                None,
                "static",
            );
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing: MinIO and local endpoints rarely have wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        let bucket = settings.bucket.clone();
        info!("Initialized S3/MinIO client for bucket '{bucket}'");

        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client })
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn save(&self, url: &str, bytes: &[u8]) -> Result<(), FileStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(url)
            .body(ByteStream::from(bytes.to_vec()))
            // served straight from the bucket, so give it a usable content type
            .content_type(
                infer::get(bytes)
                    .map(|t| t.mime_type().to_string())
                    .unwrap_or_else(|| "application/octet-stream".into()),
            );
        if let Err(e) = put.send().await {
            error!("put_object failed key={url} bucket={} err={e:?}", self.bucket);
            return Err(FileStoreError::Other(e.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), FileStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(url)
            .send()
            .await
            .map_err(|e| FileStoreError::Other(e.to_string()))?;
        Ok(())
    }
}

pub async fn build_file_store(cfg: &Config) -> anyhow::Result<Arc<dyn FileStore>> {
    Ok(match cfg.file_store {
        FileStoreKind::Local => Arc::new(LocalFileStore::new(cfg.storage_root.clone())),
        FileStoreKind::S3 => Arc::new(S3FileStore::new(&cfg.s3).await?),
    })
}
