//! R2 client implementation.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Durable reference to an uploaded object.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    /// Object key in the bucket
    pub key: String,
    /// Byte size at upload time
    pub size_bytes: u64,
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    /// Upload a local file, returning its durable reference.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<ObjectRef> {
        let path = path.as_ref();
        let size_bytes = tokio::fs::metadata(path).await?.len();
        debug!("Uploading {} ({} bytes) to {}", path.display(), size_bytes, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(ObjectRef {
            key: key.to_string(),
            size_bytes,
        })
    }

    /// Download an object to a local file.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Downloading {} to {}", key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        tokio::fs::write(path, bytes).await?;

        info!("Downloaded {} to {}", key, path.display());
        Ok(())
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    /// Delete multiple objects.
    pub async fn delete_objects(&self, keys: &[String]) -> StorageResult<u32> {
        if keys.is_empty() {
            return Ok(0);
        }

        debug!("Deleting {} objects", keys.len());

        let objects: StorageResult<Vec<_>> = keys
            .iter()
            .map(|k| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StorageError::delete_failed(e.to_string()))
            })
            .collect();

        let delete = aws_sdk_s3::types::Delete::builder()
            .set_objects(Some(objects?))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        info!("Deleted {} objects", keys.len());
        Ok(keys.len() as u32)
    }

    /// List objects with a prefix.
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            if let Some(ref contents) = response.contents {
                for obj in contents {
                    objects.push(ObjectInfo {
                        key: obj.key.clone().unwrap_or_default(),
                        size_bytes: obj.size.unwrap_or(0) as u64,
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// Delete every object belonging to a video.
    pub async fn delete_video_objects(&self, video_id: &str) -> StorageResult<u32> {
        let prefix = crate::keys::video_prefix(video_id);
        let objects = self.list_objects(&prefix).await?;

        if objects.is_empty() {
            info!("No objects found to delete for video {}", video_id);
            return Ok(0);
        }

        let keys: Vec<_> = objects.into_iter().map(|o| o.key).collect();
        self.delete_objects(&keys).await
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
}
