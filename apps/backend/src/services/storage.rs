//! S3-compatible object storage for audio artifacts.

use std::time::Duration;

use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client, Config,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Object storage service for audio and timing files.
pub struct StorageService {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl StorageService {
    /// Create a new storage service from environment variables.
    ///
    /// Required env vars:
    /// - S3_BUCKET: Bucket name
    /// - S3_REGION: Region (use "auto" for Cloudflare R2)
    /// - S3_ENDPOINT: Custom endpoint URL (required for R2)
    /// - S3_ACCESS_KEY: Access key ID
    /// - S3_SECRET_KEY: Secret access key
    pub async fn new() -> Result<Self, StorageError> {
        let bucket = std::env::var("S3_BUCKET")
            .map_err(|_| StorageError::Config("S3_BUCKET not set".to_string()))?;

        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string());

        let endpoint = std::env::var("S3_ENDPOINT").ok();

        let access_key = std::env::var("S3_ACCESS_KEY")
            .map_err(|_| StorageError::Config("S3_ACCESS_KEY not set".to_string()))?;

        let secret_key = std::env::var("S3_SECRET_KEY")
            .map_err(|_| StorageError::Config("S3_SECRET_KEY not set".to_string()))?;

        let credentials = Credentials::new(
            access_key,
            secret_key,
            None,  // session token
            None,  // expiry
            "env", // provider name
        );

        let mut config_builder = Config::builder()
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        if let Some(endpoint_url) = &endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        let config = config_builder.build();
        let client = Client::from_conf(config);

        Ok(Self {
            client,
            bucket,
            region,
            endpoint,
        })
    }

    /// Upload a file and return its object key.
    pub async fn upload_file(
        &self,
        key: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<String, StorageError> {
        let body = ByteStream::from(content.to_vec());

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        tracing::info!("Uploaded file to storage: {}", key);
        Ok(key.to_string())
    }

    /// Generate a time-limited signed GET URL for an object.
    pub async fn presigned_get_url(
        &self,
        key: &str,
        expiration: Duration,
    ) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(expiration)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    /// Resolve a URL for an object, preferring a signed URL.
    ///
    /// Fallback chain: signed URL, then the endpoint-relative public URL,
    /// then the canonical virtual-hosted URL. Each failed step is logged
    /// with its cause before moving on.
    pub async fn audio_url(&self, key: &str, expiration: Duration) -> String {
        match self.presigned_get_url(key, expiration).await {
            Ok(url) => return url,
            Err(e) => {
                tracing::warn!("Signed URL generation failed for {}: {}", key, e);
            }
        }

        match self.public_url(key) {
            Some(url) => url,
            None => {
                tracing::warn!(
                    "No custom endpoint configured for {}; falling back to canonical URL",
                    key
                );
                self.canonical_url(key)
            }
        }
    }

    /// Public URL relative to the configured endpoint, if any.
    fn public_url(&self, key: &str) -> Option<String> {
        self.endpoint
            .as_ref()
            .map(|endpoint| format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key))
    }

    /// Canonical virtual-hosted URL.
    fn canonical_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key)
    }

    /// Object key for an audio artifact: `audio/{filename}`.
    pub fn make_key(filename: &str) -> String {
        format!("audio/{}", filename.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key() {
        assert_eq!(StorageService::make_key("tts_1.mp3"), "audio/tts_1.mp3");
        assert_eq!(StorageService::make_key("/tts_1.mp3"), "audio/tts_1.mp3");
    }
}
