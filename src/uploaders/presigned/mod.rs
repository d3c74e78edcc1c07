use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, StatusCode};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;
use crate::config::UploadConfig;
use crate::core::{BinaryTransport, ProgressCallback, Result, WorkflowError};
use crate::utils::{ProgressStream, ProgressTracker, format_bytes};

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// 预签名地址直传 - 单次 PUT，流式读取文件并汇报进度
pub struct PresignedUploader {
    client: Client,
    chunk_size: usize,
}

impl PresignedUploader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            client: Client::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// 直传不带 API 的 bearer token，连接超时沿用请求超时
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size,
        })
    }
}

#[async_trait]
impl BinaryTransport for PresignedUploader {
    async fn put_file(&self, upload_url: &str, file_path: &Path, progress: ProgressCallback) -> Result<()> {
        let file = File::open(file_path).await?;
        let file_size = file.metadata().await?.len();
        debug!(file = %file_path.display(), size = %format_bytes(file_size), "uploading to presigned url");

        let tracker = Arc::new(ProgressTracker::new(file_size, progress));
        let stream = ProgressStream::new(ReaderStream::with_capacity(file, self.chunk_size), tracker.clone());

        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, ZIP_CONTENT_TYPE)
            .header(CONTENT_LENGTH, file_size)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(WorkflowError::UploadRejected {
                status_code: response.status().as_u16(),
            });
        }

        debug!(bytes_sent = tracker.bytes_sent(), "presigned upload accepted");
        Ok(())
    }
}
