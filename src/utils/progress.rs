use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::{ProgressCallback, TransferProgress};

/// 进度追踪器 - 累加已发送字节并回调
pub struct ProgressTracker {
    total_bytes: u64,
    bytes_sent: AtomicU64,
    callback: ProgressCallback,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, callback: ProgressCallback) -> Self {
        Self {
            total_bytes,
            bytes_sent: AtomicU64::new(0),
            callback,
        }
    }

    /// 累加字节
    pub fn record_bytes(&self, bytes: u64) {
        let sent = self.bytes_sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
        (self.callback)(TransferProgress {
            bytes_sent: sent,
            total_bytes: self.total_bytes,
        });
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

pin_project! {
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        tracker: Arc<ProgressTracker>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, tracker: Arc<ProgressTracker>) -> Self {
        Self { inner, tracker }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let bytes_len = chunk.len();
                if bytes_len > 0 {
                    this.tracker.record_bytes(bytes_len as u64);
                }

                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
