use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use super::errors::{Result, WorkflowError};
use super::traits::{BinaryTransport, GameRegistry};
use super::types::{GameId, ProgressCallback, TransferProgress};
use super::worker::ActivityReport;

/// 一次上传尝试：申请预签名地址 → 直传 → 通知完成
pub(crate) struct TransferJob {
    pub(crate) registry: Arc<dyn GameRegistry>,
    pub(crate) transport: Arc<dyn BinaryTransport>,
    pub(crate) game_id: GameId,
    pub(crate) file_path: PathBuf,
    pub(crate) transfer_timeout: Duration,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) reports: mpsc::UnboundedSender<ActivityReport>,
    pub(crate) generation: u64,
}

impl TransferJob {
    pub(crate) async fn run(self) {
        let result = tokio::select! {
            result = self.execute() => result,
            _ = self.cancellation_token.cancelled() => Err(WorkflowError::Cancelled),
        };

        // 取消由 worker 发起，状态已经处理过
        if matches!(result, Err(WorkflowError::Cancelled)) {
            debug!(game_id = %self.game_id, "transfer cancelled");
            return;
        }

        let _ = self.reports.send(ActivityReport::TransferFinished {
            generation: self.generation,
            result,
        });
    }

    async fn execute(&self) -> Result<()> {
        let target = self.registry.request_upload_target(self.game_id).await?;
        debug!(game_id = %self.game_id, "received presigned upload target");

        let progress: ProgressCallback = {
            let reports = self.reports.clone();
            let generation = self.generation;
            Arc::new(move |progress: TransferProgress| {
                let _ = reports.send(ActivityReport::Progress { generation, progress });
            })
        };

        let upload = self.transport.put_file(&target.upload_url, &self.file_path, progress);
        match tokio::time::timeout(self.transfer_timeout, upload).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(WorkflowError::Timeout(format!(
                    "transfer did not finish within {}s",
                    self.transfer_timeout.as_secs()
                )));
            }
        }

        self.registry.complete_upload(self.game_id).await?;
        info!(game_id = %self.game_id, file = %self.file_path.display(), "upload finished");
        Ok(())
    }
}
