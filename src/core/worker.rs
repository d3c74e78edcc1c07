use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::UploadConfig;
use crate::utils::RetryStrategy;
use super::errors::{Result, WorkflowError};
use super::poller::{PollOutcome, StatusPoller};
use super::session::UploadSession;
use super::traits::{BinaryTransport, GameRegistry};
use super::transfer::TransferJob;
use super::types::{
    ExistingAsset,
    GameId,
    GameMetadata,
    GameStatus,
    TransferProgress,
    UploadStep,
    WorkflowCommand,
    WorkflowEvent,
};

const UPLOAD_FAILED: &str = "Upload failed. Please try again.";
const UPLOAD_REJECTED: &str = "Upload failed";
const UPLOAD_CANCELLED: &str = "Upload cancelled";
const PROCESSING_FAILED: &str = "Processing failed";
const REPROCESS_FAILED: &str = "Failed to process existing ZIP. Please try again.";

/// 后台任务回报给 worker 的消息，generation 不匹配的直接丢弃
#[derive(Debug)]
pub(crate) enum ActivityReport {
    Progress {
        generation: u64,
        progress: TransferProgress,
    },
    TransferFinished {
        generation: u64,
        result: Result<()>,
    },
    Poll {
        generation: u64,
        outcome: PollOutcome,
    },
}

/// 后台任务句柄
struct Activity {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl Activity {
    fn spawn<F>(cancellation_token: CancellationToken, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            cancellation_token,
            join_handle: tokio::spawn(future),
        }
    }

    fn cancel(self) {
        self.cancellation_token.cancel();
        drop(self.join_handle);
    }
}

/// 独占会话的 worker，串行处理命令与后台回报
pub(crate) struct WorkflowWorker {
    session: UploadSession,
    registry: Arc<dyn GameRegistry>,
    transport: Arc<dyn BinaryTransport>,
    config: UploadConfig,
    event_tx: broadcast::Sender<WorkflowEvent>,
    report_tx: mpsc::UnboundedSender<ActivityReport>,
    report_rx: mpsc::UnboundedReceiver<ActivityReport>,
    generation: u64,
    transfer: Option<Activity>,
    poller: Option<Activity>,
}

impl WorkflowWorker {
    pub(crate) fn new(
        session: UploadSession,
        registry: Arc<dyn GameRegistry>,
        transport: Arc<dyn BinaryTransport>,
        config: UploadConfig,
        event_tx: broadcast::Sender<WorkflowEvent>,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        Self {
            session,
            registry,
            transport,
            config,
            event_tx,
            report_tx,
            report_rx,
            generation: 0,
            transfer: None,
            poller: None,
        }
    }

    pub(crate) async fn run(mut self, mut command_rx: mpsc::Receiver<WorkflowCommand>) {
        let session_id = self.session.session_id();
        info!(session = %session_id, edit_mode = self.session.edit_mode(), "upload workflow started");

        // 编辑模式进入时先检查已有的包
        if self.session.edit_mode() {
            if let Err(err) = self.check_existing_asset().await {
                warn!(session = %session_id, "existing package check failed: {}", err);
            }
        }

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(report) = self.report_rx.recv() => {
                    self.handle_report(report);
                }
            }
        }

        info!(session = %session_id, step = %self.session.step(), "upload workflow stopped");
    }

    async fn handle_command(&mut self, command: WorkflowCommand) {
        match command {
            WorkflowCommand::SubmitMetadata { metadata, reply } => {
                let result = self.submit_metadata(metadata).await;
                let _ = reply.send(result);
            }
            WorkflowCommand::CheckExistingAsset { reply } => {
                let result = self.check_existing_asset().await;
                let _ = reply.send(result);
            }
            WorkflowCommand::BeginUpload { file_path, reply } => {
                let result = self.begin_upload(file_path).await;
                let _ = reply.send(result);
            }
            WorkflowCommand::CancelUpload { reply } => {
                let _ = reply.send(self.cancel_upload());
            }
            WorkflowCommand::ProcessExistingAsset { reply } => {
                let result = self.process_existing_asset().await;
                let _ = reply.send(result);
            }
            WorkflowCommand::GoToStep { step, reply } => {
                let result = self
                    .session
                    .navigate_to(step)
                    .map(|previous| self.emit_step_change(previous));
                let _ = reply.send(result);
            }
            WorkflowCommand::AddTag { text, reply } => {
                let _ = reply.send(self.session.add_tag(&text));
            }
            WorkflowCommand::RemoveTag { text, reply } => {
                let _ = reply.send(self.session.remove_tag(&text));
            }
            WorkflowCommand::Reset { reply } => {
                let _ = reply.send(self.reset());
            }
            WorkflowCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.clone());
            }
        }
    }

    async fn submit_metadata(&mut self, mut metadata: GameMetadata) -> Result<GameId> {
        metadata.validate()?;
        if self.session.is_busy() || self.session.step() != UploadStep::Metadata {
            return Err(WorkflowError::InvalidTransition {
                from: self.session.step(),
                to: UploadStep::Upload,
            });
        }
        metadata.name = metadata.name.trim().to_string();
        // 合并通过 add_tag 添加的标签
        let mut tags = self.session.metadata().tags.clone();
        for tag in metadata.tags.as_slice() {
            tags.add(tag);
        }
        metadata.tags = tags;

        let game_id = match self.session.game_id() {
            // 编辑已有游戏：跳过创建
            Some(game_id) if self.session.edit_mode() => game_id,
            // 新建流程中返回修改：更新已创建的记录
            Some(game_id) => {
                self.registry.update_game(game_id, &metadata).await?;
                info!(session = %self.session.session_id(), %game_id, "game metadata updated");
                game_id
            }
            None => {
                let game = self.registry.create_game(&metadata).await?;
                info!(session = %self.session.session_id(), game_id = %game.id, "game created");
                self.session.assign_game_id(game.id)?;
                game.id
            }
        };

        self.session.set_metadata(metadata);
        let previous = self.session.advance_to_upload()?;
        self.emit_step_change(previous);
        Ok(game_id)
    }

    async fn check_existing_asset(&mut self) -> Result<Option<ExistingAsset>> {
        if !self.session.edit_mode() {
            return Err(WorkflowError::NotEditing);
        }
        let game_id = self.session.require_game_id()?;

        let asset = match self.registry.zip_status(game_id).await {
            Ok(status) => status.into_asset(),
            Err(err) => {
                warn!(%game_id, "zip status query failed: {}", err);
                None
            }
        };

        self.session.set_existing_asset(asset.clone());
        if let Some(asset) = &asset {
            debug!(%game_id, file = %asset.file_name, size = asset.file_size, "found existing package");
            self.emit(WorkflowEvent::ExistingAssetFound {
                session_id: self.session.session_id(),
                asset: asset.clone(),
            });
        }
        Ok(asset)
    }

    async fn begin_upload(&mut self, file_path: PathBuf) -> Result<()> {
        self.session.check_can_start_transfer()?;

        let file_metadata = tokio::fs::metadata(&file_path).await?;
        if !file_metadata.is_file() {
            return Err(WorkflowError::validation(format!("Not a file: {}", file_path.display())));
        }

        let game_id = self.session.start_transfer(file_path.clone())?;
        self.generation += 1;
        info!(
            session = %self.session.session_id(),
            %game_id,
            file = %file_path.display(),
            size = file_metadata.len(),
            "starting upload"
        );
        self.emit(WorkflowEvent::Progress {
            session_id: self.session.session_id(),
            percent: 0,
        });

        let cancellation_token = CancellationToken::new();
        let job = TransferJob {
            registry: self.registry.clone(),
            transport: self.transport.clone(),
            game_id,
            file_path,
            transfer_timeout: self.config.transfer_timeout,
            cancellation_token: cancellation_token.clone(),
            reports: self.report_tx.clone(),
            generation: self.generation,
        };
        self.transfer = Some(Activity::spawn(cancellation_token, job.run()));
        Ok(())
    }

    fn cancel_upload(&mut self) -> Result<()> {
        if !self.session.is_transferring() {
            return Err(WorkflowError::NoTransfer);
        }

        info!(session = %self.session.session_id(), "upload cancelled by operator");
        self.fail(UPLOAD_CANCELLED);
        Ok(())
    }

    async fn process_existing_asset(&mut self) -> Result<()> {
        let game_id = self.session.check_can_process_existing()?;
        self.generation += 1;

        if let Err(err) = self.registry.complete_upload(game_id).await {
            warn!(%game_id, "reprocess request failed: {}", err);
            self.fail(REPROCESS_FAILED);
            return Err(err);
        }

        info!(session = %self.session.session_id(), %game_id, "reprocessing existing package");
        self.start_processing(game_id)
    }

    fn reset(&mut self) -> Result<()> {
        let previous = self.session.reset()?;
        self.stop_activities();
        self.emit_step_change(previous);
        Ok(())
    }

    fn handle_report(&mut self, report: ActivityReport) {
        match report {
            ActivityReport::Progress { generation, progress } if generation == self.generation => {
                if let Some(percent) = self.session.record_progress(progress.percent()) {
                    self.emit(WorkflowEvent::Progress {
                        session_id: self.session.session_id(),
                        percent,
                    });
                }
            }
            ActivityReport::TransferFinished { generation, result } if generation == self.generation => {
                self.transfer = None;
                match result {
                    Ok(()) => {
                        // 空文件不会上报进度
                        if let Some(percent) = self.session.record_progress(100) {
                            self.emit(WorkflowEvent::Progress {
                                session_id: self.session.session_id(),
                                percent,
                            });
                        }
                        self.session.finish_transfer();
                        match self.session.require_game_id() {
                            Ok(game_id) => {
                                if let Err(err) = self.start_processing(game_id) {
                                    self.fail(err.to_string());
                                }
                            }
                            Err(err) => self.fail(err.to_string()),
                        }
                    }
                    Err(err) => {
                        warn!(session = %self.session.session_id(), "upload failed: {}", err);
                        let message = match err {
                            WorkflowError::UploadRejected { .. } => UPLOAD_REJECTED,
                            _ => UPLOAD_FAILED,
                        };
                        self.fail(message);
                    }
                }
            }
            ActivityReport::Poll { generation, outcome } if generation == self.generation => {
                self.handle_poll(outcome);
            }
            stale => {
                debug!(session = %self.session.session_id(), "ignoring stale report: {:?}", stale);
            }
        }
    }

    fn handle_poll(&mut self, outcome: PollOutcome) {
        let session_id = self.session.session_id();
        let status = match outcome {
            PollOutcome::Status(status) => status,
            PollOutcome::GaveUp(message) => {
                warn!(session = %session_id, "status polling gave up: {}", message);
                self.fail(message);
                return;
            }
        };

        self.session.record_status(status.game_status.clone());
        match status.status() {
            GameStatus::Published => {
                let url = status.game_url.unwrap_or_else(|| {
                    warn!(session = %session_id, "published game has no url");
                    String::new()
                });
                self.poller = None;
                match self.session.complete(url.clone()) {
                    Ok(previous) => {
                        self.stop_activities();
                        info!(session = %session_id, %url, "game published");
                        self.emit_step_change(previous);
                        self.emit(WorkflowEvent::Completed { session_id, url });
                    }
                    Err(err) => self.fail(err.to_string()),
                }
            }
            GameStatus::Failed => {
                let message = status
                    .error_message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| PROCESSING_FAILED.to_string());
                self.fail(message);
            }
            _ => {
                self.emit(WorkflowEvent::StatusUpdated {
                    session_id,
                    status: status.game_status,
                });
            }
        }
    }

    fn start_processing(&mut self, game_id: GameId) -> Result<()> {
        let previous = self.session.enter_processing()?;
        self.emit_step_change(previous);

        let cancellation_token = CancellationToken::new();
        let poller = StatusPoller {
            registry: self.registry.clone(),
            game_id,
            interval: self.config.poll_interval,
            backoff: RetryStrategy::poll_backoff(self.config.poll_interval, self.config.poll_backoff_max),
            max_failures: self.config.max_poll_failures,
            processing_timeout: self.config.processing_timeout,
            cancellation_token: cancellation_token.clone(),
            reports: self.report_tx.clone(),
            generation: self.generation,
        };
        self.poller = Some(Activity::spawn(cancellation_token, poller.run()));
        Ok(())
    }

    /// 进入 Error，停止所有后台任务
    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.stop_activities();
        let previous = self.session.fail(message.clone());
        self.emit_step_change(previous);
        self.emit(WorkflowEvent::Failed {
            session_id: self.session.session_id(),
            message,
        });
    }

    fn stop_activities(&mut self) {
        // 之后到达的回报全部作废
        self.generation += 1;
        if let Some(transfer) = self.transfer.take() {
            transfer.cancel();
        }
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
    }

    fn emit_step_change(&self, previous: UploadStep) {
        let current = self.session.step();
        if previous != current {
            debug!(session = %self.session.session_id(), from = %previous, to = %current, "step changed");
            self.emit(WorkflowEvent::StepChanged {
                session_id: self.session.session_id(),
                from: previous,
                to: current,
            });
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        // 没有订阅者时发送失败是正常的
        let _ = self.event_tx.send(event);
    }
}

impl Drop for WorkflowWorker {
    fn drop(&mut self) {
        self.stop_activities();
    }
}
