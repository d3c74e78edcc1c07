use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::config::UploadConfig;
use super::errors::{Result, WorkflowError};
use super::session::UploadSession;
use super::traits::{BinaryTransport, GameRegistry};
use super::types::{
    ExistingAsset,
    GameId,
    GameMetadata,
    SessionId,
    UploadStep,
    WorkflowCommand,
    WorkflowEvent,
};
use super::worker::WorkflowWorker;

/// 上传工作流 - 操作端，可以随意克隆
#[derive(Clone)]
pub struct UploadWorkflow {
    command_tx: mpsc::Sender<WorkflowCommand>,
    event_tx: broadcast::Sender<WorkflowEvent>,
    session_id: SessionId,
}

/// 工作流句柄 - 包含操作端和 worker 任务
pub struct UploadWorkflowHandle {
    pub workflow: UploadWorkflow,
    pub worker_handle: JoinHandle<()>,
}

impl UploadWorkflowHandle {
    /// 关闭工作流；所有克隆的操作端都释放后 worker 才会退出
    pub async fn shutdown(self) -> Result<()> {
        drop(self.workflow);
        self.worker_handle
            .await
            .map_err(|err| WorkflowError::internal_error(format!("Worker panic: {}", err)))
    }
}

impl UploadWorkflow {
    /// 新建游戏
    pub fn new(
        registry: Arc<dyn GameRegistry>,
        transport: Arc<dyn BinaryTransport>,
        config: UploadConfig,
    ) -> UploadWorkflowHandle {
        Self::spawn(UploadSession::new(), registry, transport, config)
    }

    /// 编辑已有游戏，启动后会自动检查已有的 ZIP
    pub fn edit(
        registry: Arc<dyn GameRegistry>,
        transport: Arc<dyn BinaryTransport>,
        config: UploadConfig,
        game_id: GameId,
        metadata: GameMetadata,
    ) -> UploadWorkflowHandle {
        Self::spawn(UploadSession::for_edit(game_id, metadata), registry, transport, config)
    }

    fn spawn(
        session: UploadSession,
        registry: Arc<dyn GameRegistry>,
        transport: Arc<dyn BinaryTransport>,
        config: UploadConfig,
    ) -> UploadWorkflowHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        // 最大缓存 256 个事件
        let (event_tx, _) = broadcast::channel(256);
        let session_id = session.session_id();

        let worker = WorkflowWorker::new(session, registry, transport, config, event_tx.clone());
        let worker_handle = tokio::spawn(worker.run(command_rx));

        let workflow = Self {
            command_tx,
            event_tx,
            session_id,
        };

        UploadWorkflowHandle {
            workflow,
            worker_handle,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// 提交元数据：创建或更新游戏后进入上传步骤
    pub async fn submit_metadata(&self, metadata: GameMetadata) -> Result<GameId> {
        self.request(|reply| WorkflowCommand::SubmitMetadata { metadata, reply })
            .await?
    }

    /// 查询已上传的 ZIP（仅编辑模式）
    pub async fn check_existing_asset(&self) -> Result<Option<ExistingAsset>> {
        self.request(|reply| WorkflowCommand::CheckExistingAsset { reply })
            .await?
    }

    /// 开始上传；立即返回，结果通过事件通知
    pub async fn begin_upload(&self, file_path: impl Into<PathBuf>) -> Result<()> {
        let file_path = file_path.into();
        self.request(|reply| WorkflowCommand::BeginUpload { file_path, reply })
            .await?
    }

    pub async fn cancel_upload(&self) -> Result<()> {
        self.request(|reply| WorkflowCommand::CancelUpload { reply })
            .await?
    }

    /// 重新处理已有的 ZIP，不上传新文件
    pub async fn process_existing_asset(&self) -> Result<()> {
        self.request(|reply| WorkflowCommand::ProcessExistingAsset { reply })
            .await?
    }

    pub async fn go_to_step(&self, step: UploadStep) -> Result<()> {
        self.request(|reply| WorkflowCommand::GoToStep { step, reply })
            .await?
    }

    pub async fn add_tag(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| WorkflowCommand::AddTag { text, reply })
            .await?
    }

    pub async fn remove_tag(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| WorkflowCommand::RemoveTag { text, reply })
            .await?
    }

    /// 从 Error 回到 Metadata，保留 game id
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| WorkflowCommand::Reset { reply })
            .await?
    }

    /// 当前会话的副本
    pub async fn snapshot(&self) -> Result<UploadSession> {
        self.request(|reply| WorkflowCommand::Snapshot { reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> WorkflowCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| WorkflowError::WorkflowShutdown)?;

        reply_rx
            .await
            .map_err(|_| WorkflowError::WorkflowShutdown)
    }

    /// 订阅事件
    ///
    /// 接收太慢会丢失事件（lagged error），需要时用 `snapshot` 补齐状态
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F> {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter,
        }
    }
}

/// 过滤的事件接收器
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<WorkflowEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&WorkflowEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<WorkflowEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}
