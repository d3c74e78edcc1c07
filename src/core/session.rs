//! 上传会话状态机
//!
//! 会话只由 worker 修改；这里只包含同步的状态转换规则，网络调用在 worker 中完成。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use serde::Serialize;
use super::errors::{Result, WorkflowError};
use super::types::{ExistingAsset, GameId, GameMetadata, SessionId, UploadStep};

#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    session_id: SessionId,
    step: UploadStep,
    game_id: Option<GameId>,
    metadata: GameMetadata,
    selected_binary: Option<PathBuf>,
    upload_progress: u8,
    processing_status: Option<String>,
    result_url: Option<String>,
    error_message: Option<String>,
    edit_mode: bool,
    existing_asset: Option<ExistingAsset>,
    visited: BTreeSet<UploadStep>,
    transfer_in_flight: bool,
    polling: bool,
}

impl UploadSession {
    /// 新建游戏的会话
    pub fn new() -> Self {
        Self {
            session_id: SessionId::new(),
            step: UploadStep::Metadata,
            game_id: None,
            metadata: GameMetadata::default(),
            selected_binary: None,
            upload_progress: 0,
            processing_status: None,
            result_url: None,
            error_message: None,
            edit_mode: false,
            existing_asset: None,
            visited: BTreeSet::from([UploadStep::Metadata]),
            transfer_in_flight: false,
            polling: false,
        }
    }

    /// 编辑已有游戏的会话
    pub fn for_edit(game_id: GameId, metadata: GameMetadata) -> Self {
        Self {
            game_id: Some(game_id),
            metadata,
            edit_mode: true,
            ..Self::new()
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn step(&self) -> UploadStep {
        self.step
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game_id
    }

    pub fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    pub fn selected_binary(&self) -> Option<&Path> {
        self.selected_binary.as_deref()
    }

    pub fn upload_progress(&self) -> u8 {
        self.upload_progress
    }

    pub fn processing_status(&self) -> Option<&str> {
        self.processing_status.as_deref()
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn existing_asset(&self) -> Option<&ExistingAsset> {
        self.existing_asset.as_ref()
    }

    pub fn has_visited(&self, step: UploadStep) -> bool {
        self.visited.contains(&step)
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer_in_flight
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_busy(&self) -> bool {
        self.transfer_in_flight || self.polling
    }

    pub fn require_game_id(&self) -> Result<GameId> {
        self.game_id.ok_or(WorkflowError::MissingGameId)
    }

    /// 检查手动跳转是否允许
    pub fn check_navigation(&self, target: UploadStep) -> Result<()> {
        let invalid = WorkflowError::InvalidTransition { from: self.step, to: target };

        if self.is_busy() || self.step == UploadStep::Error {
            return Err(invalid);
        }
        if target == self.step {
            return Ok(());
        }
        if target.requires_game_id() && self.game_id.is_none() {
            return Err(WorkflowError::MissingGameId);
        }
        // Processing/Complete 只能由操作完成后进入
        if !matches!(target, UploadStep::Metadata | UploadStep::Upload) {
            return Err(invalid);
        }

        let allowed = if self.edit_mode {
            true
        } else {
            match (target.rank(), self.step.rank()) {
                (Some(target_rank), Some(current_rank)) => target_rank <= current_rank,
                _ => false,
            }
        };

        if allowed { Ok(()) } else { Err(invalid) }
    }

    /// 执行手动跳转，返回原步骤
    pub(crate) fn navigate_to(&mut self, target: UploadStep) -> Result<UploadStep> {
        self.check_navigation(target)?;
        Ok(self.enter(target))
    }

    pub(crate) fn set_metadata(&mut self, metadata: GameMetadata) {
        self.metadata = metadata;
    }

    /// game id 只能写入一次
    pub(crate) fn assign_game_id(&mut self, game_id: GameId) -> Result<()> {
        match self.game_id {
            Some(existing) if existing != game_id => Err(WorkflowError::internal_error(format!(
                "Game id already assigned: {existing}, got {game_id}"
            ))),
            _ => {
                self.game_id = Some(game_id);
                Ok(())
            }
        }
    }

    /// 元数据提交成功后进入上传步骤
    pub(crate) fn advance_to_upload(&mut self) -> Result<UploadStep> {
        if self.step != UploadStep::Metadata && self.step != UploadStep::Upload {
            return Err(WorkflowError::InvalidTransition { from: self.step, to: UploadStep::Upload });
        }
        self.require_game_id()?;
        Ok(self.enter(UploadStep::Upload))
    }

    pub fn check_can_start_transfer(&self) -> Result<GameId> {
        let game_id = self.require_game_id()?;
        if self.transfer_in_flight {
            return Err(WorkflowError::TransferInProgress);
        }
        if self.step != UploadStep::Upload || self.polling {
            return Err(WorkflowError::InvalidTransition { from: self.step, to: UploadStep::Processing });
        }
        Ok(game_id)
    }

    /// 标记传输开始，进度归零
    pub(crate) fn start_transfer(&mut self, file_path: PathBuf) -> Result<GameId> {
        let game_id = self.check_can_start_transfer()?;
        self.selected_binary = Some(file_path);
        self.upload_progress = 0;
        self.transfer_in_flight = true;
        Ok(game_id)
    }

    /// 记录进度；只接受不回退的值，返回需要发布的新值
    pub(crate) fn record_progress(&mut self, percent: u8) -> Option<u8> {
        if !self.transfer_in_flight {
            return None;
        }

        let percent = percent.min(100);
        if percent > self.upload_progress {
            self.upload_progress = percent;
            Some(percent)
        } else {
            None
        }
    }

    pub(crate) fn finish_transfer(&mut self) {
        self.transfer_in_flight = false;
        self.selected_binary = None;
    }

    pub fn check_can_process_existing(&self) -> Result<GameId> {
        if !self.edit_mode {
            return Err(WorkflowError::NotEditing);
        }
        let game_id = self.require_game_id()?;
        if self.existing_asset.is_none() {
            return Err(WorkflowError::NoExistingAsset(game_id));
        }
        if self.is_busy() {
            return Err(WorkflowError::TransferInProgress);
        }
        if matches!(self.step, UploadStep::Processing | UploadStep::Error) {
            return Err(WorkflowError::InvalidTransition { from: self.step, to: UploadStep::Processing });
        }
        Ok(game_id)
    }

    /// 进入处理阶段并标记轮询中
    pub(crate) fn enter_processing(&mut self) -> Result<UploadStep> {
        self.require_game_id()?;
        self.processing_status = None;
        self.polling = true;
        Ok(self.enter(UploadStep::Processing))
    }

    pub(crate) fn record_status(&mut self, status: impl Into<String>) {
        self.processing_status = Some(status.into());
    }

    pub(crate) fn set_existing_asset(&mut self, asset: Option<ExistingAsset>) {
        self.existing_asset = asset;
    }

    /// 终态：发布成功
    pub(crate) fn complete(&mut self, url: String) -> Result<UploadStep> {
        self.require_game_id()?;
        self.polling = false;
        self.transfer_in_flight = false;
        let previous = self.enter(UploadStep::Complete);
        self.result_url = Some(url);
        Ok(previous)
    }

    /// 终态：失败
    pub(crate) fn fail(&mut self, message: impl Into<String>) -> UploadStep {
        self.polling = false;
        self.transfer_in_flight = false;
        let previous = self.enter(UploadStep::Error);
        self.error_message = Some(message.into());
        previous
    }

    /// 只能从 Error 回到 Metadata
    pub(crate) fn reset(&mut self) -> Result<UploadStep> {
        if self.step != UploadStep::Error {
            return Err(WorkflowError::InvalidTransition { from: self.step, to: UploadStep::Metadata });
        }

        self.upload_progress = 0;
        self.transfer_in_flight = false;
        self.polling = false;
        self.processing_status = None;
        Ok(self.enter(UploadStep::Metadata))
    }

    /// 标签只能在元数据步骤修改
    pub fn check_can_edit_tags(&self) -> Result<()> {
        if self.is_busy() || self.step != UploadStep::Metadata {
            return Err(WorkflowError::TagsLocked(self.step));
        }
        Ok(())
    }

    pub(crate) fn add_tag(&mut self, text: &str) -> Result<bool> {
        self.check_can_edit_tags()?;
        Ok(self.metadata.tags.add(text))
    }

    pub(crate) fn remove_tag(&mut self, text: &str) -> Result<bool> {
        self.check_can_edit_tags()?;
        Ok(self.metadata.tags.remove(text))
    }

    // result_url/error_message 只在对应步骤存在
    fn enter(&mut self, step: UploadStep) -> UploadStep {
        let previous = self.step;
        self.step = step;
        self.visited.insert(step);
        if step != UploadStep::Complete {
            self.result_url = None;
        }
        if step != UploadStep::Error {
            self.error_message = None;
        }
        previous
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}
