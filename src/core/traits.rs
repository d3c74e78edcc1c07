use std::path::Path;
use async_trait::async_trait;
use super::errors::Result;
use super::types::{
    Game,
    GameId,
    GameMetadata,
    ProgressCallback,
    StatusResponse,
    UploadTarget,
    ZipStatus,
};

/// 游戏注册服务 - 工作流依赖的全部后端接口
#[async_trait]
pub trait GameRegistry: Send + Sync {
    /// 根据元数据创建游戏
    async fn create_game(&self, metadata: &GameMetadata) -> Result<Game>;

    /// 更新已有游戏的元数据
    async fn update_game(&self, game_id: GameId, metadata: &GameMetadata) -> Result<Game>;

    /// 申请预签名上传地址
    async fn request_upload_target(&self, game_id: GameId) -> Result<UploadTarget>;

    /// 通知后端上传完成（或重新处理已有的包）
    async fn complete_upload(&self, game_id: GameId) -> Result<()>;

    /// 查询处理状态
    async fn game_status(&self, game_id: GameId) -> Result<StatusResponse>;

    /// 查询是否已有上传过的 ZIP
    async fn zip_status(&self, game_id: GameId) -> Result<ZipStatus>;
}

/// 二进制直传 - 把本地文件 PUT 到预签名地址
#[async_trait]
pub trait BinaryTransport: Send + Sync {
    /// 每个可度量的分块都会回调一次进度
    async fn put_file(&self, upload_url: &str, file_path: &Path, progress: ProgressCallback) -> Result<()>;
}

/// 页面跳转能力，由调用方注入
pub trait Navigator: Send + Sync {
    /// 跳转到 `path`，可附带任意状态
    fn navigate(&self, path: &str, state: Option<serde_json::Value>);
}

/// 凭证来源
pub trait CredentialStore: Send + Sync {
    /// 当前的 bearer token
    fn token(&self) -> Option<String>;

    /// 登出时清除
    fn clear(&self);
}
