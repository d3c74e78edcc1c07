use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::errors::{Result, WorkflowError};
use super::session::UploadSession;

// 兼容后端返回的两种时间格式：RFC 3339 或不带时区的本地时间（按 UTC 处理）
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

// 空字符串或未知分类都视为未设置
fn deserialize_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

/// 上传会话唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 游戏 ID（后端主键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传流程步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStep {
    /// 填写游戏信息
    Metadata,
    /// 选择并上传 ZIP
    Upload,
    /// 服务端处理中
    Processing,
    /// 已发布
    Complete,
    /// 失败
    Error,
}

impl UploadStep {
    /// 步骤顺序，`Error` 不参与排序
    pub fn rank(self) -> Option<u8> {
        match self {
            UploadStep::Metadata => Some(0),
            UploadStep::Upload => Some(1),
            UploadStep::Processing => Some(2),
            UploadStep::Complete => Some(3),
            UploadStep::Error => None,
        }
    }

    pub fn requires_game_id(self) -> bool {
        matches!(self, UploadStep::Upload | UploadStep::Processing | UploadStep::Complete)
    }
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStep::Metadata => "metadata",
            UploadStep::Upload => "upload",
            UploadStep::Processing => "processing",
            UploadStep::Complete => "complete",
            UploadStep::Error => "error",
        };
        f.write_str(name)
    }
}

/// 游戏分类（固定集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Category {
    Action,
    Puzzle,
    Adventure,
    Strategy,
    Sports,
    Racing,
    Casual,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Action,
        Category::Puzzle,
        Category::Adventure,
        Category::Strategy,
        Category::Sports,
        Category::Racing,
        Category::Casual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Action => "Action",
            Category::Puzzle => "Puzzle",
            Category::Adventure => "Adventure",
            Category::Strategy => "Strategy",
            Category::Sports => "Sports",
            Category::Racing => "Racing",
            Category::Casual => "Casual",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WorkflowError::validation(format!("Unknown category: {s}")))
    }
}

/// 标签集合，保持插入顺序，区分大小写去重
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// 去掉首尾空白后追加；空串或重复返回 false
    pub fn add(&mut self, text: &str) -> bool {
        let tag = text.trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }

        self.0.push(tag.to_string());
        true
    }

    /// 删除第一个完全匹配的标签
    pub fn remove(&mut self, text: &str) -> bool {
        match self.0.iter().position(|tag| tag == text) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|existing| existing == tag)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Tags {
    fn from(values: Vec<String>) -> Self {
        values.iter().collect()
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for value in iter {
            tags.add(value.as_ref());
        }
        tags
    }
}

/// 游戏元数据（创建/更新请求体）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_category", skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Tags,
}

impl GameMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.add(tag);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::validation("Game name is required"));
        }
        Ok(())
    }
}

/// 后端游戏状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GameStatus {
    #[default]
    Draft,
    Uploading,
    Processing,
    Published,
    Failed,
    Unknown,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Draft => "DRAFT",
            GameStatus::Uploading => "UPLOADING",
            GameStatus::Processing => "PROCESSING",
            GameStatus::Published => "PUBLISHED",
            GameStatus::Failed => "FAILED",
            GameStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Published | GameStatus::Failed)
    }
}

impl From<&str> for GameStatus {
    fn from(value: &str) -> Self {
        match value {
            "DRAFT" => GameStatus::Draft,
            "UPLOADING" => GameStatus::Uploading,
            "PROCESSING" => GameStatus::Processing,
            "PUBLISHED" => GameStatus::Published,
            "FAILED" => GameStatus::Failed,
            _ => GameStatus::Unknown,
        }
    }
}

impl From<String> for GameStatus {
    fn from(value: String) -> Self {
        GameStatus::from(value.as_str())
    }
}

impl From<GameStatus> for String {
    fn from(status: GameStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 游戏记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub game_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_category")]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: GameStatus,
}

impl Game {
    /// 编辑模式下用于预填表单
    pub fn metadata(&self) -> GameMetadata {
        GameMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            tags: self.tags.clone(),
        }
    }
}

/// `GET /api/games/{id}/status` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub id: Option<GameId>,
    pub game_status: String,
    #[serde(default)]
    pub game_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StatusResponse {
    pub fn status(&self) -> GameStatus {
        GameStatus::from(self.game_status.as_str())
    }
}

/// `GET /api/games/{id}/zip-status` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipStatus {
    pub exists: bool,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl ZipStatus {
    pub fn into_asset(self) -> Option<ExistingAsset> {
        if !self.exists {
            return None;
        }

        Some(ExistingAsset {
            file_name: self.file_name.unwrap_or_default(),
            file_size: self.file_size.unwrap_or(0),
        })
    }
}

/// 已上传过的 ZIP 包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingAsset {
    pub file_name: String,
    pub file_size: u64,
}

/// 预签名上传地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub upload_url: String,
}

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
    #[serde(rename = "ROLE_USER")]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ROLE_ADMIN",
            Role::User => "ROLE_USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ROLE_ADMIN" | "ADMIN" => Ok(Role::Admin),
            "ROLE_USER" | "USER" => Ok(Role::User),
            _ => Err(WorkflowError::validation(format!("Unknown role: {s}"))),
        }
    }
}

/// 后台用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub active: bool,
    pub role: Role,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

/// 游戏列表查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameQuery {
    pub page: u32,
    pub size: u32,
    pub search: Option<String>,
}

impl Default for GameQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: 10,
            search: None,
        }
    }
}

impl GameQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", self.page.to_string()), ("size", self.size.to_string())];
        if let Some(search) = non_blank(self.search.as_deref()) {
            params.push(("search", search));
        }
        params
    }
}

/// 用户列表查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub page: u32,
    pub size: u32,
    pub search: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: 10,
            search: None,
            role: None,
            active: None,
        }
    }
}

impl UserQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", self.page.to_string()), ("size", self.size.to_string())];
        if let Some(search) = non_blank(self.search.as_deref()) {
            params.push(("search", search));
        }
        if let Some(role) = self.role {
            params.push(("role", role.as_str().to_string()));
        }
        if let Some(active) = self.active {
            params.push(("active", active.to_string()));
        }
        params
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

/// 单次传输的字节进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// 四舍五入的百分比，限制在 0..=100
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }

        let sent = self.bytes_sent.min(self.total_bytes) as u128;
        let total = self.total_bytes as u128;
        ((sent * 100 + total / 2) / total) as u8
    }
}

pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// 工作流命令
pub enum WorkflowCommand {
    SubmitMetadata {
        metadata: GameMetadata,
        reply: oneshot::Sender<Result<GameId>>,
    },
    CheckExistingAsset {
        reply: oneshot::Sender<Result<Option<ExistingAsset>>>,
    },
    BeginUpload {
        file_path: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelUpload {
        reply: oneshot::Sender<Result<()>>,
    },
    ProcessExistingAsset {
        reply: oneshot::Sender<Result<()>>,
    },
    GoToStep {
        step: UploadStep,
        reply: oneshot::Sender<Result<()>>,
    },
    AddTag {
        text: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    RemoveTag {
        text: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Reset {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<UploadSession>,
    },
}

/// 工作流事件
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// 步骤变更
    StepChanged {
        session_id: SessionId,
        from: UploadStep,
        to: UploadStep,
    },
    /// 上传进度
    Progress {
        session_id: SessionId,
        percent: u8,
    },
    /// 处理状态更新
    StatusUpdated {
        session_id: SessionId,
        status: String,
    },
    /// 发现已存在的 ZIP
    ExistingAssetFound {
        session_id: SessionId,
        asset: ExistingAsset,
    },
    /// 发布完成
    Completed {
        session_id: SessionId,
        url: String,
    },
    /// 失败
    Failed {
        session_id: SessionId,
        message: String,
    },
}

impl WorkflowEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::Completed { .. } | WorkflowEvent::Failed { .. })
    }
}

// 静态断言确保类型是 Send 的
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<WorkflowCommand>();
        assert_send::<WorkflowEvent>();
        assert_send::<UploadSession>();
    }
};
