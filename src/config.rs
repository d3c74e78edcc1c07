use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use crate::core::{Result, WorkflowError};

pub const DEFAULT_CONFIG_FILE: &str = "game-uploader.toml";
pub const ENV_API_BASE_URL: &str = "GAMEHOST_API_BASE_URL";
pub const ENV_TOKEN: &str = "GAMEHOST_TOKEN";

// 用于序列化 Duration（毫秒）
fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

// 用于序列化 Duration（秒）
fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

fn default_api_base_url() -> String {
    "http://localhost:8080".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// 后端地址
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// 直接配置的 token，优先于凭证文件
    #[serde(default)]
    pub token: Option<String>,
    /// 凭证文件路径
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            credentials_file: None,
            upload: UploadConfig::default(),
        }
    }
}

/// 上传流程配置
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// 状态轮询间隔
    #[serde(rename = "poll_interval_ms", serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub poll_interval: Duration,

    /// 轮询失败后的最大退避间隔
    #[serde(rename = "poll_backoff_max_ms", serialize_with = "serialize_millis", deserialize_with = "deserialize_millis")]
    pub poll_backoff_max: Duration,

    /// 连续失败多少次后放弃轮询
    pub max_poll_failures: u32,

    /// 单个 API 请求超时
    #[serde(rename = "request_timeout_secs", serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub request_timeout: Duration,

    /// 文件直传超时
    #[serde(rename = "transfer_timeout_secs", serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub transfer_timeout: Duration,

    /// 服务端处理最长等待时间
    #[serde(rename = "processing_timeout_secs", serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub processing_timeout: Duration,

    /// 读取文件的缓冲大小
    pub chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            poll_backoff_max: Duration::from_secs(30),
            max_poll_failures: 10,
            request_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(60 * 60),
            processing_timeout: Duration::from_secs(30 * 60),
            chunk_size: 256 * 1024, // 256KB
        }
    }
}

impl UploadConfig {
    /// 时长、次数和缓冲大小都必须大于零
    pub fn validate(&self) -> Result<()> {
        let zero_field = if self.poll_interval.is_zero() {
            Some("poll_interval_ms")
        } else if self.request_timeout.is_zero() {
            Some("request_timeout_secs")
        } else if self.transfer_timeout.is_zero() {
            Some("transfer_timeout_secs")
        } else if self.processing_timeout.is_zero() {
            Some("processing_timeout_secs")
        } else if self.max_poll_failures == 0 {
            Some("max_poll_failures")
        } else if self.chunk_size == 0 {
            Some("chunk_size")
        } else {
            None
        };

        match zero_field {
            Some(field) => Err(WorkflowError::validation(format!("upload.{field} must be greater than zero"))),
            None => Ok(()),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        config.upload.validate()?;
        Ok(config)
    }

    /// 读取配置文件并应用环境变量
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(Config::from_toml(&content)?.apply_env())
    }

    /// 配置文件不存在时使用默认值
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Config> {
        match Config::load(path.as_ref()) {
            Err(WorkflowError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.as_ref().display(), "config file not found, using defaults");
                Ok(Config::default().apply_env())
            }
            other => other,
        }
    }

    pub fn apply_env(self) -> Config {
        self.apply_overrides(std::env::var(ENV_API_BASE_URL).ok(), std::env::var(ENV_TOKEN).ok())
    }

    fn apply_overrides(mut self, api_base_url: Option<String>, token: Option<String>) -> Config {
        if let Some(url) = api_base_url.filter(|value| !value.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(token) = token.filter(|value| !value.trim().is_empty()) {
            self.token = Some(token);
        }
        self
    }
}
