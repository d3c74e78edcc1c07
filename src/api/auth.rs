use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::core::{CredentialStore, Result, Role};

/// 内存中的 token
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl CredentialStore for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// 凭证文件内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// 存在 TOML 文件中的凭证，`clear` 会删除文件
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cached: RwLock<Option<StoredCredentials>>,
}

impl FileCredentialStore {
    /// 文件不存在时视为未登录
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cached = match fs::read_to_string(&path) {
            Ok(content) => Some(toml::from_str::<StoredCredentials>(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), logged_in = cached.is_some(), "opened credential file");

        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> Option<Role> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|credentials| credentials.role)
    }

    /// 写入并缓存新的凭证
    pub fn save(&self, credentials: StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string(&credentials)?)?;
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(credentials);
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|credentials| credentials.token.clone())
    }

    fn clear(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "credential file removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), "failed to remove credential file: {}", err),
        }
    }
}
