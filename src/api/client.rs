use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;
use crate::config::Config;
use crate::core::{CredentialStore, Navigator, Result, WorkflowError};

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// 管理后台 API 客户端
///
/// 所有请求都带 bearer token。401 清除凭证并跳转登录页（同一时间只跳一次），
/// 403 跳转无权限页。
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    redirecting: Arc<AtomicBool>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30), credentials, navigator)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            credentials,
            navigator,
            redirecting: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        Self::with_timeout(&config.api_base_url, config.upload.request_timeout, credentials, navigator)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 拼接相对路径，保留 base url 自身的路径前缀
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn create_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.credentials.token() {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
        }
        Ok(headers)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!(%method, %url, "api request");
        Ok(self.client.request(method, url).headers(self.create_headers()?))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        self.check_response(response).await
    }

    async fn check_response(&self, response: Response) -> Result<Response> {
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => {
                if !self.redirecting.swap(true, Ordering::SeqCst) {
                    warn!("session expired, redirecting to login");
                    self.credentials.clear();
                    self.navigator.navigate(LOGIN_PATH, None);
                }
                Err(WorkflowError::Unauthorized)
            }
            StatusCode::FORBIDDEN => {
                warn!(url = %response.url(), "access denied");
                self.navigator.navigate(UNAUTHORIZED_PATH, None);
                Err(WorkflowError::Forbidden)
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                let message = if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Request failed").to_string()
                } else {
                    body
                };
                Err(WorkflowError::server_error(status.as_u16(), message))
            }
            _ => {
                self.redirecting.store(false, Ordering::SeqCst);
                Ok(response)
            }
        }
    }

    pub(crate) async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self.request(Method::GET, path)?.query(query);
        Ok(self.send(request).await?.json().await?)
    }

    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.request(method, path)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(self.send(request).await?.json().await?)
    }

    /// 只关心状态码的请求
    pub(crate) async fn execute(&self, method: Method, path: &str) -> Result<()> {
        let request = self.request(method, path)?;
        self.send(request).await?;
        Ok(())
    }
}

fn normalize_base_url(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{}/", trimmed))?)
    }
}
