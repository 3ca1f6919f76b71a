//! HTTP client for the deployment API.
//!
//! Every call sends `Authorization: Bearer <token>`. Streaming endpoints hand
//! back the raw byte stream; decode it with `LineDecoder`.

use crate::forms::{ConnectionTestForm, DeployForm, NginxSetupForm};
use crate::models::DeploymentHistoryEntry;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_DEPLOYER_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Deployer unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message} (HTTP {status}){}", .error.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    Api {
        status: u16,
        message: String,
        error: Option<String>,
    },
    #[error("Invalid response from deployer: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub in_progress: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub message: String,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: String,
}

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ClientError>>;

pub struct DeployApiClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl DeployApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        // no overall timeout: a deployment stream stays open for minutes
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => ClientError::Api {
                status,
                message: parsed.message,
                error: parsed.error,
            },
            Err(_) => ClientError::Api {
                status,
                message: if body.is_empty() {
                    "request failed".to_string()
                } else {
                    body
                },
                error: None,
            },
        })
    }

    async fn json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let resp = Self::check(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn stream(&self, path: &str, body: &impl serde::Serialize) -> Result<ByteStream, ClientError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from))
            .boxed())
    }

    pub async fn start_deploy(&self, form: &DeployForm) -> Result<ByteStream, ClientError> {
        self.stream("/api/deploy", form).await
    }

    pub async fn setup_nginx(&self, form: &NginxSetupForm) -> Result<ByteStream, ClientError> {
        self.stream("/api/deploy/setup-nginx", form).await
    }

    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/deploy/status"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::json(resp).await
    }

    pub async fn reset(&self) -> Result<ResetResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/deploy/reset"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::json(resp).await
    }

    pub async fn test_connection(
        &self,
        form: &ConnectionTestForm,
    ) -> Result<ConnectionTestResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/deploy/test"))
            .bearer_auth(&self.token)
            .json(form)
            .send()
            .await?;
        Self::json(resp).await
    }

    pub async fn history(&self) -> Result<Vec<DeploymentHistoryEntry>, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/deployment-history"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::json(resp).await
    }
}
