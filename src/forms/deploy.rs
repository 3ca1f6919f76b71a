//! Request bodies of the deployment endpoints.
//!
//! Fields arrive optional and untrimmed. Presence is checked first, then the
//! trimmed values are validated as a `DeploymentConfig` or `RemoteLogin`.

use crate::models::{DeploymentConfig, RemoteLogin};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

const MISSING_TARGET: &str = "Host, username, and domain are required";
const MISSING_LOGIN: &str = "Host and username are required";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn build_config(
    host: &Option<String>,
    username: &Option<String>,
    domain: &Option<String>,
    deploy_path: &str,
) -> Result<DeploymentConfig, String> {
    let (Some(host), Some(username), Some(domain)) =
        (present(host), present(username), present(domain))
    else {
        return Err(MISSING_TARGET.to_string());
    };
    let config = DeploymentConfig {
        login: RemoteLogin {
            host: host.to_string(),
            username: username.to_string(),
        },
        deploy_path: deploy_path.to_string(),
        domain: domain.to_lowercase(),
    };
    config.validate().map_err(|errors| errors.to_string())?;
    Ok(config)
}

/// Body of `POST /api/deploy`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployForm {
    pub host: Option<String>,
    pub username: Option<String>,
    /// Falls back to the configured default when absent.
    pub deploy_path: Option<String>,
    pub domain: Option<String>,
}

impl DeployForm {
    /// The error is the message returned with 400.
    pub fn into_config(self, default_deploy_path: &str) -> Result<DeploymentConfig, String> {
        let deploy_path = present(&self.deploy_path).unwrap_or(default_deploy_path);
        build_config(&self.host, &self.username, &self.domain, deploy_path)
    }
}

/// Body of `POST /api/deploy/setup-nginx`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NginxSetupForm {
    pub host: Option<String>,
    pub username: Option<String>,
    pub domain: Option<String>,
}

impl NginxSetupForm {
    /// The deploy path is not used by the nginx-only run.
    pub fn into_config(self, default_deploy_path: &str) -> Result<DeploymentConfig, String> {
        build_config(&self.host, &self.username, &self.domain, default_deploy_path)
    }
}

/// Body of `POST /api/deploy/test`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestForm {
    pub host: Option<String>,
    pub username: Option<String>,
}

impl ConnectionTestForm {
    pub fn login(&self) -> Result<RemoteLogin, String> {
        let (Some(host), Some(username)) = (present(&self.host), present(&self.username)) else {
            return Err(MISSING_LOGIN.to_string());
        };
        let login = RemoteLogin {
            host: host.to_string(),
            username: username.to_string(),
        };
        login.validate().map_err(|errors| errors.to_string())?;
        Ok(login)
    }
}
