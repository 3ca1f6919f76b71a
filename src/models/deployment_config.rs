use serde::Serialize;
use serde_valid::Validate;

/// SSH login of a run or a connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
pub struct RemoteLogin {
    #[validate(pattern = r"^[A-Za-z0-9.\-:\[\]]+$")]
    pub host: String,
    #[validate(pattern = r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$")]
    pub username: String,
}

/// Connection and target parameters of one run. Credentials are never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    #[serde(flatten)]
    #[validate]
    pub login: RemoteLogin,
    #[validate(pattern = r"^/[^\x00]*$")]
    #[validate(custom(no_parent_segments))]
    pub deploy_path: String,
    #[validate(max_length = 253)]
    #[validate(pattern = r"^([A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$")]
    pub domain: String,
}

fn no_parent_segments(path: &str) -> Result<(), serde_valid::validation::Error> {
    if path.split('/').any(|part| part == "..") {
        return Err(serde_valid::validation::Error::Custom(
            "path must not contain '..' segments".to_string(),
        ));
    }
    Ok(())
}

impl DeploymentConfig {
    pub fn live_url(&self) -> String {
        format!("https://{}", self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(domain: &str, deploy_path: &str) -> DeploymentConfig {
        DeploymentConfig {
            login: RemoteLogin {
                host: "203.0.113.7".to_string(),
                username: "deploy".to_string(),
            },
            deploy_path: deploy_path.to_string(),
            domain: domain.to_string(),
        }
    }

    #[test]
    fn live_url_is_https() {
        assert_eq!(config("example.com", "/srv").live_url(), "https://example.com");
    }

    #[test]
    fn nested_login_is_validated() {
        let mut bad = config("example.com", "/srv");
        bad.login.username = "root; reboot".to_string();
        assert!(bad.validate().is_err());
        assert!(config("example.com", "/srv").validate().is_ok());
    }

    #[test]
    fn parent_segments_are_rejected() {
        assert!(config("example.com", "/var/www/../etc").validate().is_err());
        assert!(config("example.com", "/var/www/..app").validate().is_ok());
    }

    #[test]
    fn serializes_flat() {
        let value = serde_json::to_value(config("example.com", "/srv")).unwrap();
        assert_eq!(value["host"], "203.0.113.7");
        assert_eq!(value["deployPath"], "/srv");
    }
}
