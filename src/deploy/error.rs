use crate::db::StoreError;
use crate::deploy::fsm::Phase;
use crate::helpers::ssh_client::SshError;
use crate::helpers::JsonResponse;
use crate::models::DeploymentKind;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Bad or missing input, rejected before any side effect.
    #[error("{0}")]
    Precondition(String),
    /// Another run holds the guard.
    #[error("{}", conflict_message(*.0))]
    Conflict(DeploymentKind),
    #[error("{message}")]
    Step { phase: Phase, message: String },
    #[error("{message}")]
    Advisory { phase: Phase, message: String },
    /// The client went away while the run kept going.
    #[error("progress stream closed by client: {0}")]
    Transport(String),
    #[error(transparent)]
    Remote(#[from] SshError),
    #[error("Failed to record deployment history: {0}")]
    History(#[from] StoreError),
}

fn conflict_message(kind: DeploymentKind) -> &'static str {
    match kind {
        DeploymentKind::Deployment => {
            "Deployment already in progress. Please wait or reset the deployment status."
        }
        DeploymentKind::NginxConfig => "Deployment in progress. Please wait.",
    }
}

impl ResponseError for DeployError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Precondition(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            Self::Precondition(_) | Self::Conflict(_) => {
                JsonResponse::build().to_response(status, self.to_string())
            }
            Self::History(_) => JsonResponse::build()
                .set_error(self)
                .to_response(status, "Failed to start deployment"),
            _ => JsonResponse::build()
                .set_error(self)
                .to_response(status, "Deployment failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409_with_message() {
        let err = DeployError::Conflict(DeploymentKind::Deployment);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().starts_with("Deployment already in progress"));

        let err = DeployError::Conflict(DeploymentKind::NginxConfig);
        assert_eq!(err.to_string(), "Deployment in progress. Please wait.");
    }

    #[test]
    fn precondition_maps_to_400() {
        let err = DeployError::Precondition("Host and username are required".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn remote_failures_are_500() {
        let err = DeployError::from(SshError::MissingCredentials);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
