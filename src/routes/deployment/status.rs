use crate::deploy::Deployer;
use actix_web::{get, web, HttpResponse};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatusResponse {
    pub in_progress: bool,
}

/// `GET /api/deploy/status`
///
/// Only the guard flag is visible here, not the live events of a run.
#[tracing::instrument(name = "Get deployment status", skip(deployer))]
#[get("/status")]
pub async fn status_handler(deployer: web::Data<Deployer>) -> HttpResponse {
    HttpResponse::Ok().json(DeploymentStatusResponse {
        in_progress: deployer.in_progress(),
    })
}
