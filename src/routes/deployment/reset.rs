use crate::deploy::Deployer;
use actix_web::{post, web, HttpResponse};
use serde_json::json;

/// `POST /api/deploy/reset`
#[tracing::instrument(name = "Reset deployment status", skip(deployer))]
#[post("/reset")]
pub async fn reset_handler(deployer: web::Data<Deployer>) -> HttpResponse {
    deployer.reset();
    HttpResponse::Ok().json(json!({
        "message": "Deployment status reset",
        "inProgress": false,
    }))
}
