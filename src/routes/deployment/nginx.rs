use crate::deploy::{DeployError, Deployer};
use crate::forms;
use crate::models::DeploymentKind;
use crate::routes::deployment::event_stream_response;
use actix_web::{post, web, HttpResponse, Result};

/// `POST /api/deploy/setup-nginx`
#[tracing::instrument(name = "Start nginx and SSL setup", skip(deployer, form))]
#[post("/setup-nginx")]
pub async fn setup_nginx_handler(
    form: web::Json<forms::NginxSetupForm>,
    deployer: web::Data<Deployer>,
) -> Result<HttpResponse> {
    let permit = deployer.acquire(DeploymentKind::NginxConfig)?;
    let config = form
        .into_inner()
        .into_config(&deployer.settings().default_deploy_path)
        .map_err(DeployError::Precondition)?;

    let events = deployer
        .launch(permit, DeploymentKind::NginxConfig, config)
        .await?;

    Ok(event_stream_response(events))
}
