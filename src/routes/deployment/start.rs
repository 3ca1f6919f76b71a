use crate::deploy::{DeployError, Deployer};
use crate::forms;
use crate::models::DeploymentKind;
use crate::routes::deployment::event_stream_response;
use actix_web::{post, web, HttpResponse, Result};

/// `POST /api/deploy`
///
/// Full deployment. The response streams progress events until the run ends.
/// A busy guard answers 409 before the body is looked at.
#[tracing::instrument(name = "Start deployment", skip(deployer, form))]
#[post("")]
pub async fn start_handler(
    form: web::Json<forms::DeployForm>,
    deployer: web::Data<Deployer>,
) -> Result<HttpResponse> {
    let permit = deployer.acquire(DeploymentKind::Deployment)?;
    let config = form
        .into_inner()
        .into_config(&deployer.settings().default_deploy_path)
        .map_err(DeployError::Precondition)?;

    tracing::info!(host = %config.login.host, domain = %config.domain, "Deployment requested");
    let events = deployer
        .launch(permit, DeploymentKind::Deployment, config)
        .await?;

    Ok(event_stream_response(events))
}
