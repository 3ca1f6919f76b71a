use crate::db::HistoryStore;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::models::DeploymentHistoryEntry;
use actix_web::{post, web, HttpResponse, Result};
use serde_valid::Validate;

/// `POST /api/deployment-history`
#[tracing::instrument(name = "Add deployment history entry", skip(store))]
#[post("")]
pub async fn add_handler(
    form: web::Json<forms::HistoryEntryForm>,
    store: web::Data<dyn HistoryStore>,
) -> Result<HttpResponse> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::build()
            .set_error(errors)
            .bad_request("Invalid data"));
    }

    let entry: DeploymentHistoryEntry = form.into_inner().into();
    let entry = store.create(entry).await.map_err(|err| {
        tracing::error!("Failed to create deployment history entry: {}", err);
        JsonResponse::build()
            .set_error(err)
            .internal_server_error("Failed to create deployment history entry")
    })?;

    Ok(HttpResponse::Ok().json(entry))
}
