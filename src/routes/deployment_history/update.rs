use crate::db::{HistoryStore, StoreError};
use crate::forms;
use crate::helpers::JsonResponse;
use actix_web::{patch, web, HttpResponse, Result};
use serde_valid::Validate;
use uuid::Uuid;

/// `PATCH /api/deployment-history/{id}`
#[tracing::instrument(name = "Update deployment history entry", skip(store))]
#[patch("/{id}")]
pub async fn update_handler(
    path: web::Path<(String,)>,
    form: web::Json<forms::HistoryUpdateForm>,
    store: web::Data<dyn HistoryStore>,
) -> Result<HttpResponse> {
    // a malformed id can't name an existing entry
    let id = Uuid::parse_str(&path.0)
        .map_err(|_| JsonResponse::build().not_found("Deployment history entry not found"))?;

    if let Err(errors) = form.validate() {
        return Err(JsonResponse::build()
            .set_error(errors)
            .bad_request("Invalid data"));
    }

    let entry = store
        .update(id, form.into_inner().into())
        .await
        .map_err(|err| match err {
            StoreError::NotFound(_) => {
                JsonResponse::build().not_found("Deployment history entry not found")
            }
            err => {
                tracing::error!("Failed to update deployment history entry: {}", err);
                JsonResponse::build()
                    .set_error(err)
                    .internal_server_error("Failed to update deployment history entry")
            }
        })?;

    Ok(HttpResponse::Ok().json(entry))
}
