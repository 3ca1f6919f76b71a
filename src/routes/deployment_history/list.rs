use crate::db::HistoryStore;
use crate::helpers::JsonResponse;
use actix_web::{get, web, HttpResponse, Result};

/// `GET /api/deployment-history`, most recent first.
#[tracing::instrument(name = "List deployment history", skip(store))]
#[get("")]
pub async fn list_handler(store: web::Data<dyn HistoryStore>) -> Result<HttpResponse> {
    let entries = store.list().await.map_err(|err| {
        tracing::error!("Failed to fetch deployment history: {}", err);
        JsonResponse::build()
            .set_error(err)
            .internal_server_error("Failed to get deployment history")
    })?;

    Ok(HttpResponse::Ok().json(entries))
}
