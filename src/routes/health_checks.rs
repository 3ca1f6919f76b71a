use actix_web::{get, HttpResponse};
use chrono::Utc;
use serde_json::json;

#[get("")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// `GET /api/health`, public.
#[get("/health")]
pub async fn api_health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}
