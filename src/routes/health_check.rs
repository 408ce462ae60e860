use actix_web::HttpResponse;

/// Liveness check: answers `200` as long as the server accepts requests.
#[tracing::instrument(name = "Health check")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
