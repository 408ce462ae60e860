use actix_web::http::header::{self, CacheControl, CacheDirective};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::store::Store;

/// 1x1 transparent GIF.
const TRACKING_PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Deserialize, Debug)]
pub struct ClickParameters {
    pub url: Option<String>,
}

fn parse_ids(raw: &(String, String)) -> Option<(Uuid, Uuid)> {
    let newsletter_id = Uuid::parse_str(&raw.0).ok()?;
    let subscriber_id = Uuid::parse_str(&raw.1).ok()?;

    Some((newsletter_id, subscriber_id))
}

/// Only absolute http(s) URLs are followed.
fn parse_redirect_target(raw: Option<&str>) -> Option<Url> {
    let url = Url::parse(raw?).ok()?;

    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Serves the tracking pixel. The image is returned for any path so a
/// mail client never shows a broken image.
#[tracing::instrument(name = "Record a newsletter open", skip(path, store))]
pub async fn handle_open(path: web::Path<(String, String)>, store: web::Data<dyn Store>) -> HttpResponse {
    if let Some((newsletter_id, subscriber_id)) = parse_ids(&path) {
        match store.record_open(newsletter_id, subscriber_id, Utc::now()).await {
            Ok(true) => tracing::info!(%newsletter_id, %subscriber_id, "Open recorded"),
            Ok(false) => tracing::debug!(%newsletter_id, %subscriber_id, "No tracking row for open"),
            Err(err) => tracing::warn!(error.cause_chain = ?err, "Failed to record an open"),
        }
    }

    HttpResponse::Ok()
        .content_type("image/gif")
        .insert_header(CacheControl(vec![
            CacheDirective::NoCache,
            CacheDirective::NoStore,
            CacheDirective::MustRevalidate,
        ]))
        .insert_header((header::PRAGMA, "no-cache"))
        .insert_header((header::EXPIRES, "0"))
        .body(TRACKING_PIXEL.to_vec())
}

#[tracing::instrument(name = "Record a newsletter click", skip(path, parameters, store))]
pub async fn handle_click(
    path: web::Path<(String, String)>,
    parameters: web::Query<ClickParameters>,
    store: web::Data<dyn Store>,
) -> HttpResponse {
    let target = match parse_redirect_target(parameters.url.as_deref()) {
        Some(target) => target,
        None => return HttpResponse::BadRequest().finish(),
    };

    if let Some((newsletter_id, subscriber_id)) = parse_ids(&path) {
        match store.record_click(newsletter_id, subscriber_id, Utc::now()).await {
            Ok(true) => tracing::info!(%newsletter_id, %subscriber_id, "Click recorded"),
            Ok(false) => tracing::debug!(%newsletter_id, %subscriber_id, "No tracking row for click"),
            Err(err) => tracing::warn!(error.cause_chain = ?err, "Failed to record a click"),
        }
    }

    HttpResponse::Found()
        .insert_header((header::LOCATION, target.as_str()))
        .finish()
}
