use actix_web::{web, HttpResponse};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::AdminError;
use crate::authentication::AdminUser;
use crate::domain::subscriber::Subscriber;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::store::Store;

#[derive(Deserialize, Debug)]
pub struct SubscriberFilter {
    pub status: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SubscriberStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub unsubscribed: usize,
}

impl<'a> FromIterator<&'a Subscriber> for SubscriberStats {
    fn from_iter<I: IntoIterator<Item = &'a Subscriber>>(subscribers: I) -> Self {
        subscribers
            .into_iter()
            .fold(SubscriberStats::default(), |mut stats, subscriber| {
                stats.total += 1;
                match subscriber.status {
                    SubscriberStatus::Pending => stats.pending += 1,
                    SubscriberStatus::Confirmed => stats.confirmed += 1,
                    SubscriberStatus::Unsubscribed => stats.unsubscribed += 1,
                }
                stats
            })
    }
}

#[tracing::instrument(name = "Admin: list subscribers", skip(store))]
pub async fn admin_list_subscribers(
    admin: AdminUser,
    filter: web::Query<SubscriberFilter>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let status = filter
        .into_inner()
        .status
        .map(SubscriberStatus::parse)
        .transpose()
        .map_err(AdminError::ValidationError)?;

    let subscribers = store
        .list_subscribers(status)
        .await
        .context("Failed to list the subscribers.")?;

    Ok(HttpResponse::Ok().json(subscribers))
}

#[tracing::instrument(name = "Admin: subscriber stats", skip(store))]
pub async fn admin_subscriber_stats(
    admin: AdminUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let subscribers = store
        .list_subscribers(None)
        .await
        .context("Failed to list the subscribers.")?;
    let stats: SubscriberStats = subscribers.iter().collect();

    Ok(HttpResponse::Ok().json(stats))
}

#[tracing::instrument(name = "Admin: unsubscribe a subscriber", skip(store))]
pub async fn admin_unsubscribe_subscriber(
    admin: AdminUser,
    subscriber_id: web::Path<Uuid>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let subscriber = store
        .unsubscribe_by_id(subscriber_id.into_inner(), Utc::now())
        .await
        .context("Failed to unsubscribe the subscriber.")?
        .ok_or(AdminError::NotFound("Subscriber"))?;

    Ok(HttpResponse::Ok().json(subscriber))
}
