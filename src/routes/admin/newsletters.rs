use actix_web::{web, HttpResponse};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::AdminError;
use crate::authentication::AdminUser;
use crate::delivery::deliver_newsletter;
use crate::domain::newsletter::{Newsletter, NewsletterDraft};
use crate::domain::newsletter_tracking::TrackingStats;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::email_client::EmailClient;
use crate::startup::ApplicationBaseUrl;
use crate::store::Store;

#[derive(Deserialize, Debug)]
pub struct NewsletterBody {
    pub subject: String,
    pub content: String,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl NewsletterBody {
    fn into_draft(self, now: DateTime<Utc>) -> Result<NewsletterDraft, AdminError> {
        NewsletterDraft::parse(self.subject, self.content, self.scheduled_for, now)
            .map_err(AdminError::ValidationError)
    }
}

#[derive(serde::Serialize)]
struct NewsletterDetails {
    #[serde(flatten)]
    newsletter: Newsletter,
    stats: TrackingStats,
}

async fn find_newsletter(store: &dyn Store, id: Uuid) -> Result<Newsletter, AdminError> {
    store
        .find_newsletter(id)
        .await
        .context("Failed to fetch the newsletter.")?
        .ok_or(AdminError::NotFound("Newsletter"))
}

#[tracing::instrument(name = "Admin: list newsletters", skip(store))]
pub async fn admin_list_newsletters(
    admin: AdminUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let newsletters = store
        .list_newsletters()
        .await
        .context("Failed to list the newsletters.")?;

    Ok(HttpResponse::Ok().json(newsletters))
}

#[tracing::instrument(
    name = "Admin: create a newsletter",
    skip(body, store),
    fields(subject = %body.subject)
)]
pub async fn admin_create_newsletter(
    admin: AdminUser,
    body: web::Json<NewsletterBody>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let now = Utc::now();
    let newsletter = Newsletter::create(body.into_inner().into_draft(now)?, now);

    store
        .insert_newsletter(&newsletter)
        .await
        .context("Failed to store the newsletter.")?;

    Ok(HttpResponse::Created().json(newsletter))
}

#[tracing::instrument(name = "Admin: get a newsletter", skip(store))]
pub async fn admin_get_newsletter(
    admin: AdminUser,
    newsletter_id: web::Path<Uuid>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let newsletter = find_newsletter(store.get_ref(), newsletter_id.into_inner()).await?;
    let tracking = store
        .list_tracking(newsletter.id)
        .await
        .context("Failed to list the newsletter tracking rows.")?;
    let stats: TrackingStats = tracking.iter().collect();

    Ok(HttpResponse::Ok().json(NewsletterDetails { newsletter, stats }))
}

#[tracing::instrument(
    name = "Admin: update a newsletter",
    skip(body, store),
    fields(subject = %body.subject)
)]
pub async fn admin_update_newsletter(
    admin: AdminUser,
    newsletter_id: web::Path<Uuid>,
    body: web::Json<NewsletterBody>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AdminError> {
    let now = Utc::now();
    let mut newsletter = find_newsletter(store.get_ref(), newsletter_id.into_inner()).await?;
    let draft = body.into_inner().into_draft(now)?;

    newsletter
        .revise(draft, now)
        .map_err(|_| AdminError::AlreadySent)?;

    // Sending may have claimed the row since it was read.
    let updated = store
        .update_unsent_newsletter(&newsletter)
        .await
        .context("Failed to update the newsletter.")?;
    if !updated {
        return Err(AdminError::AlreadySent);
    }

    Ok(HttpResponse::Ok().json(newsletter))
}

/// Sends the newsletter to every confirmed subscriber. The newsletter is
/// claimed as sent before any email goes out, so a second request gets
/// `409` instead of delivering twice. Recipients are read before the claim,
/// so a failure there leaves the newsletter sendable.
#[tracing::instrument(name = "Admin: send a newsletter", skip(store, email_client, base_url))]
pub async fn admin_send_newsletter(
    admin: AdminUser,
    newsletter_id: web::Path<Uuid>,
    store: web::Data<dyn Store>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<ApplicationBaseUrl>,
) -> Result<HttpResponse, AdminError> {
    let newsletter = find_newsletter(store.get_ref(), newsletter_id.into_inner()).await?;
    if newsletter.status.is_sent() {
        return Err(AdminError::AlreadySent);
    }

    let recipients = store
        .list_subscribers(Some(SubscriberStatus::Confirmed))
        .await
        .context("Failed to list the confirmed subscribers.")?;

    let claimed = store
        .mark_newsletter_sent(newsletter.id, Utc::now())
        .await
        .context("Failed to claim the newsletter for sending.")?;
    if !claimed {
        return Err(AdminError::AlreadySent);
    }

    let report = deliver_newsletter(
        store.get_ref(),
        &email_client,
        &base_url.0,
        &newsletter,
        recipients,
    )
    .await;

    Ok(HttpResponse::Ok().json(report))
}
