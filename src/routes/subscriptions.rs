use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use chrono::{Duration, Utc};

use crate::domain::new_subscriber::{NewSubscriber, NewSubscriberBody};
use crate::domain::subscriber::{Subscriber, SubscriptionRequest};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscription_token::SubscriptionToken;
use crate::email_client::EmailClient;
use crate::routes::error_chain_fmt;
use crate::startup::{ApplicationBaseUrl, ConfirmationTokenTtl};
use crate::store::{Store, StoreError};

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    ValidationError(String),
    #[error("Failed to send a confirmation email.")]
    SendEmailError(#[from] reqwest::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SubscribeError::SendEmailError(_) | SubscribeError::UnexpectedError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Starts (or restarts) the double opt-in flow for an email address.
///
/// A new address answers `201`. A pending or unsubscribed one gets a fresh
/// confirmation link and `200`; a confirmed one is left alone with `200`.
#[tracing::instrument(
    name = "Adding a new subscriber",
    skip(body, store, email_client, base_url, token_ttl),
    fields(
        subscriber_email = %body.email,
        subscriber_name = ?body.name
    )
)]
pub async fn handle_create_subscription(
    body: web::Json<NewSubscriberBody>,
    store: web::Data<dyn Store>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<ApplicationBaseUrl>,
    token_ttl: web::Data<ConfirmationTokenTtl>,
) -> Result<HttpResponse, SubscribeError> {
    let new_subscriber: NewSubscriber = body.try_into().map_err(SubscribeError::ValidationError)?;

    let recorded = record_subscription_request(store.get_ref(), new_subscriber, token_ttl.0).await?;
    let (subscriber, status) = match recorded {
        RecordedRequest::Created(subscriber) => (subscriber, StatusCode::CREATED),
        RecordedRequest::Reissued(subscriber) => (subscriber, StatusCode::OK),
        RecordedRequest::AlreadyConfirmed => return Ok(HttpResponse::Ok().finish()),
    };

    let token = subscriber
        .confirmation_token
        .as_ref()
        .context("A pending subscriber has no confirmation token.")?;

    send_confirmation_email(&email_client, &subscriber.email, &base_url.0, token).await?;

    Ok(HttpResponse::build(status).finish())
}

const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug)]
enum RecordedRequest {
    Created(Subscriber),
    Reissued(Subscriber),
    AlreadyConfirmed,
}

/// Reads the record for the email and applies the request to it. Both
/// writes are conditional: a concurrent insert surfaces as a conflict and
/// a concurrent update (a confirmation, say) as a stale write, and either
/// way the record is read again.
#[tracing::instrument(name = "Recording a subscription request", skip(store, new_subscriber, token_ttl))]
async fn record_subscription_request(
    store: &dyn Store,
    new_subscriber: NewSubscriber,
    token_ttl: Duration,
) -> Result<RecordedRequest, anyhow::Error> {
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let now = Utc::now();
        let existing = store
            .find_subscriber_by_email(&new_subscriber.email)
            .await
            .context("Failed to look up the subscriber by email.")?;

        match existing {
            None => {
                let subscriber = Subscriber::new_pending(new_subscriber.clone(), token_ttl, now);

                match store.insert_subscriber(&subscriber).await {
                    Ok(()) => return Ok(RecordedRequest::Created(subscriber)),
                    Err(StoreError::Conflict(_)) => {
                        tracing::info!("The subscriber was created concurrently, reading it again");
                    }
                    Err(err) => {
                        return Err(anyhow::Error::new(err).context("Failed to store a new subscriber."))
                    }
                }
            }
            Some(mut subscriber) => {
                let last_updated_at = subscriber.updated_at;

                match subscriber.request_subscription(new_subscriber.name.clone(), token_ttl, now) {
                    SubscriptionRequest::AlreadyConfirmed => {
                        tracing::info!(subscriber_id = %subscriber.id, "Subscriber is already confirmed");
                        return Ok(RecordedRequest::AlreadyConfirmed);
                    }
                    SubscriptionRequest::ConfirmationRequired => {
                        let updated = store
                            .update_subscriber_if_unchanged(&subscriber, last_updated_at)
                            .await
                            .context("Failed to reissue the confirmation token.")?;
                        if updated {
                            return Ok(RecordedRequest::Reissued(subscriber));
                        }
                        tracing::info!(
                            subscriber_id = %subscriber.id,
                            "The subscriber changed concurrently, reading it again"
                        );
                    }
                }
            }
        }
    }

    anyhow::bail!("The subscriber kept changing while the request was being applied.")
}

#[tracing::instrument(
    name = "Send a confirmation email to a new subscriber",
    skip(email_client, recipient, base_url, token)
)]
async fn send_confirmation_email(
    email_client: &EmailClient,
    recipient: &SubscriberEmail,
    base_url: &str,
    token: &SubscriptionToken,
) -> Result<(), reqwest::Error> {
    let confirmation_link = format!("{}/subscriptions/confirm?token={}", base_url, token);
    let html_body = format!(
        r#"<div>
    <h1>Welcome to the newsletter!</h1>
    <p>Click <a href="{}">here</a> to confirm your subscription.</p>
</div>"#,
        confirmation_link
    );

    email_client
        .send_email(recipient, "Confirm your subscription", &html_body)
        .await
}
