use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use chrono::Utc;

use crate::domain::contact_message::{ContactFormBody, ContactMessage};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::EmailClient;
use crate::routes::error_chain_fmt;
use crate::startup::ContactNotification;
use crate::store::Store;

#[derive(thiserror::Error)]
pub enum ContactError {
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for ContactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ContactError {
    fn status_code(&self) -> StatusCode {
        match self {
            ContactError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ContactError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[tracing::instrument(
    name = "Receiving a contact message",
    skip(body, store, email_client, notification),
    fields(sender_email = %body.email)
)]
pub async fn handle_contact(
    body: web::Json<ContactFormBody>,
    store: web::Data<dyn Store>,
    email_client: web::Data<EmailClient>,
    notification: web::Data<ContactNotification>,
) -> Result<HttpResponse, ContactError> {
    let message = ContactMessage::parse(body, Utc::now()).map_err(ContactError::ValidationError)?;

    store
        .insert_contact_message(&message)
        .await
        .context("Failed to store the contact message.")?;

    // The message is already stored, so a failed notification only gets logged.
    if let Some(recipient) = &notification.recipient {
        if let Err(err) = notify_owner(&email_client, recipient, &message).await {
            tracing::warn!(
                error.cause_chain = ?err,
                message_id = %message.id,
                "Failed to forward the contact message"
            );
        }
    }

    Ok(HttpResponse::Created().json(&message))
}

#[tracing::instrument(name = "Forward a contact message", skip(email_client, recipient, message))]
async fn notify_owner(
    email_client: &EmailClient,
    recipient: &SubscriberEmail,
    message: &ContactMessage,
) -> Result<(), reqwest::Error> {
    let subject = format!("New contact message from {}", message.name.as_ref());
    let html_body = format!(
        "<p><strong>{}</strong> &lt;{}&gt; wrote:</p>\n<p>{}</p>",
        escape_html(message.name.as_ref()),
        escape_html(message.email.as_ref()),
        escape_html(message.message.as_ref()).replace('\n', "<br />")
    );

    email_client.send_email(recipient, &subject, &html_body).await
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());

    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}
