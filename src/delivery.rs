//! Rendering and dispatch of newsletter issues.
//!
//! Each recipient gets a personalised copy: links in the HTML are routed
//! through the click-tracking endpoint, an unsubscribe footer is appended
//! and a tracking pixel records the open.

use chrono::Utc;
use linkify::{LinkFinder, LinkKind};
use url::form_urlencoded;
use uuid::Uuid;

use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_tracking::NewsletterTracking;
use crate::domain::subscriber::Subscriber;
use crate::domain::subscription_token::SubscriptionToken;
use crate::email_client::EmailClient;
use crate::routes::error_chain_fmt;
use crate::store::{Store, StoreError};

#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub fn open_tracking_url(base_url: &str, newsletter_id: Uuid, subscriber_id: Uuid) -> String {
    format!("{}/newsletters/{}/open/{}", base_url, newsletter_id, subscriber_id)
}

pub fn click_tracking_url(base_url: &str, newsletter_id: Uuid, subscriber_id: Uuid, target: &str) -> String {
    let encoded_target: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();

    format!(
        "{}/newsletters/{}/click/{}?url={}",
        base_url, newsletter_id, subscriber_id, encoded_target
    )
}

pub fn unsubscribe_url(base_url: &str, unsubscribe_token: &SubscriptionToken) -> String {
    format!("{}/subscriptions/unsubscribe?token={}", base_url, unsubscribe_token)
}

/// Undoes the entity escaping HTML allows inside attribute values, so
/// `?a=1&amp;b=2` is tracked as `?a=1&b=2`.
fn decode_html_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Replaces every `href` pointing at an http(s) URL. URLs that only appear
/// in the text are left alone. `rewrite` gets the decoded target.
fn rewrite_links(content: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut output = String::with_capacity(content.len());
    let mut copied_until = 0;

    for link in finder.links(content) {
        let before = &content[..link.start()];
        let is_href = before.ends_with("href=\"") || before.ends_with("href='");
        let is_web = link.as_str().starts_with("http://") || link.as_str().starts_with("https://");

        if is_href && is_web {
            output.push_str(&content[copied_until..link.start()]);
            output.push_str(&rewrite(&decode_html_entities(link.as_str())));
            copied_until = link.end();
        }
    }
    output.push_str(&content[copied_until..]);

    output
}

pub fn render_newsletter(base_url: &str, newsletter: &Newsletter, subscriber: &Subscriber) -> String {
    let body = rewrite_links(newsletter.content.as_ref(), |target| {
        click_tracking_url(base_url, newsletter.id, subscriber.id, target)
    });

    format!(
        r#"{body}
<hr />
<p style="font-size:12px;color:#888888">You are receiving this email because you subscribed to the newsletter. <a href="{unsubscribe}">Unsubscribe</a></p>
<img src="{pixel}" width="1" height="1" alt="" style="border:0" />"#,
        body = body,
        unsubscribe = unsubscribe_url(base_url, &subscriber.unsubscribe_token),
        pixel = open_tracking_url(base_url, newsletter.id, subscriber.id),
    )
}

/// Sends `newsletter` to each of `recipients`. Any failure for one
/// recipient, whether storing its tracking row or reaching the email
/// provider, is logged and counted and the run moves on.
#[tracing::instrument(
    name = "Delivering a newsletter issue",
    skip(store, email_client, base_url, newsletter, recipients),
    fields(newsletter_id = %newsletter.id, recipients = recipients.len())
)]
pub async fn deliver_newsletter(
    store: &dyn Store,
    email_client: &EmailClient,
    base_url: &str,
    newsletter: &Newsletter,
    recipients: Vec<Subscriber>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for subscriber in recipients {
        report.recipients += 1;

        match deliver_to(store, email_client, base_url, newsletter, &subscriber).await {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                tracing::warn!(
                    error.cause_chain = ?err,
                    subscriber_id = %subscriber.id,
                    "Failed to deliver the newsletter issue to a subscriber"
                );
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        recipients = report.recipients,
        delivered = report.delivered,
        failed = report.failed,
        "Newsletter issue delivered"
    );

    report
}

#[derive(thiserror::Error)]
enum DeliveryError {
    #[error("Failed to record the delivery.")]
    Store(#[from] StoreError),
    #[error("Failed to send the email.")]
    SendEmail(#[from] reqwest::Error),
}

impl std::fmt::Debug for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

async fn deliver_to(
    store: &dyn Store,
    email_client: &EmailClient,
    base_url: &str,
    newsletter: &Newsletter,
    subscriber: &Subscriber,
) -> Result<(), DeliveryError> {
    store
        .insert_tracking(&NewsletterTracking::new(newsletter.id, subscriber.id))
        .await?;

    let html = render_newsletter(base_url, newsletter, subscriber);
    email_client
        .send_email(&subscriber.email, newsletter.subject.as_ref(), &html)
        .await?;

    store
        .mark_tracking_sent(newsletter.id, subscriber.id, Utc::now())
        .await?;

    Ok(())
}
