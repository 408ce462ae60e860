//! Persistence port for subscribers, newsletters, tracking rows and
//! contact messages.
//!
//! Operations that enforce an invariant (single-use confirmation
//! tokens, a newsletter being sent once, first-touch tracking
//! timestamps) are single calls so each adapter can perform them as one
//! atomic write.

#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::contact_message::ContactMessage;
use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_tracking::NewsletterTracking;
use crate::domain::subscriber::{ConfirmationError, Subscriber};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::subscription_token::SubscriptionToken;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("A subscriber with email {0} already exists.")]
    Conflict(String),
    #[error("A stored record could not be parsed: {0}")]
    Corrupt(String),
    #[error("The database query failed.")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub enum ConfirmationOutcome {
    Confirmed(Subscriber),
    Rejected(ConfirmationError),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is already taken.
    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError>;

    /// Writes `subscriber` only when the stored row still carries
    /// `last_updated_at`. `false` means another write got there first and
    /// nothing was changed.
    async fn update_subscriber_if_unchanged(
        &self,
        subscriber: &Subscriber,
        last_updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn find_subscriber_by_id(&self, id: Uuid) -> Result<Option<Subscriber>, StoreError>;

    async fn find_subscriber_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, StoreError>;

    /// Oldest subscriptions first.
    async fn list_subscribers(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StoreError>;

    /// Confirms the pending subscriber owning `token` and invalidates the
    /// token in the same write.
    async fn confirm_subscriber(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, StoreError>;

    /// `None` when no subscriber owns the token.
    async fn unsubscribe_by_token(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError>;

    async fn unsubscribe_by_id(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError>;

    async fn insert_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError>;

    /// Returns `false` without writing when the stored newsletter was
    /// already sent.
    async fn update_unsent_newsletter(&self, newsletter: &Newsletter) -> Result<bool, StoreError>;

    async fn find_newsletter(&self, id: Uuid) -> Result<Option<Newsletter>, StoreError>;

    /// Newest first.
    async fn list_newsletters(&self) -> Result<Vec<Newsletter>, StoreError>;

    /// Claims the newsletter for delivery. Only the first caller gets
    /// `true`; every later call (or a missing newsletter) gets `false`.
    async fn mark_newsletter_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn insert_tracking(&self, tracking: &NewsletterTracking) -> Result<(), StoreError>;

    async fn mark_tracking_sent(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// `false` when there is no tracking row for the pair.
    async fn record_open(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Records a click and the implied open.
    async fn record_click(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn list_tracking(&self, newsletter_id: Uuid) -> Result<Vec<NewsletterTracking>, StoreError>;

    async fn insert_contact_message(&self, message: &ContactMessage) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_contact_messages(&self) -> Result<Vec<ContactMessage>, StoreError>;
}
