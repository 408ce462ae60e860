use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ConfirmationOutcome, MemoryStore, Store, StoreError};
use crate::domain::contact_message::ContactMessage;
use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_tracking::NewsletterTracking;
use crate::domain::subscriber::Subscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::subscription_token::SubscriptionToken;

/// A [`MemoryStore`] that misbehaves on request: email lookups can miss
/// rows that exist, and tracking writes can fail for chosen subscribers.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    missed_email_lookups: AtomicUsize,
    failing_tracking_for: HashSet<Uuid>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` email lookups answer `None`.
    pub fn miss_email_lookups(self, count: usize) -> Self {
        self.missed_email_lookups.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_tracking_for(mut self, subscriber_id: Uuid) -> Self {
        self.failing_tracking_for.insert(subscriber_id);
        self
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        self.inner.insert_subscriber(subscriber).await
    }

    async fn update_subscriber_if_unchanged(
        &self,
        subscriber: &Subscriber,
        last_updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .update_subscriber_if_unchanged(subscriber, last_updated_at)
            .await
    }

    async fn find_subscriber_by_id(&self, id: Uuid) -> Result<Option<Subscriber>, StoreError> {
        self.inner.find_subscriber_by_id(id).await
    }

    async fn find_subscriber_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, StoreError> {
        let missed = self
            .missed_email_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }

        self.inner.find_subscriber_by_email(email).await
    }

    async fn list_subscribers(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StoreError> {
        self.inner.list_subscribers(status).await
    }

    async fn confirm_subscriber(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, StoreError> {
        self.inner.confirm_subscriber(token, now).await
    }

    async fn unsubscribe_by_token(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        self.inner.unsubscribe_by_token(token, now).await
    }

    async fn unsubscribe_by_id(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        self.inner.unsubscribe_by_id(id, now).await
    }

    async fn insert_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError> {
        self.inner.insert_newsletter(newsletter).await
    }

    async fn update_unsent_newsletter(&self, newsletter: &Newsletter) -> Result<bool, StoreError> {
        self.inner.update_unsent_newsletter(newsletter).await
    }

    async fn find_newsletter(&self, id: Uuid) -> Result<Option<Newsletter>, StoreError> {
        self.inner.find_newsletter(id).await
    }

    async fn list_newsletters(&self) -> Result<Vec<Newsletter>, StoreError> {
        self.inner.list_newsletters().await
    }

    async fn mark_newsletter_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.mark_newsletter_sent(id, now).await
    }

    async fn insert_tracking(&self, tracking: &NewsletterTracking) -> Result<(), StoreError> {
        if self.failing_tracking_for.contains(&tracking.subscriber_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        self.inner.insert_tracking(tracking).await
    }

    async fn mark_tracking_sent(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .mark_tracking_sent(newsletter_id, subscriber_id, now)
            .await
    }

    async fn record_open(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.record_open(newsletter_id, subscriber_id, now).await
    }

    async fn record_click(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.record_click(newsletter_id, subscriber_id, now).await
    }

    async fn list_tracking(&self, newsletter_id: Uuid) -> Result<Vec<NewsletterTracking>, StoreError> {
        self.inner.list_tracking(newsletter_id).await
    }

    async fn insert_contact_message(&self, message: &ContactMessage) -> Result<(), StoreError> {
        self.inner.insert_contact_message(message).await
    }

    async fn list_contact_messages(&self) -> Result<Vec<ContactMessage>, StoreError> {
        self.inner.list_contact_messages().await
    }
}
