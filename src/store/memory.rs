use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConfirmationOutcome, Store, StoreError};
use crate::domain::contact_message::ContactMessage;
use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_tracking::NewsletterTracking;
use crate::domain::subscriber::{ConfirmationError, Subscriber};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::subscription_token::SubscriptionToken;

/// Process-local store used when no database is configured. Every
/// operation runs under a single lock, so the multi-step ones are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    subscribers: HashMap<Uuid, Subscriber>,
    newsletters: HashMap<Uuid, Newsletter>,
    tracking: HashMap<(Uuid, Uuid), NewsletterTracking>,
    contact_messages: Vec<ContactMessage>,
}

impl State {
    fn subscriber_by_unsubscribe_token(&mut self, token: &SubscriptionToken) -> Option<&mut Subscriber> {
        self.subscribers
            .values_mut()
            .find(|subscriber| &subscriber.unsubscribe_token == token)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if state.subscribers.values().any(|existing| existing.email == subscriber.email) {
            return Err(StoreError::Conflict(subscriber.email.to_string()));
        }
        state.subscribers.insert(subscriber.id, subscriber.clone());

        Ok(())
    }

    async fn update_subscriber_if_unchanged(
        &self,
        subscriber: &Subscriber,
        last_updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;

        match state.subscribers.get_mut(&subscriber.id) {
            Some(existing) if existing.updated_at == last_updated_at => {
                *existing = subscriber.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_subscriber_by_id(&self, id: Uuid) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.state.read().await.subscribers.get(&id).cloned())
    }

    async fn find_subscriber_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, StoreError> {
        let state = self.state.read().await;

        Ok(state
            .subscribers
            .values()
            .find(|subscriber| &subscriber.email == email)
            .cloned())
    }

    async fn list_subscribers(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StoreError> {
        let state = self.state.read().await;
        let mut subscribers: Vec<Subscriber> = state
            .subscribers
            .values()
            .filter(|subscriber| status.map_or(true, |status| subscriber.status == status))
            .cloned()
            .collect();

        subscribers.sort_by_key(|subscriber| subscriber.subscribed_at);

        Ok(subscribers)
    }

    async fn confirm_subscriber(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, StoreError> {
        let mut state = self.state.write().await;
        let subscriber = state
            .subscribers
            .values_mut()
            .find(|subscriber| subscriber.confirmation_token.as_ref() == Some(token));

        let outcome = match subscriber {
            None => ConfirmationOutcome::Rejected(ConfirmationError::UnknownToken),
            Some(subscriber) => match subscriber.confirm(token, now) {
                Ok(()) => ConfirmationOutcome::Confirmed(subscriber.clone()),
                Err(err) => ConfirmationOutcome::Rejected(err),
            },
        };

        Ok(outcome)
    }

    async fn unsubscribe_by_token(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        let mut state = self.state.write().await;

        Ok(state.subscriber_by_unsubscribe_token(token).map(|subscriber| {
            subscriber.unsubscribe(now);
            subscriber.clone()
        }))
    }

    async fn unsubscribe_by_id(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        let mut state = self.state.write().await;

        Ok(state.subscribers.get_mut(&id).map(|subscriber| {
            subscriber.unsubscribe(now);
            subscriber.clone()
        }))
    }

    async fn insert_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.newsletters.insert(newsletter.id, newsletter.clone());

        Ok(())
    }

    async fn update_unsent_newsletter(&self, newsletter: &Newsletter) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;

        match state.newsletters.get_mut(&newsletter.id) {
            Some(existing) if !existing.status.is_sent() => {
                *existing = newsletter.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_newsletter(&self, id: Uuid) -> Result<Option<Newsletter>, StoreError> {
        Ok(self.state.read().await.newsletters.get(&id).cloned())
    }

    async fn list_newsletters(&self) -> Result<Vec<Newsletter>, StoreError> {
        let state = self.state.read().await;
        let mut newsletters: Vec<Newsletter> = state.newsletters.values().cloned().collect();

        newsletters.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(newsletters)
    }

    async fn mark_newsletter_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;

        Ok(state
            .newsletters
            .get_mut(&id)
            .map_or(false, |newsletter| newsletter.mark_sent(now).is_ok()))
    }

    async fn insert_tracking(&self, tracking: &NewsletterTracking) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .tracking
            .entry((tracking.newsletter_id, tracking.subscriber_id))
            .or_insert_with(|| tracking.clone());

        Ok(())
    }

    async fn mark_tracking_sent(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if let Some(tracking) = state.tracking.get_mut(&(newsletter_id, subscriber_id)) {
            tracking.mark_sent(now);
        }

        Ok(())
    }

    async fn record_open(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;

        match state.tracking.get_mut(&(newsletter_id, subscriber_id)) {
            Some(tracking) => {
                tracking.record_open(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_click(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;

        match state.tracking.get_mut(&(newsletter_id, subscriber_id)) {
            Some(tracking) => {
                tracking.record_click(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_tracking(&self, newsletter_id: Uuid) -> Result<Vec<NewsletterTracking>, StoreError> {
        let state = self.state.read().await;

        Ok(state
            .tracking
            .values()
            .filter(|tracking| tracking.newsletter_id == newsletter_id)
            .cloned()
            .collect())
    }

    async fn insert_contact_message(&self, message: &ContactMessage) -> Result<(), StoreError> {
        self.state.write().await.contact_messages.push(message.clone());

        Ok(())
    }

    async fn list_contact_messages(&self) -> Result<Vec<ContactMessage>, StoreError> {
        let state = self.state.read().await;
        let mut messages = state.contact_messages.clone();

        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(messages)
    }
}
