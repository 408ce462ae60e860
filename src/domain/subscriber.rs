use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::new_subscriber::NewSubscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::subscription_token::SubscriptionToken;

/// A newsletter subscription record. Rows are never deleted, only moved
/// between statuses.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
    pub status: SubscriberStatus,
    #[serde(skip_serializing)]
    pub confirmation_token: Option<SubscriptionToken>,
    #[serde(skip_serializing)]
    pub confirmation_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub unsubscribe_token: SubscriptionToken,
    pub subscribed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// What a subscribe request against an existing record amounts to.
#[derive(Debug, PartialEq, Eq)]
pub enum SubscriptionRequest {
    /// A fresh confirmation token was issued and has to be emailed.
    ConfirmationRequired,
    AlreadyConfirmed,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    #[error("The confirmation token is not associated with a pending subscriber.")]
    UnknownToken,
    #[error("The confirmation token has expired.")]
    Expired,
}

impl Subscriber {
    pub fn new_pending(new_subscriber: NewSubscriber, token_ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: new_subscriber.email,
            name: new_subscriber.name,
            status: SubscriberStatus::Pending,
            confirmation_token: Some(SubscriptionToken::generate()),
            confirmation_token_expires_at: Some(now + token_ttl),
            unsubscribe_token: SubscriptionToken::generate(),
            subscribed_at: now,
            confirmed_at: None,
            unsubscribed_at: None,
            updated_at: now,
        }
    }

    /// Applies a repeated subscribe request. Pending and unsubscribed
    /// records go (back) to pending with a new confirmation token; a
    /// confirmed record is left untouched.
    pub fn request_subscription(
        &mut self,
        name: Option<SubscriberName>,
        token_ttl: Duration,
        now: DateTime<Utc>,
    ) -> SubscriptionRequest {
        if self.status.is_confirmed() {
            return SubscriptionRequest::AlreadyConfirmed;
        }

        if name.is_some() {
            self.name = name;
        }
        if self.status.is_unsubscribed() {
            self.subscribed_at = now;
            self.unsubscribed_at = None;
        }
        self.status = SubscriberStatus::Pending;
        self.confirmation_token = Some(SubscriptionToken::generate());
        self.confirmation_token_expires_at = Some(now + token_ttl);
        self.updated_at = now;

        SubscriptionRequest::ConfirmationRequired
    }

    /// Consumes the confirmation token. On success the token is cleared so
    /// the same link cannot be used twice.
    pub fn confirm(&mut self, token: &SubscriptionToken, now: DateTime<Utc>) -> Result<(), ConfirmationError> {
        if !self.status.is_pending() || self.confirmation_token.as_ref() != Some(token) {
            return Err(ConfirmationError::UnknownToken);
        }
        if self.is_confirmation_expired(now) {
            return Err(ConfirmationError::Expired);
        }

        self.status = SubscriberStatus::Confirmed;
        self.confirmation_token = None;
        self.confirmation_token_expires_at = None;
        self.confirmed_at = Some(now);
        self.updated_at = now;

        Ok(())
    }

    /// Idempotent: unsubscribing twice keeps the first timestamp.
    pub fn unsubscribe(&mut self, now: DateTime<Utc>) {
        if self.status.is_unsubscribed() {
            return;
        }

        self.status = SubscriberStatus::Unsubscribed;
        self.confirmation_token = None;
        self.confirmation_token_expires_at = None;
        self.unsubscribed_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_confirmation_expired(&self, now: DateTime<Utc>) -> bool {
        match self.confirmation_token_expires_at {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }
}
