use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConfirmationOutcome, Store, StoreError};
use crate::domain::contact_message::{ContactMessage, ContactMessageBody};
use crate::domain::newsletter::{Newsletter, NewsletterContent, NewsletterStatus, NewsletterSubject};
use crate::domain::newsletter_tracking::NewsletterTracking;
use crate::domain::subscriber::{ConfirmationError, Subscriber};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;
use crate::domain::subscriber_status::SubscriberStatus;
use crate::domain::subscription_token::SubscriptionToken;

const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(name = "Running database migrations", skip(self))]
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    status: String,
    confirmation_token: Option<String>,
    confirmation_token_expires_at: Option<DateTime<Utc>>,
    unsubscribe_token: String,
    subscribed_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    unsubscribed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = StoreError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        Ok(Subscriber {
            id: row.id,
            email: SubscriberEmail::parse(row.email).map_err(StoreError::Corrupt)?,
            name: row
                .name
                .map(SubscriberName::parse)
                .transpose()
                .map_err(StoreError::Corrupt)?,
            status: SubscriberStatus::parse(row.status).map_err(StoreError::Corrupt)?,
            confirmation_token: row
                .confirmation_token
                .map(SubscriptionToken::parse)
                .transpose()
                .map_err(StoreError::Corrupt)?,
            confirmation_token_expires_at: row.confirmation_token_expires_at,
            unsubscribe_token: SubscriptionToken::parse(row.unsubscribe_token)
                .map_err(StoreError::Corrupt)?,
            subscribed_at: row.subscribed_at,
            confirmed_at: row.confirmed_at,
            unsubscribed_at: row.unsubscribed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NewsletterRow {
    id: Uuid,
    subject: String,
    content: String,
    status: String,
    scheduled_for: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NewsletterRow> for Newsletter {
    type Error = StoreError;

    fn try_from(row: NewsletterRow) -> Result<Self, Self::Error> {
        Ok(Newsletter {
            id: row.id,
            subject: NewsletterSubject::parse(row.subject).map_err(StoreError::Corrupt)?,
            content: NewsletterContent::parse(row.content).map_err(StoreError::Corrupt)?,
            status: NewsletterStatus::parse(row.status).map_err(StoreError::Corrupt)?,
            scheduled_for: row.scheduled_for,
            sent_at: row.sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TrackingRow {
    newsletter_id: Uuid,
    subscriber_id: Uuid,
    sent: bool,
    sent_at: Option<DateTime<Utc>>,
    opened: bool,
    opened_at: Option<DateTime<Utc>>,
    clicked: bool,
    clicked_at: Option<DateTime<Utc>>,
}

impl From<TrackingRow> for NewsletterTracking {
    fn from(row: TrackingRow) -> Self {
        NewsletterTracking {
            newsletter_id: row.newsletter_id,
            subscriber_id: row.subscriber_id,
            sent: row.sent,
            sent_at: row.sent_at,
            opened: row.opened,
            opened_at: row.opened_at,
            clicked: row.clicked,
            clicked_at: row.clicked_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContactMessageRow {
    id: Uuid,
    name: String,
    email: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContactMessageRow> for ContactMessage {
    type Error = StoreError;

    fn try_from(row: ContactMessageRow) -> Result<Self, Self::Error> {
        Ok(ContactMessage {
            id: row.id,
            name: SubscriberName::parse(row.name).map_err(StoreError::Corrupt)?,
            email: SubscriberEmail::parse(row.email).map_err(StoreError::Corrupt)?,
            message: ContactMessageBody::parse(row.message).map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PostgresStore {
    #[tracing::instrument(name = "Insert a new subscriber into the database", skip(self, subscriber))]
    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(subscriber.id)
        .bind(subscriber.email.as_ref())
        .bind(subscriber.name.as_ref().map(|name| name.as_ref()))
        .bind(subscriber.status.as_ref())
        .bind(subscriber.confirmation_token.as_ref().map(|token| token.as_ref()))
        .bind(subscriber.confirmation_token_expires_at)
        .bind(subscriber.unsubscribe_token.as_ref())
        .bind(subscriber.subscribed_at)
        .bind(subscriber.confirmed_at)
        .bind(subscriber.unsubscribed_at)
        .bind(subscriber.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict(subscriber.email.to_string())
            } else {
                StoreError::Database(err)
            }
        })?;

        Ok(())
    }

    #[tracing::instrument(name = "Update a subscriber in the database", skip(self, subscriber))]
    async fn update_subscriber_if_unchanged(
        &self,
        subscriber: &Subscriber,
        last_updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET name = $2, status = $3, confirmation_token = $4, confirmation_token_expires_at = $5,
                subscribed_at = $6, confirmed_at = $7, unsubscribed_at = $8, updated_at = $9
            WHERE id = $1 AND updated_at = $10
            "#,
        )
        .bind(subscriber.id)
        .bind(subscriber.name.as_ref().map(|name| name.as_ref()))
        .bind(subscriber.status.as_ref())
        .bind(subscriber.confirmation_token.as_ref().map(|token| token.as_ref()))
        .bind(subscriber.confirmation_token_expires_at)
        .bind(subscriber.subscribed_at)
        .bind(subscriber.confirmed_at)
        .bind(subscriber.unsubscribed_at)
        .bind(subscriber.updated_at)
        .bind(last_updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Get a subscriber by id", skip(self))]
    async fn find_subscriber_by_id(&self, id: Uuid) -> Result<Option<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r#"
            SELECT id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscriber::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Get a subscriber by email", skip(self, email))]
    async fn find_subscriber_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r#"
            SELECT id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            FROM subscriptions
            WHERE email = $1
            "#,
        )
        .bind(email.as_ref())
        .fetch_optional(&self.pool)
        .await?
        .map(Subscriber::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "List subscribers", skip(self))]
    async fn list_subscribers(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriberRow>(
            r#"
            SELECT id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            FROM subscriptions
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY subscribed_at ASC
            "#,
        )
        .bind(status.as_ref().map(|status| status.as_ref()))
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    #[tracing::instrument(name = "Confirm a pending subscriber", skip(self, token))]
    async fn confirm_subscriber(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, StoreError> {
        let confirmed = sqlx::query_as::<_, SubscriberRow>(
            r#"
            UPDATE subscriptions
            SET status = 'confirmed', confirmation_token = NULL, confirmation_token_expires_at = NULL,
                confirmed_at = $2, updated_at = $2
            WHERE confirmation_token = $1 AND status = 'pending' AND confirmation_token_expires_at > $2
            RETURNING id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            "#,
        )
        .bind(token.as_ref())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = confirmed {
            return Ok(ConfirmationOutcome::Confirmed(row.try_into()?));
        }

        // The update matched nothing: tell an expired token apart from an unknown one.
        let pending = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM subscriptions
            WHERE confirmation_token = $1 AND status = 'pending'
            "#,
        )
        .bind(token.as_ref())
        .fetch_optional(&self.pool)
        .await?;

        let reason = match pending {
            Some(_) => ConfirmationError::Expired,
            None => ConfirmationError::UnknownToken,
        };

        Ok(ConfirmationOutcome::Rejected(reason))
    }

    #[tracing::instrument(name = "Unsubscribe a subscriber by token", skip(self, token))]
    async fn unsubscribe_by_token(
        &self,
        token: &SubscriptionToken,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r#"
            UPDATE subscriptions
            SET unsubscribed_at = CASE WHEN status = 'unsubscribed' THEN unsubscribed_at ELSE $2 END,
                updated_at = CASE WHEN status = 'unsubscribed' THEN updated_at ELSE $2 END,
                status = 'unsubscribed', confirmation_token = NULL, confirmation_token_expires_at = NULL
            WHERE unsubscribe_token = $1
            RETURNING id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            "#,
        )
        .bind(token.as_ref())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscriber::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Unsubscribe a subscriber by id", skip(self))]
    async fn unsubscribe_by_id(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r#"
            UPDATE subscriptions
            SET unsubscribed_at = CASE WHEN status = 'unsubscribed' THEN unsubscribed_at ELSE $2 END,
                updated_at = CASE WHEN status = 'unsubscribed' THEN updated_at ELSE $2 END,
                status = 'unsubscribed', confirmation_token = NULL, confirmation_token_expires_at = NULL
            WHERE id = $1
            RETURNING id, email, name, status, confirmation_token, confirmation_token_expires_at,
                unsubscribe_token, subscribed_at, confirmed_at, unsubscribed_at, updated_at
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscriber::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Insert a newsletter into the database", skip(self, newsletter))]
    async fn insert_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO newsletters (id, subject, content, status, scheduled_for, sent_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(newsletter.id)
        .bind(newsletter.subject.as_ref())
        .bind(newsletter.content.as_ref())
        .bind(newsletter.status.as_ref())
        .bind(newsletter.scheduled_for)
        .bind(newsletter.sent_at)
        .bind(newsletter.created_at)
        .bind(newsletter.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Update an unsent newsletter", skip(self, newsletter))]
    async fn update_unsent_newsletter(&self, newsletter: &Newsletter) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE newsletters
            SET subject = $2, content = $3, status = $4, scheduled_for = $5, updated_at = $6
            WHERE id = $1 AND status <> 'sent'
            "#,
        )
        .bind(newsletter.id)
        .bind(newsletter.subject.as_ref())
        .bind(newsletter.content.as_ref())
        .bind(newsletter.status.as_ref())
        .bind(newsletter.scheduled_for)
        .bind(newsletter.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Get a newsletter by id", skip(self))]
    async fn find_newsletter(&self, id: Uuid) -> Result<Option<Newsletter>, StoreError> {
        sqlx::query_as::<_, NewsletterRow>(
            r#"
            SELECT id, subject, content, status, scheduled_for, sent_at, created_at, updated_at
            FROM newsletters
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Newsletter::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "List newsletters", skip(self))]
    async fn list_newsletters(&self) -> Result<Vec<Newsletter>, StoreError> {
        let rows = sqlx::query_as::<_, NewsletterRow>(
            r#"
            SELECT id, subject, content, status, scheduled_for, sent_at, created_at, updated_at
            FROM newsletters
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    #[tracing::instrument(name = "Claim a newsletter for sending", skip(self))]
    async fn mark_newsletter_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE newsletters
            SET status = 'sent', sent_at = $2, updated_at = $2
            WHERE id = $1 AND status <> 'sent'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Insert a newsletter tracking row", skip(self, tracking))]
    async fn insert_tracking(&self, tracking: &NewsletterTracking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO newsletter_tracking (
                newsletter_id, subscriber_id, sent, sent_at, opened, opened_at, clicked, clicked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (newsletter_id, subscriber_id) DO NOTHING
            "#,
        )
        .bind(tracking.newsletter_id)
        .bind(tracking.subscriber_id)
        .bind(tracking.sent)
        .bind(tracking.sent_at)
        .bind(tracking.opened)
        .bind(tracking.opened_at)
        .bind(tracking.clicked)
        .bind(tracking.clicked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Mark a newsletter as sent to a subscriber", skip(self))]
    async fn mark_tracking_sent(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE newsletter_tracking
            SET sent = TRUE, sent_at = COALESCE(sent_at, $3)
            WHERE newsletter_id = $1 AND subscriber_id = $2
            "#,
        )
        .bind(newsletter_id)
        .bind(subscriber_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Record a newsletter open", skip(self))]
    async fn record_open(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE newsletter_tracking
            SET opened = TRUE, opened_at = COALESCE(opened_at, $3)
            WHERE newsletter_id = $1 AND subscriber_id = $2
            "#,
        )
        .bind(newsletter_id)
        .bind(subscriber_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Record a newsletter click", skip(self))]
    async fn record_click(
        &self,
        newsletter_id: Uuid,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE newsletter_tracking
            SET opened = TRUE, opened_at = COALESCE(opened_at, $3),
                clicked = TRUE, clicked_at = COALESCE(clicked_at, $3)
            WHERE newsletter_id = $1 AND subscriber_id = $2
            "#,
        )
        .bind(newsletter_id)
        .bind(subscriber_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "List newsletter tracking rows", skip(self))]
    async fn list_tracking(&self, newsletter_id: Uuid) -> Result<Vec<NewsletterTracking>, StoreError> {
        let rows = sqlx::query_as::<_, TrackingRow>(
            r#"
            SELECT newsletter_id, subscriber_id, sent, sent_at, opened, opened_at, clicked, clicked_at
            FROM newsletter_tracking
            WHERE newsletter_id = $1
            "#,
        )
        .bind(newsletter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(NewsletterTracking::from).collect())
    }

    #[tracing::instrument(name = "Insert a contact message", skip(self, message))]
    async fn insert_contact_message(&self, message: &ContactMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contact_messages (id, name, email, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(message.name.as_ref())
        .bind(message.email.as_ref())
        .bind(message.message.as_ref())
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "List contact messages", skip(self))]
    async fn list_contact_messages(&self) -> Result<Vec<ContactMessage>, StoreError> {
        let rows = sqlx::query_as::<_, ContactMessageRow>(
            r#"
            SELECT id, name, email, message, created_at
            FROM contact_messages
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }
}
