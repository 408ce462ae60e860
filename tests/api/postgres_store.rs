//! Store tests against a real database. Each test creates its own
//! database, so they need a Postgres reachable with the settings in
//! `config/`: `cargo test -- --ignored`.
use chrono::{Duration, SubsecRound, Utc};
use claim::{assert_matches, assert_none};
use sqlx::{Connection, Executor, PgConnection};
use uuid::Uuid;

use portfolio_newsletter::config::{get_configuration, DatabaseSettings};
use portfolio_newsletter::domain::new_subscriber::NewSubscriber;
use portfolio_newsletter::domain::newsletter::{Newsletter, NewsletterDraft};
use portfolio_newsletter::domain::newsletter_tracking::NewsletterTracking;
use portfolio_newsletter::domain::subscriber::{ConfirmationError, Subscriber};
use portfolio_newsletter::domain::subscriber_email::SubscriberEmail;
use portfolio_newsletter::domain::subscriber_status::SubscriberStatus;
use portfolio_newsletter::domain::subscription_token::SubscriptionToken;
use portfolio_newsletter::startup::get_connection_db_pool;
use portfolio_newsletter::store::{ConfirmationOutcome, PostgresStore, Store, StoreError};

async fn configure_db(db_config: &mut DatabaseSettings) -> PostgresStore {
    let db_test_name = format!("test_{}", Uuid::new_v4().simple());

    let mut connection = PgConnection::connect_with(&db_config.get_db_options())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    db_config.name = db_test_name;

    let store = PostgresStore::new(get_connection_db_pool(db_config));
    store.migrate().await.expect("Failed to migrate the database.");

    store
}

async fn spawn_store() -> PostgresStore {
    let mut config = get_configuration().expect("Missing configuration file.");

    configure_db(&mut config.database).await
}

// Postgres keeps microseconds, so timestamps compared after a round trip
// are truncated first.
fn now() -> chrono::DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn pending_subscriber(email: &str, ttl: Duration) -> Subscriber {
    let new_subscriber = NewSubscriber {
        email: SubscriberEmail::parse(email.to_string()).unwrap(),
        name: None,
    };

    Subscriber::new_pending(new_subscriber, ttl, now())
}

async fn stored_newsletter(store: &PostgresStore) -> Newsletter {
    let draft = NewsletterDraft::parse("Issue #1".into(), "<p>Body</p>".into(), None, now()).unwrap();
    let newsletter = Newsletter::create(draft, now());
    store.insert_newsletter(&newsletter).await.unwrap();

    newsletter
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn duplicate_emails_are_a_conflict() {
    let store = spawn_store().await;

    store
        .insert_subscriber(&pending_subscriber("frank@test.com", Duration::hours(24)))
        .await
        .unwrap();
    let result = store
        .insert_subscriber(&pending_subscriber("frank@test.com", Duration::hours(24)))
        .await;

    assert_matches!(result, Err(StoreError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn confirmation_tokens_are_single_use() {
    let store = spawn_store().await;
    let subscriber = pending_subscriber("frank@test.com", Duration::hours(24));
    let token = subscriber.confirmation_token.clone().unwrap();
    store.insert_subscriber(&subscriber).await.unwrap();

    let first = store.confirm_subscriber(&token, now()).await.unwrap();
    let second = store.confirm_subscriber(&token, now()).await.unwrap();

    assert_matches!(first, ConfirmationOutcome::Confirmed(_));
    assert_matches!(
        second,
        ConfirmationOutcome::Rejected(ConfirmationError::UnknownToken)
    );
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn expired_tokens_are_told_apart_from_unknown_ones() {
    let store = spawn_store().await;
    let subscriber = pending_subscriber("frank@test.com", Duration::hours(1));
    let token = subscriber.confirmation_token.clone().unwrap();
    store.insert_subscriber(&subscriber).await.unwrap();

    let expired = store
        .confirm_subscriber(&token, now() + Duration::hours(2))
        .await
        .unwrap();
    let unknown = store
        .confirm_subscriber(&SubscriptionToken::generate(), now())
        .await
        .unwrap();

    assert_matches!(expired, ConfirmationOutcome::Rejected(ConfirmationError::Expired));
    assert_matches!(unknown, ConfirmationOutcome::Rejected(ConfirmationError::UnknownToken));
    let stored = store.find_subscriber_by_id(subscriber.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriberStatus::Pending);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn stale_subscriber_updates_are_not_written() {
    let store = spawn_store().await;
    let subscriber = pending_subscriber("frank@test.com", Duration::hours(24));
    let token = subscriber.confirmation_token.clone().unwrap();
    store.insert_subscriber(&subscriber).await.unwrap();

    let mut stale = store.find_subscriber_by_id(subscriber.id).await.unwrap().unwrap();
    let last_updated_at = stale.updated_at;
    store
        .confirm_subscriber(&token, now() + Duration::seconds(1))
        .await
        .unwrap();
    stale.request_subscription(None, Duration::hours(24), now() + Duration::seconds(2));

    let stale_write = store
        .update_subscriber_if_unchanged(&stale, last_updated_at)
        .await
        .unwrap();

    assert!(!stale_write);
    let stored = store.find_subscriber_by_id(subscriber.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriberStatus::Confirmed);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn fresh_subscriber_updates_are_written() {
    let store = spawn_store().await;
    let subscriber = pending_subscriber("frank@test.com", Duration::hours(24));
    store.insert_subscriber(&subscriber).await.unwrap();

    let mut current = store.find_subscriber_by_id(subscriber.id).await.unwrap().unwrap();
    let last_updated_at = current.updated_at;
    current.request_subscription(None, Duration::hours(24), now() + Duration::seconds(1));

    assert!(store
        .update_subscriber_if_unchanged(&current, last_updated_at)
        .await
        .unwrap());
    let stored = store.find_subscriber_by_id(subscriber.id).await.unwrap().unwrap();
    assert_eq!(stored.confirmation_token, current.confirmation_token);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn subscribers_are_filtered_by_status() {
    let store = spawn_store().await;
    let pending = pending_subscriber("pending@test.com", Duration::hours(24));
    let confirmed = pending_subscriber("confirmed@test.com", Duration::hours(24));
    let token = confirmed.confirmation_token.clone().unwrap();
    store.insert_subscriber(&pending).await.unwrap();
    store.insert_subscriber(&confirmed).await.unwrap();
    store.confirm_subscriber(&token, now()).await.unwrap();

    let listed = store
        .list_subscribers(Some(SubscriberStatus::Confirmed))
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, confirmed.id);
    assert_eq!(store.list_subscribers(None).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn newsletters_are_claimed_for_sending_once() {
    let store = spawn_store().await;
    let newsletter = stored_newsletter(&store).await;

    assert!(store.mark_newsletter_sent(newsletter.id, now()).await.unwrap());
    assert!(!store.mark_newsletter_sent(newsletter.id, now()).await.unwrap());
    assert!(!store.update_unsent_newsletter(&newsletter).await.unwrap());
    assert!(!store.mark_newsletter_sent(Uuid::new_v4(), now()).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn tracking_keeps_the_first_open_and_click() {
    let store = spawn_store().await;
    let subscriber = pending_subscriber("frank@test.com", Duration::hours(24));
    store.insert_subscriber(&subscriber).await.unwrap();
    let newsletter = stored_newsletter(&store).await;
    store
        .insert_tracking(&NewsletterTracking::new(newsletter.id, subscriber.id))
        .await
        .unwrap();

    let first_touch = now();
    let later = first_touch + Duration::minutes(5);
    assert!(store.record_click(newsletter.id, subscriber.id, first_touch).await.unwrap());
    assert!(store.record_open(newsletter.id, subscriber.id, later).await.unwrap());
    assert!(store.record_click(newsletter.id, subscriber.id, later).await.unwrap());

    let tracking = store.list_tracking(newsletter.id).await.unwrap();
    assert_eq!(tracking.len(), 1);
    assert!(tracking[0].opened && tracking[0].clicked);
    assert_eq!(tracking[0].opened_at, Some(first_touch));
    assert_eq!(tracking[0].clicked_at, Some(first_touch));
    assert!(!store.record_open(newsletter.id, Uuid::new_v4(), later).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn unknown_unsubscribe_tokens_change_nothing() {
    let store = spawn_store().await;
    let subscriber = pending_subscriber("frank@test.com", Duration::hours(24));
    store.insert_subscriber(&subscriber).await.unwrap();

    assert_none!(store
        .unsubscribe_by_token(&SubscriptionToken::generate(), now())
        .await
        .unwrap());

    let unsubscribed = store
        .unsubscribe_by_token(&subscriber.unsubscribe_token, now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unsubscribed.status, SubscriberStatus::Unsubscribed);
}
