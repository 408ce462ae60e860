use crate::helpers::TestApp;
use portfolio_newsletter::domain::subscriber_status::SubscriberStatus;

#[tokio::test]
async fn confirmations_without_token_are_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get("/subscriptions/confirm").await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_tokens_are_rejected_with_401() {
    let test_app = TestApp::spawn_app().await;

    let test_cases = vec![
        ("abcdefghijklmnopqrstuvwxy", "well formed but unknown"),
        ("short", "malformed"),
    ];

    for (token, description) in test_cases {
        let response = test_app
            .get(&format!("/subscriptions/confirm?token={}", token))
            .await;

        assert_eq!(
            response.status().as_u16(),
            401,
            "The API did not reject a {} token",
            description
        );
    }
}

#[tokio::test]
async fn the_link_returned_by_subscribe_confirms_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    let confirmation_link = test_app.create_unconfirmed_subscriber("frank@test.com").await;

    let response = test_app.get_url(confirmation_link).await;

    assert_eq!(response.status().as_u16(), 200);

    let subscriber = test_app.find_subscriber("frank@test.com").await;
    assert_eq!(subscriber.status, SubscriberStatus::Confirmed);
    assert!(subscriber.confirmed_at.is_some());
    assert!(subscriber.confirmation_token.is_none());
}

#[tokio::test]
async fn a_confirmation_link_only_works_once() {
    let test_app = TestApp::spawn_app().await;
    let confirmation_link = test_app.create_unconfirmed_subscriber("frank@test.com").await;

    let first = test_app.get_url(confirmation_link.clone()).await;
    let second = test_app.get_url(confirmation_link).await;

    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 401);
}

#[tokio::test]
async fn expired_tokens_are_rejected_with_410() {
    let test_app = TestApp::spawn_app().await;
    let confirmation_link = test_app.create_unconfirmed_subscriber("frank@test.com").await;
    test_app.expire_confirmation_token("frank@test.com").await;

    let response = test_app.get_url(confirmation_link).await;

    assert_eq!(response.status().as_u16(), 410);
    assert_eq!(
        test_app.find_subscriber("frank@test.com").await.status,
        SubscriberStatus::Pending
    );
}

#[tokio::test]
async fn expired_subscribers_can_request_a_new_link() {
    let test_app = TestApp::spawn_app().await;
    let expired_link = test_app.create_unconfirmed_subscriber("frank@test.com").await;
    test_app.expire_confirmation_token("frank@test.com").await;

    assert_eq!(test_app.get_url(expired_link.clone()).await.status().as_u16(), 410);

    let fresh_link = test_app.create_unconfirmed_subscriber("frank@test.com").await;
    assert_ne!(fresh_link, expired_link);

    let response = test_app.get_url(fresh_link).await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        test_app.find_subscriber("frank@test.com").await.status,
        SubscriberStatus::Confirmed
    );
    assert_eq!(test_app.get_url(expired_link).await.status().as_u16(), 401);
}
