use linkify::{LinkFinder, LinkKind};
use once_cell::sync::Lazy;
use reqwest::{Response, Url};
use secrecy::ExposeSecret;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use portfolio_newsletter::config::{get_configuration, Settings, StorageBackend};
use portfolio_newsletter::domain::subscriber::Subscriber;
use portfolio_newsletter::domain::subscriber_email::SubscriberEmail;
use portfolio_newsletter::startup::Application;
use portfolio_newsletter::store::Store;
use portfolio_newsletter::telemetry::{get_subscriber, init_subscriber};

// Logs are only printed when TEST_LOG is set, e.g. `TEST_LOG=true cargo test`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = String::from("info");
    let subscriber_name = String::from("test");

    if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(subscriber_name, default_filter_level, std::io::stdout));
    } else {
        init_subscriber(get_subscriber(subscriber_name, default_filter_level, std::io::sink));
    }
});

pub const OWNER_EMAIL: &str = "owner@test.com";

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub port: u16,
    pub store: Arc<dyn Store>,
    pub email_server: MockServer,
    pub api_client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        Self::spawn_app_with(|_| {}).await
    }

    /// Spawns the application on a random port with the in-memory store and
    /// a mock email provider. `configure` can tweak settings before boot.
    pub async fn spawn_app_with(configure: impl FnOnce(&mut Settings)) -> TestApp {
        Lazy::force(&TRACING);

        let mut config = get_configuration().expect("Missing configuration file.");
        let email_server = MockServer::start().await;

        // Port 0 asks the OS for any free port
        config.set_app_port(0);
        config.set_email_client_base_url(email_server.uri());
        config.storage.backend = StorageBackend::Memory;
        // Links in emails point here; tests add the port back when following them
        config.application.base_url = "http://127.0.0.1".to_string();
        config.contact.notify_email = Some(OWNER_EMAIL.to_string());
        configure(&mut config);

        let application = Application::build(config.clone())
            .await
            .expect("Failed to build application.");
        let port = application.get_port();
        let store = application.store();

        tokio::spawn(application.run_until_stop());

        let api_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            config,
            store,
            email_server,
            api_client,
        }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.api_client
            .get(&format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_url(&self, url: Url) -> Response {
        self.api_client
            .get(url)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_subscription(&self, body: serde_json::Value) -> Response {
        self.api_client
            .post(&format!("{}/subscriptions", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_contact(&self, body: serde_json::Value) -> Response {
        self.api_client
            .post(&format!("{}/contact", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    fn admin_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.api_client
            .request(method, &format!("{}/admin{}", self.address, path))
            .basic_auth(
                &self.config.admin.username,
                Some(self.config.admin.password.expose_secret()),
            )
    }

    pub async fn admin_get(&self, path: &str) -> Response {
        self.admin_request(reqwest::Method::GET, path)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn admin_post(&self, path: &str) -> Response {
        self.admin_request(reqwest::Method::POST, path)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn admin_post_json(&self, path: &str, body: serde_json::Value) -> Response {
        self.admin_request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn admin_put_json(&self, path: &str, body: serde_json::Value) -> Response {
        self.admin_request(reqwest::Method::PUT, path)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// All links found in the HTML body of an email sent to the mock
    /// provider, pointed at the running test server.
    pub fn email_links(&self, request: &wiremock::Request) -> Vec<Url> {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let html = body["content"][0]["value"].as_str().unwrap();
        let mut finder = LinkFinder::new();
        finder.kinds(&[LinkKind::Url]);

        finder
            .links(html)
            .map(|link| {
                let mut url = Url::parse(link.as_str()).unwrap();
                if url.host_str() == Some("127.0.0.1") {
                    url.set_port(Some(self.port)).unwrap();
                }
                url
            })
            .collect()
    }

    pub fn email_link_containing(&self, request: &wiremock::Request, fragment: &str) -> Url {
        self.email_links(request)
            .into_iter()
            .find(|url| url.as_str().contains(fragment))
            .unwrap_or_else(|| panic!("No link containing {} in the email", fragment))
    }

    pub fn confirmation_link(&self, request: &wiremock::Request) -> Url {
        self.email_link_containing(request, "/subscriptions/confirm")
    }

    pub async fn find_subscriber(&self, email: &str) -> Subscriber {
        let email = SubscriberEmail::parse(email.to_string()).unwrap();

        self.store
            .find_subscriber_by_email(&email)
            .await
            .unwrap()
            .expect("The subscriber was not stored.")
    }

    /// Moves the confirmation deadline of a pending subscriber into the past.
    pub async fn expire_confirmation_token(&self, email: &str) {
        let mut subscriber = self.find_subscriber(email).await;
        let last_updated_at = subscriber.updated_at;
        subscriber.confirmation_token_expires_at =
            Some(chrono::Utc::now() - chrono::Duration::hours(1));

        let updated = self
            .store
            .update_subscriber_if_unchanged(&subscriber, last_updated_at)
            .await
            .unwrap();
        assert!(updated, "The subscriber changed while its token was being expired.");
    }

    /// Subscribes `email` and returns the confirmation link that was emailed.
    pub async fn create_unconfirmed_subscriber(&self, email: &str) -> Url {
        let _mock_guard = Mock::given(path("/mail/send"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .named("Send the confirmation email")
            .expect(1)
            .mount_as_scoped(&self.email_server)
            .await;

        self.post_subscription(serde_json::json!({ "name": "Frank", "email": email }))
            .await
            .error_for_status()
            .unwrap();

        let received_requests = self.email_server.received_requests().await.unwrap();

        self.confirmation_link(received_requests.last().unwrap())
    }

    pub async fn create_confirmed_subscriber(&self, email: &str) -> Subscriber {
        let confirmation_link = self.create_unconfirmed_subscriber(email).await;

        self.get_url(confirmation_link)
            .await
            .error_for_status()
            .unwrap();

        self.find_subscriber(email).await
    }
}
