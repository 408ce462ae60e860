use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::authentication::AdminCredentials;
use crate::config::{DatabaseSettings, Settings, StorageBackend};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::EmailClient;
use crate::routes::{
    admin_create_newsletter, admin_get_newsletter, admin_list_contact_messages,
    admin_list_newsletters, admin_list_subscribers, admin_send_newsletter,
    admin_subscriber_stats, admin_unsubscribe_subscriber, admin_update_newsletter, handle_click,
    handle_confirm_subscription, handle_contact, handle_create_subscription, handle_open,
    handle_unsubscribe, health_check,
};
use crate::store::{MemoryStore, PostgresStore, Store};

/// Public URL the links inside emails are built from.
pub struct ApplicationBaseUrl(pub String);

pub struct ConfirmationTokenTtl(pub chrono::Duration);

/// Where contact form submissions are forwarded, if anywhere.
pub struct ContactNotification {
    pub recipient: Option<SubscriberEmail>,
}

pub struct Application {
    port: u16,
    server: Server,
    store: Arc<dyn Store>,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let token_ttl = config
            .subscription
            .get_confirmation_token_ttl()
            .map_err(anyhow::Error::msg)
            .context("The configured confirmation token TTL is not valid.")?;
        let store = build_store(&config).await?;

        let sender_email = config
            .email_client
            .get_sender_email()
            .map_err(anyhow::Error::msg)
            .context("The configured sender email is not valid.")?;
        let email_client = EmailClient::new(
            config.email_client.base_url.clone(),
            sender_email,
            config.email_client.api_key.clone(),
            config.email_client.get_timeout(),
        )
        .context("Failed to build the email client.")?;
        let notify_email = config
            .contact
            .get_notify_email()
            .map_err(anyhow::Error::msg)
            .context("The configured contact notification email is not valid.")?;

        let listener = TcpListener::bind(config.get_address())
            .with_context(|| format!("Failed to bind {}.", config.get_address()))?;
        let port = listener
            .local_addr()
            .context("Failed to read the bound address.")?
            .port();

        tracing::info!("Server listening on {}:{}", config.application.host, port);

        let server = run(
            listener,
            store.clone(),
            email_client,
            ApplicationBaseUrl(config.application.base_url.clone()),
            ConfirmationTokenTtl(token_ttl),
            AdminCredentials {
                username: config.admin.username.clone(),
                password: config.admin.password.clone(),
            },
            ContactNotification {
                recipient: notify_email,
            },
        )?;

        Ok(Self {
            port,
            server,
            store,
        })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

async fn build_store(config: &Settings) -> Result<Arc<dyn Store>, anyhow::Error> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let store = PostgresStore::new(get_connection_db_pool(&config.database));

            if config.database.migrate_on_startup {
                store
                    .migrate()
                    .await
                    .context("Failed to run the database migrations.")?;
            }

            Ok(Arc::new(store))
        }
    }
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn Store>,
    email_client: EmailClient,
    base_url: ApplicationBaseUrl,
    token_ttl: ConfirmationTokenTtl,
    admin_credentials: AdminCredentials,
    contact_notification: ContactNotification,
) -> Result<Server, std::io::Error> {
    let store: web::Data<dyn Store> = web::Data::from(store);
    let email_client = web::Data::new(email_client);
    let base_url = web::Data::new(base_url);
    let token_ttl = web::Data::new(token_ttl);
    let admin_credentials = web::Data::new(admin_credentials);
    let contact_notification = web::Data::new(contact_notification);

    let server = HttpServer::new(move || {
        App::new()
            // Request spans for every incoming call
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/subscriptions", web::post().to(handle_create_subscription))
            .route(
                "/subscriptions/confirm",
                web::get().to(handle_confirm_subscription),
            )
            .route("/subscriptions/unsubscribe", web::get().to(handle_unsubscribe))
            .route("/contact", web::post().to(handle_contact))
            .route(
                "/newsletters/{newsletter_id}/open/{subscriber_id}",
                web::get().to(handle_open),
            )
            .route(
                "/newsletters/{newsletter_id}/click/{subscriber_id}",
                web::get().to(handle_click),
            )
            .service(
                web::scope("/admin")
                    .route("/subscribers", web::get().to(admin_list_subscribers))
                    .route("/subscribers/stats", web::get().to(admin_subscriber_stats))
                    .route(
                        "/subscribers/{subscriber_id}/unsubscribe",
                        web::post().to(admin_unsubscribe_subscriber),
                    )
                    .route("/newsletters", web::get().to(admin_list_newsletters))
                    .route("/newsletters", web::post().to(admin_create_newsletter))
                    .route("/newsletters/{newsletter_id}", web::get().to(admin_get_newsletter))
                    .route("/newsletters/{newsletter_id}", web::put().to(admin_update_newsletter))
                    .route(
                        "/newsletters/{newsletter_id}/send",
                        web::post().to(admin_send_newsletter),
                    )
                    .route(
                        "/contact-messages",
                        web::get().to(admin_list_contact_messages),
                    ),
            )
            .app_data(store.clone())
            .app_data(email_client.clone())
            .app_data(base_url.clone())
            .app_data(token_ttl.clone())
            .app_data(admin_credentials.clone())
            .app_data(contact_notification.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
