use portfolio_newsletter::config::get_configuration;
use portfolio_newsletter::startup::Application;
use portfolio_newsletter::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber(
        String::from("portfolio_newsletter"),
        String::from("info"),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    let config = get_configuration()?;
    let application = Application::build(config).await?;

    application.run_until_stop().await?;

    Ok(())
}
