use migration::{Migrator, MigratorTrait};
use pulsewatch::AppResources;
use pulsewatch::api::start_webserver;
use pulsewatch::config::load_config;
use pulsewatch::http_client::install_crypto_provider;
use pulsewatch::monitoring::HttpProbe;
use pulsewatch::notify::{DisabledMailer, EmailTransport, HttpWebhookSender, SmtpMailer};
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "pulsewatch=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let layer = fmt::layer().with_target(true).with_level(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    initialize_tracing();
    install_crypto_provider();

    let config = Arc::new(load_config()?);

    let db = Arc::new(Database::connect(&config.database_url).await?);
    Migrator::up(db.as_ref(), None).await?;

    let email: Arc<dyn EmailTransport> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::from_config(smtp)?),
        None => {
            tracing::warn!(
                name = "main.smtp_disabled",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "No SMTP relay configured, email alerts are disabled"
            );
            Arc::new(DisabledMailer)
        }
    };

    let resources = AppResources::new(
        db,
        config.clone(),
        Arc::new(HttpProbe::new()),
        email,
        Arc::new(HttpWebhookSender::new()),
    );

    let scheduled = resources.scheduler.load_all(&resources.store).await?;
    tracing::info!(
        name = "main.started",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        scheduled_targets = scheduled,
        min_interval_secs = config.monitoring.min_interval_secs,
        probe_timeout_ms = config.monitoring.probe_timeout_ms,
        message = "Monitoring started"
    );

    let scheduler = resources.scheduler.clone();
    let served = start_webserver(resources).await;
    scheduler.stop_all().await;
    served
}
