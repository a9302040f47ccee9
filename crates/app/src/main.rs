mod ingest;
mod problem;
mod router;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use tracing::{info, warn};
use url::Url;

use bizops_notify_core::EmailSender;
use bizops_notify_mailer::{DisabledMailer, HttpMailer};
use bizops_notify_storage::Database;
use bizops_notify_util::{load_env_file, AppConfig, MailerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let email = email_sender(config.mailer.as_ref())?;
    let state = router::AppState::new(metrics, database, email);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}

fn email_sender(
    config: Option<&MailerConfig>,
) -> Result<Arc<dyn EmailSender>, Box<dyn std::error::Error>> {
    let Some(config) = config else {
        warn!(stage = "app", "MAILER_BASE_URL not set; escalation email disabled");
        return Ok(Arc::new(DisabledMailer));
    };

    // `Url::join` replaces the last segment unless the base ends with a slash.
    let mut base = config.base_url.clone();
    if !base.ends_with('/') {
        base.push('/');
    }
    let http = reqwest::Client::builder().build()?;
    let mut mailer = HttpMailer::new(Url::parse(&base)?, config.from.clone(), http);
    if let Some(api_key) = &config.api_key {
        mailer = mailer.with_api_key(api_key.clone());
    }
    Ok(Arc::new(mailer))
}
