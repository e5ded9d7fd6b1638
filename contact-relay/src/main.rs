use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mimalloc::MiMalloc;
use tracing::{info, warn};

use contact_relay::api::{ApiServer, AppState};
use contact_relay::config::AppConfig;
use contact_relay::contact::{ContactService, SubscriptionService};
use contact_relay::database::{
    self,
    repositories::{SqlxContactRepository, SqlxPushSubscriptionRepository},
};
use contact_relay::notification::{
    DesktopChannel, EmailChannel, FanOutDispatcher, NotificationTasks, SmtpMailer, WebPushChannel,
    WebPushClient,
};
use contact_relay::utils::fs;
use contact_relay::logging;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How long shutdown waits for in-flight notifications.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;
    logging::panic_hook::install(&logging_config);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        filter = logging_config.filter(),
        "Starting contact-relay"
    );
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    // Initialize database
    if let Some(path) = database::database_file_path(&config.database_url) {
        fs::ensure_parent_dir_sync_with_op("creating database directory", &path)?;
    }
    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    let contacts = Arc::new(SqlxContactRepository::new(pool.clone()));
    let subscriptions = Arc::new(SqlxPushSubscriptionRepository::new(pool.clone()));
    let tasks = NotificationTasks::new();

    let mut contact_service = ContactService::new(contacts, tasks.clone())
        .with_channel(Arc::new(DesktopChannel::new(config.desktop.clone())));

    if config.email.is_configured() {
        match SmtpMailer::new(&config.email) {
            Ok(mailer) => {
                contact_service = contact_service.with_channel(Arc::new(EmailChannel::new(
                    config.email.clone(),
                    Arc::new(mailer),
                )));
            }
            Err(e) => warn!(error = %e, "Email notifications disabled"),
        }
    }

    let mut state = AppState::new().with_pool(pool.clone());

    if let Some(web_push) = config.web_push.clone() {
        let public_key = web_push.vapid_public_key_b64().to_string();
        let client = WebPushClient::new(web_push)?;
        let dispatcher = FanOutDispatcher::new(subscriptions.clone(), Arc::new(client));
        contact_service =
            contact_service.with_channel(Arc::new(WebPushChannel::new(Arc::new(dispatcher))));
        state = state.with_vapid_public_key(public_key);
        info!("Web push enabled");
    }

    let state = state
        .with_contact_service(Arc::new(contact_service))
        .with_subscription_service(Arc::new(SubscriptionService::new(subscriptions)));

    let server = ApiServer::with_state(config.server.clone(), state);
    let cancel_token = server.cancel_token();
    logging_config.start_retention_cleanup(cancel_token.clone());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        cancel_token.cancel();
    });

    server.run().await?;

    tasks.drain(SHUTDOWN_GRACE).await;
    pool.close().await;

    info!("contact-relay stopped");
    Ok(())
}
