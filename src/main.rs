use anyhow::Context;
use deployer::configuration::{get_configuration, Settings};
use deployer::db::{HistoryStore, MemoryHistoryStore, PgHistoryStore};
use deployer::deploy::{Deployer, ShellWorkspace};
use deployer::helpers::ssh_client::RusshConnector;
use deployer::startup::{run, AppServices};
use deployer::telemetry::{get_subscriber, init_subscriber};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("deployer".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber)?;

    let settings = get_configuration().context("Failed to read configuration.")?;
    let history = history_store(&settings).await?;

    let deployer = Deployer::new(
        settings.deploy.clone(),
        Arc::clone(&history),
        Arc::new(RusshConnector),
        Arc::new(ShellWorkspace::from_settings(&settings.deploy)),
    )
    .context("Failed to load deployment templates")?;

    let address = format!("{}:{}", settings.app_host, settings.app_port);
    tracing::info!("Start server at {:?}", &address);
    let listener = TcpListener::bind(&address)
        .with_context(|| format!("failed to bind to {}", address))?;

    run(listener, settings, AppServices { deployer, history })
        .await?
        .await?;
    Ok(())
}

async fn history_store(settings: &Settings) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let Some(database) = &settings.database else {
        tracing::warn!("No database configured, deployment history is kept in memory only");
        return Ok(Arc::new(MemoryHistoryStore::new()));
    };

    tracing::info!(
        db_host = %database.host,
        db_port = database.port,
        db_name = %database.database_name,
        "Connecting to PostgreSQL"
    );
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&database.connection_string())
        .await
        .context("Failed to connect to database.")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(PgHistoryStore::new(pool)))
}
