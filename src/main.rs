use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use grumble::config::{Cli, Command, Config};
use grumble::db;
use grumble::jobs::{run_scheduler, PurgeExpiredJob};
use grumble::moderation;
use grumble::routes;
use grumble::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path(), config.database.max_connections)?;
    db::run_migrations(&pool)?;

    let command = cli.command.unwrap_or(Command::Serve);
    if command == Command::Migrate {
        tracing::info!("Migrations applied");
        return Ok(());
    }

    let content_filter = moderation::from_config(&config.moderation)?;
    let state = AppState::new(pool, config.clone(), content_filter)?;
    let job = PurgeExpiredJob::new(
        state.services.purge.clone(),
        Duration::from_secs(config.jobs.purge_timeout_secs),
    );
    let every = Duration::from_secs(config.jobs.purge_interval_secs);

    match command {
        Command::PurgeExpired => {
            let count = job.run_once().await?;
            tracing::info!(deleted_count = count, "Purge expired finished");
        }
        Command::Cron => {
            let (tx, rx) = watch::channel(false);
            let scheduler = tokio::spawn(run_scheduler(job, every, rx));
            shutdown_signal().await;
            let _ = tx.send(true);
            scheduler.await?;
        }
        Command::Serve | Command::Migrate => {
            let (tx, rx) = watch::channel(false);
            let scheduler = tokio::spawn(run_scheduler(job, every, rx));

            let app = routes::app(state);
            let addr: SocketAddr =
                format!("{}:{}", config.server.host, config.server.port).parse()?;
            tracing::info!("Listening on http://{}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            let _ = tx.send(true);
            scheduler.await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
