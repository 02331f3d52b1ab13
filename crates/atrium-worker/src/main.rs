mod config;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atrium_digest::DigestPipeline;
use atrium_mailer::HttpMailer;
use atrium_storage::{PgEventQueue, PgSendLog, PgUserDirectory, MIGRATOR};

use config::DigestWorkerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atrium_worker=info,atrium_digest=info,atrium_storage=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("atrium-worker starting...");

    let config = DigestWorkerConfig::from_env();
    let pool = PgPool::connect(&config.database_url()).await?;
    MIGRATOR.run(&pool).await?;
    tracing::info!("database connected, migrations applied");

    let queue = Arc::new(PgEventQueue::new(pool.clone()));
    let directory = Arc::new(PgUserDirectory::new(pool.clone()));
    let send_log = Arc::new(PgSendLog::new(pool.clone()));
    let mailer = Arc::new(HttpMailer::from_env()?);
    let pipeline = DigestPipeline::new(queue, directory, send_log, mailer, config.digest_config());

    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = config.interval().as_secs(), "digest schedule running");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed tick is logged and the schedule keeps going; any
                // events it left claimed are recovered by the lease sweep
                if let Err(e) = pipeline.run_once(Utc::now()).await {
                    tracing::error!(error = %e, "digest run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}
