use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use informinator::bot::Bot;
use informinator::config::Config;
use informinator::gateway::signal::SignalRpcClient;
use informinator::gateway::Gateway;
use informinator::relay::{RelayEngine, SessionManager};
use informinator::store::SessionStore;
use informinator::AppResult;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "informinator=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .context("cannot open the session database")?;
    let store = SessionStore::new(pool);
    store.init_schema().await?;

    let removed = store.cleanup_old_mappings(config.mapping_retention_hours).await?;
    if removed > 0 {
        info!(removed, "pruned stale relay mappings");
    }

    let client = Arc::new(SignalRpcClient::new(
        &config.daemon_host,
        config.daemon_port,
        &config.account,
    ));
    let bot_uuid = client
        .own_uuid()
        .await
        .context("cannot reach the signal daemon")?
        .context("own uuid unknown, is the account registered?")?;
    info!(%bot_uuid, "bot identity resolved");

    let gateway: Arc<dyn Gateway> = client.clone();
    let engine = RelayEngine::new(
        gateway.clone(),
        store.clone(),
        SessionManager::new(store.clone()),
        config.direct_dm_greeting.clone(),
    );
    let bot = Bot::new(gateway, store, engine, bot_uuid);

    // The daemon connection drops now and then; reconnect with capped
    // exponential backoff and reset it after a good connection.
    let mut backoff = Duration::from_secs(1);
    loop {
        match client.subscribe().await {
            Ok(mut events) => {
                backoff = Duration::from_secs(1);
                loop {
                    match events.next_event().await {
                        Ok(Some(msg)) => {
                            if let Err(e) = bot.handle_event(&msg).await {
                                error!("event handling failed: {e:#}");
                            }
                        }
                        Ok(None) => {
                            warn!("event stream closed");
                            break;
                        }
                        Err(e) => {
                            warn!("event stream error: {e:#}");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!("cannot connect to event stream: {e:#}"),
        }
        info!(seconds = backoff.as_secs(), "reconnecting");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(60));
    }
}
