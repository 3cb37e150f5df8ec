use std::sync::Arc;

use dotenv::dotenv;
use log::*;

use polls::audit::LogAudit;
use polls::auth::StaticIdentities;
use polls::config::Config;
use polls::store::{MemoryStore, PgStore, PollStore};
use polls::AppState;

/**
 * Construct the store for the tide app state
 *
 * Falls back to the in-memory store when no DATABASE_URL is configured
 */
async fn create_store(config: &Config) -> Result<Arc<dyn PollStore>, sqlx::Error> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL is not set, polls will only be kept in memory");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}

fn io_error<E>(err: E) -> std::io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    std::io::Error::new(std::io::ErrorKind::Other, err)
}

#[async_std::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv().ok();
    pretty_env_logger::init();

    let config = Config::from_env().map_err(|err| {
        error!("Invalid configuration: {}", err);
        io_error(err)
    })?;

    let identities = StaticIdentities::parse(&config.users);
    if identities.is_empty() {
        warn!("POLLS_USERS is empty, nobody will be able to log in and vote");
    } else {
        info!("Loaded {} accounts from POLLS_USERS", identities.len());
    }
    if config.admin_token.is_none() {
        info!("POLLS_ADMIN_TOKEN is not set, question creation through the API is disabled");
    }

    match create_store(&config).await {
        Ok(store) => {
            let state = AppState::new(
                store,
                Arc::new(LogAudit),
                Arc::new(identities),
                config.admin_token.clone(),
            )
            .map_err(io_error)?;
            let app = polls::server(state, config.session_secret.as_bytes());
            app.listen(config.listen_addr.clone()).await?;
            Ok(())
        }
        Err(err) => {
            error!("Could not initialize the store! {:?}", err);
            Err(io_error(err))
        }
    }
}
