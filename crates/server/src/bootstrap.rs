use std::sync::Arc;

use hivebot_core::config::{AppConfig, ConfigError};
use hivebot_core::DirectoryCache;
use hivebot_db::{connect_with_settings, migrations, DbPool, SqlDataStore};
use hivebot_dispatch::{Bot, BotContext, DispatchSettings, RegistryError, RunningBot};
use hivebot_plugins::builtin_plugins;
use hivebot_slack::{refresh_directory, ApiError, HttpSlackApi, SignatureVerifier, SlackApi};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub bot: RunningBot,
    pub verifier: SignatureVerifier,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack client could not be built: {0}")]
    SlackClient(#[source] ApiError),
    #[error("slack directory refresh failed: {0}")]
    Directory(#[source] ApiError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let api = HttpSlackApi::new(config.slack.api_base_url.clone(), config.slack.bot_token.clone())
        .map_err(BootstrapError::SlackClient)?;
    let bot = start_bot(&config, db_pool.clone(), Arc::new(api)).await?;
    let verifier = SignatureVerifier::new(
        config.slack.signing_secret.clone(),
        config.dispatch.signature_max_age_secs,
    );

    Ok(Application { config, db_pool, bot, verifier })
}

/// Loads the directory, registers the enabled builtin plugins and starts dispatching.
///
/// A plugin whose load hook fails is skipped; any other registration failure aborts startup.
pub async fn start_bot(
    config: &AppConfig,
    db_pool: DbPool,
    api: Arc<dyn SlackApi>,
) -> Result<RunningBot, BootstrapError> {
    let directory = Arc::new(DirectoryCache::new());
    refresh_directory(api.as_ref(), &directory).await.map_err(BootstrapError::Directory)?;

    let context = BotContext::new(api, directory, Arc::new(SqlDataStore::new(db_pool)));
    let mut bot = Bot::new(context, DispatchSettings::from(&config.dispatch));

    for plugin in builtin_plugins(&config.plugins) {
        let plugin_id = plugin.id().to_owned();
        match bot.register(plugin).await {
            Ok(()) => {
                info!(
                    event_name = "system.bootstrap.plugin_registered",
                    correlation_id = "bootstrap",
                    plugin_id = %plugin_id,
                    "plugin registered"
                );
            }
            Err(error @ RegistryError::Load { .. }) => {
                warn!(
                    event_name = "system.bootstrap.plugin_skipped",
                    correlation_id = "bootstrap",
                    plugin_id = %plugin_id,
                    error = %error,
                    "plugin failed to load and was skipped"
                );
            }
            Err(error) => return Err(error.into()),
        }
    }

    Ok(bot.start())
}
