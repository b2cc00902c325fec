use anyhow::Context;
use hivebot_core::config::{AppConfig, LoadOptions};
use hivebot_db::{connect_with_settings, migrations};

use crate::commands::{current_thread_runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", anyhow::Error::from(error), 4u8))?;

        let applied: Result<(), (&'static str, anyhow::Error, u8)> = migrations::run_pending(&pool)
            .await
            .context("applying migrations")
            .map_err(|error| ("migration", error, 5u8));
        pool.close().await;
        applied
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending migrations to `{}`", config.database.url),
        ),
        Err((error_class, error, exit_code)) => {
            CommandResult::failure("migrate", error_class, format!("{error:#}"), exit_code)
        }
    }
}
