mod bootstrap;
mod health;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hivebot_core::config::{AppConfig, LoadOptions};
use hivebot_slack::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Application;
use crate::routes::SlackState;

fn init_logging(config: &AppConfig) {
    use hivebot_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let Application { config, db_pool, mut bot, verifier } =
        bootstrap::bootstrap_with_config(config).await?;

    let socket_mode = config.slack.app_token.is_some().then(|| {
        let runner = SocketModeRunner::new(
            Arc::new(NoopSocketTransport),
            bot.classifier().clone(),
            ReconnectPolicy::default(),
        );
        let shutdown = bot.shutdown_token();
        tokio::spawn(async move { runner.run(shutdown).await })
    });
    info!(
        event_name = "system.server.slack_transport_mode",
        correlation_id = "bootstrap",
        transport_mode = if socket_mode.is_some() { "http+socket" } else { "http" },
        "slack intake initialized"
    );

    let app = routes::router(SlackState::new(&bot, verifier))
        .merge(health::router(db_pool, bot.state_watch()));
    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let http_stop = CancellationToken::new();
    let server = {
        let http_stop = http_stop.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_stop.cancelled().await })
                .await
        })
    };
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "hivebot-server started"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "ctrl-c received"
            );
        }
        _ = bot.stopped() => {
            info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "shutdown requested by a plugin"
            );
        }
    }

    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    let report = bot.drain(grace).await;
    if !report.drained {
        warn!(correlation_id = "shutdown", "closing with handler workers still running");
    }

    http_stop.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(serve_error)) => {
            error!(correlation_id = "shutdown", error = %serve_error, "http server failed");
        }
        Err(join_error) => {
            error!(correlation_id = "shutdown", error = %join_error, "http server task failed");
        }
    }
    if let Some(socket_mode) = socket_mode {
        if let Err(join_error) = socket_mode.await {
            warn!(correlation_id = "shutdown", error = %join_error, "socket mode task failed");
        }
    }

    bot.close().await;
    info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "hivebot-server stopped"
    );
    Ok(())
}
