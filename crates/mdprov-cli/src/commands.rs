//! Command handlers for the mdprov CLI

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use mdprov_runtime::{OperationModel, RuntimeBuilder, RuntimeHandle};

use crate::app::{FeedClient, LoggingErrorClient};
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Serve { listen, interval } => {
                let config = config.with_overrides(listen, interval)?;
                Self::handle_serve_command(config).await
            }
            Commands::Config { json } => Self::handle_config_command(&config, json),
        }
    }

    /// Run the provider until interrupted
    async fn handle_serve_command(config: AppConfig) -> Result<()> {
        let feed = FeedClient::new();
        let mut runtime = start_runtime(&config, feed.clone()).await?;
        if let Some(addr) = runtime.local_addr() {
            info!("Serving on {}", addr);
        }

        let (stop_sender, mut stop) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted");
                    let _ = stop_sender.send(true);
                }
                Err(e) => {
                    warn!("Failed to listen for ctrl-c: {}", e);
                    // keep the sender alive so the serve loop does not spin
                    std::future::pending::<()>().await;
                }
            }
        });

        let user_dispatch = config.provider.dispatch.operation_model == OperationModel::UserDispatch;
        let interval = Duration::from_millis(config.server.update_interval_ms);
        let mut next_tick = Instant::now() + interval;

        while !*stop.borrow() {
            let wait = next_tick.saturating_duration_since(Instant::now());
            if user_dispatch {
                runtime.dispatch(wait.min(runtime.dispatch_timeout())).await?;
            } else {
                tokio::select! {
                    _ = stop.changed() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
                if !runtime.is_running() {
                    warn!("Dispatch loop stopped");
                    break;
                }
            }

            if Instant::now() >= next_tick {
                publish_updates(&runtime, &feed).await;
                next_tick = Instant::now() + interval;
            }
        }

        let stats = runtime.engine().lock().await.stats().clone();
        runtime.shutdown().await?;
        info!(
            "Served {} channels, {} logins, {} items, {} posts ({} decode errors)",
            stats.channels_accepted,
            feed.login_count(),
            stats.items_opened,
            feed.post_count(),
            stats.decode_errors
        );
        Ok(())
    }

    /// Print the effective configuration
    fn handle_config_command(config: &AppConfig, json: bool) -> Result<()> {
        let text = if json {
            serde_json::to_string_pretty(config)?
        } else {
            toml::to_string_pretty(config)?
        };
        println!("{}", text);
        Ok(())
    }
}

/// Build the runtime for `config` with `feed` as the provider client
pub async fn start_runtime(config: &AppConfig, feed: FeedClient) -> Result<RuntimeHandle> {
    let mut builder = RuntimeBuilder::new(config.provider.clone())
        .listen(config.listen_addr()?)
        .client(Box::new(feed))
        .error_client(Box::new(LoggingErrorClient));
    if let Some(dictionary) = config.builtin_field_dictionary() {
        builder = builder.field_dictionary(dictionary);
    }
    Ok(builder.build_and_start().await?)
}

/// Publish one tick of updates; handles the engine rejects are dropped
pub async fn publish_updates(runtime: &RuntimeHandle, feed: &FeedClient) {
    let updates = feed.tick();
    if updates.is_empty() {
        return;
    }
    let engine = runtime.engine();
    let mut engine = engine.lock().await;
    let mut published = 0;
    for (handle, update) in updates {
        match engine.submit_update(update, handle) {
            Ok(()) => published += 1,
            Err(e) => {
                debug!("Dropping {}: {}", handle, e);
                feed.forget(handle);
            }
        }
    }
    debug!("Published {} updates", published);
}
