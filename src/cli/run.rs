// src/cli/run.rs — Run the bot until interrupted

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::Backends;
use crate::dispatch::{Dispatcher, Shared};
use crate::infra::config::Config;
use crate::infra::paths;
use crate::security::Blocklist;
use crate::stats::StatsRecorder;
use crate::transport::TelegramTransport;

pub async fn run_bot(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    if config.telegram.token.is_empty() {
        anyhow::bail!("telegram.token is not set. Run `genbot init` and edit the config file.");
    }

    paths::ensure_dirs().await?;

    let backends = Backends::from_config(&config)?;
    if backends.available().is_empty() {
        tracing::warn!("No generation backends are enabled");
    }
    let blocklist = Blocklist::load(&config.blocklist.path())?;
    let stats = StatsRecorder::new(&config.stats.path(), config.stats.utc_offset_hours);

    let transport = Arc::new(TelegramTransport::new(&config.telegram));
    match transport.validate().await {
        Ok(identity) => tracing::info!("Telegram: {}", identity),
        Err(e) => anyhow::bail!("Telegram token check failed: {e}"),
    }

    let (tx, rx) = mpsc::channel(config.queue.inbound_capacity);
    let shutdown = CancellationToken::new();

    let poller = {
        let transport = transport.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { transport.poll(tx, shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
            }
            shutdown.cancel();
        });
    }

    let dispatcher = Dispatcher::new(Shared::new(config, backends, transport, blocklist, stats));
    dispatcher.run(rx, shutdown.clone()).await?;

    shutdown.cancel();
    poller.await??;
    Ok(())
}
