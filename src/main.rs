use anyhow::Context;
use tracing::{error, info};

#[cfg(feature = "amqp")]
use trail_relay::bus::AmqpQueue;
use trail_relay::telemetry::init_logging;
#[cfg(feature = "amqp")]
use trail_relay::QueueConsumer;
use trail_relay::{http, RelayConfig, RelayHub, RelayMetrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("loading configuration")?;
    init_logging(config.format()?, config.level()?).context("initializing logging")?;

    let metrics = RelayMetrics::new().context("registering metrics")?;
    metrics.set_speed_factor(config.speed_factor);

    let settings = config.connection_settings();
    let hub = RelayHub::builder()
        .mailbox_capacity(settings.mailbox_capacity)
        .send_timeout(settings.send_timeout)
        .metrics(metrics)
        .build()
        .context("building relay hub")?;

    info!(
        trail = %config.trail.id,
        queue = %config.trail.queue,
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        "Starting relay"
    );

    #[cfg(feature = "amqp")]
    let consumer = QueueConsumer::spawn(
        hub.clone(),
        &config.trail.queue,
        AmqpQueue::new(config.broker.connection_uri(), tokio::runtime::Handle::current()),
        config.poll_interval(),
    );

    let signal_hub = hub.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Failed to listen for shutdown signals");
            return;
        }
        signal_hub.shutdown();
    });

    http::serve(hub, &config.bind_addr.to_string())
        .await
        .context("serving HTTP")?;

    #[cfg(feature = "amqp")]
    {
        let stats = tokio::task::spawn_blocking(move || consumer.stop())
            .await
            .context("stopping queue consumer")?;
        info!(?stats, "Queue consumer stopped");
    }

    info!("Relay stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
