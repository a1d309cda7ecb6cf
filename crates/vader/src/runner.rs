//! Process lifecycle: logging, signals, startup and shutdown order.

use std::time::Duration;
use tokio::sync::watch;

use crate::bus::{BusError, MqttTransport, Transport};
use crate::config::{Config, MqttConfig};
use crate::scheduler::Scheduler;
use crate::sensor::{weather_sensors, Registry, RegistryError};
use crate::weather::{WeatherSource, WundergroundClient};

/// Initialize logging with env_logger.
///
/// Respects RUST_LOG environment variable. Defaults to "info" level.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Shutdown channel fed by SIGINT and SIGTERM.
///
/// Must be called from within the tokio runtime.
pub fn shutdown_signal() -> std::io::Result<watch::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut listener = SignalListener::new()?;

    tokio::spawn(async move {
        let signal = listener.recv().await;
        log::info!("Received signal: {}, proceeding to shutdown", signal);
        let _ = shutdown_tx.send(());
    });

    Ok(shutdown_rx)
}

/// Waits for the first termination signal and names it.
pub struct SignalListener {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl SignalListener {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            sigterm: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            let ctrl_c_error = tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => return "SIGINT",
                    Err(e) => e,
                },
                _ = self.sigterm.recv() => return "SIGTERM",
            };

            log::error!("Failed to listen for SIGINT: {}", ctrl_c_error);
            self.sigterm.recv().await;
            "SIGTERM"
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            "SIGINT"
        }
    }
}

/// Registry holding the weather sensors, ready to be announced.
pub fn build_registry(mqtt: &MqttConfig) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new(mqtt.announce_topic.clone(), mqtt.client_id.clone());
    for spec in weather_sensors() {
        registry.register(spec)?;
    }
    Ok(registry)
}

/// Announce every sensor, then run the refresh loop until `shutdown` fires.
///
/// Subscribers never see a value for a device they do not know yet.
pub async fn serve<W: WeatherSource, T: Transport>(
    source: &W,
    transport: &T,
    registry: &mut Registry,
    refresh: Duration,
    shutdown: watch::Receiver<()>,
) -> Result<(), BusError> {
    registry.announce_all(transport).await?;

    Scheduler::new(source, transport, registry, refresh)
        .run(shutdown)
        .await;
    Ok(())
}

/// Run the daemon against the configured API and broker until `shutdown` fires.
pub async fn run(
    config: Config,
    shutdown: watch::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let client = WundergroundClient::new(&config.weather)?;
    log::info!("Fetching conditions for location: {}", client.location());

    let mut registry = build_registry(&config.mqtt)?;

    log::info!(
        "Connecting to MQTT broker at {} as {}",
        config.mqtt.address,
        config.mqtt.client_id
    );
    let transport = MqttTransport::connect(&config.mqtt, registry.announcements()?).await?;
    log::info!("Connected to broker");

    serve(
        &client,
        &transport,
        &mut registry,
        config.refresh_interval(),
        shutdown,
    )
    .await?;

    transport.disconnect().await?;
    log::info!("Disconnected from broker. Bye!");
    Ok(())
}
