//! Fetch-and-publish loop.
//!
//! One cycle runs right away, then one per refresh interval. The timer is
//! armed only after the previous cycle finished, so cycles never overlap and
//! a slow fetch pushes the schedule back instead of piling up. Shutdown is
//! only looked at while waiting; a cycle in progress always completes.

use std::time::Duration;
use tokio::sync::watch;

use crate::bus::Transport;
use crate::publish;
use crate::sensor::Registry;
use crate::weather::{FetchError, WeatherSource};

/// Drives the weather source and the sensors.
///
/// Borrows everything it works with; the caller keeps ownership of the
/// connection and the registry for cleanup after [`Scheduler::run`].
pub struct Scheduler<'a, W, T> {
    source: &'a W,
    transport: &'a T,
    registry: &'a mut Registry,
    refresh: Duration,
}

impl<'a, W: WeatherSource, T: Transport> Scheduler<'a, W, T> {
    pub fn new(
        source: &'a W,
        transport: &'a T,
        registry: &'a mut Registry,
        refresh: Duration,
    ) -> Self {
        Self {
            source,
            transport,
            registry,
            refresh,
        }
    }

    /// Run until `shutdown` fires (or its sender goes away).
    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        self.run_cycle().await;

        loop {
            log::info!("Next refresh at {}", self.next_refresh());

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    log::info!("Shutdown requested, leaving refresh loop");
                    break;
                }
                _ = tokio::time::sleep(self.refresh) => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// One fetch-and-publish cycle. Returns how many features were updated.
    ///
    /// A failed fetch publishes nothing and leaves earlier values alone.
    pub async fn cycle(&mut self) -> Result<usize, FetchError> {
        let conditions = self.source.fetch().await?;

        log::debug!(
            "Conditions for {}: {}, {} (feels like {}), observed {}",
            conditions.location.as_deref().unwrap_or("unknown location"),
            conditions.weather.as_deref().unwrap_or("-"),
            conditions
                .temperature_celsius
                .map(|t| format!("{:.1}°C", t))
                .unwrap_or_else(|| "-".to_string()),
            conditions.feels_like_celsius,
            conditions.observation_time.as_deref().unwrap_or("at unknown time")
        );

        Ok(publish::apply(&conditions, self.registry.sensors_mut(), self.transport).await)
    }

    async fn run_cycle(&mut self) {
        match self.cycle().await {
            Ok(published) => log::debug!("Cycle done, {} features updated", published),
            Err(e) => {
                let hours = self.refresh.as_secs() / 3600;
                log::warn!(
                    "Failed to get weather: {}. Next attempt in {} hour{}",
                    e,
                    hours,
                    if hours == 1 { "" } else { "s" }
                );
            }
        }
    }

    fn next_refresh(&self) -> String {
        chrono::Duration::from_std(self.refresh)
            .ok()
            .and_then(|d| chrono::Local::now().checked_add_signed(d))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| format!("{:?} from now", self.refresh))
    }
}
