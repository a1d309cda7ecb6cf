//! Test doubles for the bus and the weather API

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use vader::bus::{BusError, Transport};
use vader::sensor::{weather_sensors, Registry};
use vader::weather::{Conditions, FetchError, WeatherSource};

/// One publish seen by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Transport that records every publish instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<Published>>,
    fail_topics: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make publishes to `topic` fail from now on.
    pub fn fail_on(&self, topic: &str) {
        self.fail_topics.lock().unwrap().push(topic.to_string());
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn values_on(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload)
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        if self.fail_topics.lock().unwrap().iter().any(|t| t == topic) {
            return Err(BusError::ConnectTimeout(Duration::ZERO));
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8(payload).unwrap(),
            retain,
        });
        Ok(())
    }
}

/// Weather source that replays a script, one entry per fetch.
///
/// Once the script runs out every fetch fails with `MissingConditions`.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Conditions, FetchError>>>,
    calls: AtomicUsize,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Conditions, FetchError>>) -> Self {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Every fetch takes `delay` (in tokio time) before answering.
    pub fn with_delay(script: Vec<Result<Conditions, FetchError>>, delay: Duration) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True if a fetch ever started while another one was running.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

impl WeatherSource for ScriptedSource {
    async fn fetch(&self) -> Result<Conditions, FetchError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FetchError::MissingConditions));
        self.in_flight.store(false, Ordering::SeqCst);
        next
    }
}

/// Registry with the two weather sensors, as the daemon builds it.
pub fn weather_registry() -> Registry {
    let mut registry = Registry::new("announce", "vader");
    for spec in weather_sensors() {
        registry.register(spec).unwrap();
    }
    registry
}
