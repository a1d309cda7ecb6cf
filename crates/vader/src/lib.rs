//! vader publishes the current weather as hemtjanst sensors.
//!
//! Every refresh interval the current conditions are fetched from Weather
//! Underground and two values are pushed to MQTT:
//! - feels-like temperature on `sensor/temperature/wunderground`
//! - relative humidity on `sensor/humidity/wunderground`

pub mod bus;
pub mod config;
pub mod publish;
pub mod runner;
pub mod scheduler;
pub mod sensor;
pub mod weather;

pub use bus::{Announcement, BusError, MqttTransport, Transport};
pub use config::{Config, ConfigError, MqttConfig, WeatherConfig};
pub use scheduler::Scheduler;
pub use sensor::{Feature, FeatureInfo, Registry, RegistryError, Sensor, SensorSpec, SensorType};
pub use weather::{Conditions, FetchError, WeatherSource, WundergroundClient};
