//! Sensor registry.
//!
//! A [`Sensor`] is a hemtjanst device: a topic, some descriptive metadata and
//! a set of [`Feature`]s. Sensors are registered once at startup and live for
//! the whole process. Feature bounds are advertised only, never enforced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bus::{Announcement, BusError, Transport};

pub const TEMPERATURE_TOPIC: &str = "sensor/temperature/wunderground";
pub const HUMIDITY_TOPIC: &str = "sensor/humidity/wunderground";

pub const CURRENT_TEMPERATURE: &str = "currentTemperature";
pub const CURRENT_RELATIVE_HUMIDITY: &str = "currentRelativeHumidity";

const MANUFACTURER: &str = "vader";

/// Errors from registry lookups and registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("sensor already registered: {0}")]
    DuplicateTopic(String),
    #[error("sensor not found: {0}")]
    SensorNotFound(String),
    #[error("sensor {sensor} has no feature {feature}")]
    FeatureNotFound { sensor: String, feature: String },
}

/// Hemtjanst device type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorType {
    TemperatureSensor,
    HumiditySensor,
    /// Any tag this daemon does not publish values for.
    Other(String),
}

impl SensorType {
    pub fn as_str(&self) -> &str {
        match self {
            SensorType::TemperatureSensor => "temperatureSensor",
            SensorType::HumiditySensor => "humiditySensor",
            SensorType::Other(tag) => tag,
        }
    }
}

impl From<String> for SensorType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "temperatureSensor" => SensorType::TemperatureSensor,
            "humiditySensor" => SensorType::HumiditySensor,
            _ => SensorType::Other(tag),
        }
    }
}

impl From<SensorType> for String {
    fn from(sensor_type: SensorType) -> Self {
        sensor_type.as_str().to_string()
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advertised bounds of a feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl FeatureInfo {
    pub fn with_min(min: f64) -> Self {
        Self {
            min: Some(min),
            ..Self::default()
        }
    }
}

/// Everything needed to register a sensor.
#[derive(Debug, Clone)]
pub struct SensorSpec {
    pub topic: String,
    pub name: String,
    pub manufacturer: String,
    pub sensor_type: SensorType,
    pub features: BTreeMap<String, FeatureInfo>,
}

/// The two sensors this daemon exposes.
pub fn weather_sensors() -> [SensorSpec; 2] {
    [
        SensorSpec {
            topic: TEMPERATURE_TOPIC.to_string(),
            name: "Temperature (outside)".to_string(),
            manufacturer: MANUFACTURER.to_string(),
            sensor_type: SensorType::TemperatureSensor,
            features: BTreeMap::from([(
                CURRENT_TEMPERATURE.to_string(),
                FeatureInfo::with_min(-50.0),
            )]),
        },
        SensorSpec {
            topic: HUMIDITY_TOPIC.to_string(),
            name: "Relative Humidity (outside)".to_string(),
            manufacturer: MANUFACTURER.to_string(),
            sensor_type: SensorType::HumiditySensor,
            features: BTreeMap::from([(
                CURRENT_RELATIVE_HUMIDITY.to_string(),
                FeatureInfo::default(),
            )]),
        },
    ]
}

/// A single updatable capability of a sensor.
#[derive(Debug, Clone)]
pub struct Feature {
    name: String,
    info: FeatureInfo,
    get_topic: String,
    value: Option<String>,
}

impl Feature {
    fn new(sensor_topic: &str, name: String, info: FeatureInfo) -> Self {
        let get_topic = format!("{}/{}/get", sensor_topic, name);
        Self {
            name,
            info,
            get_topic,
            value: None,
        }
    }

    pub fn info(&self) -> &FeatureInfo {
        &self.info
    }

    /// Topic the current value is published on.
    pub fn get_topic(&self) -> &str {
        &self.get_topic
    }

    /// Last value successfully published, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Publish `value` and remember it. Unchanged values are published too.
    pub async fn update<T: Transport>(
        &mut self,
        transport: &T,
        value: String,
    ) -> Result<(), BusError> {
        transport
            .publish(&self.get_topic, value.clone().into_bytes(), true)
            .await?;
        self.value = Some(value);
        Ok(())
    }
}

/// Announce payload as it goes on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceMeta<'a> {
    topic: &'a str,
    name: &'a str,
    manufacturer: &'a str,
    #[serde(rename = "type")]
    sensor_type: &'a str,
    #[serde(rename = "lastWillID")]
    last_will_id: &'a str,
    feature: BTreeMap<&'a str, FeatureMeta<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeatureMeta<'a> {
    #[serde(flatten)]
    info: &'a FeatureInfo,
    get_topic: &'a str,
}

/// A registered device.
#[derive(Debug, Clone)]
pub struct Sensor {
    topic: String,
    name: String,
    manufacturer: String,
    sensor_type: SensorType,
    features: BTreeMap<String, Feature>,
}

impl Sensor {
    fn from_spec(spec: SensorSpec) -> Self {
        let features = spec
            .features
            .into_iter()
            .map(|(name, info)| (name.clone(), Feature::new(&spec.topic, name, info)))
            .collect();

        Self {
            topic: spec.topic,
            name: spec.name,
            manufacturer: spec.manufacturer,
            sensor_type: spec.sensor_type,
            features,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn sensor_type(&self) -> &SensorType {
        &self.sensor_type
    }

    pub fn feature(&self, name: &str) -> Result<&Feature, RegistryError> {
        self.features
            .get(name)
            .ok_or_else(|| self.feature_not_found(name))
    }

    pub fn feature_mut(&mut self, name: &str) -> Result<&mut Feature, RegistryError> {
        let topic = &self.topic;
        self.features
            .get_mut(name)
            .ok_or_else(|| RegistryError::FeatureNotFound {
                sensor: topic.clone(),
                feature: name.to_string(),
            })
    }

    fn feature_not_found(&self, name: &str) -> RegistryError {
        RegistryError::FeatureNotFound {
            sensor: self.topic.clone(),
            feature: name.to_string(),
        }
    }

    /// Metadata message for this sensor.
    pub fn announcement(
        &self,
        announce_topic: &str,
        last_will_id: &str,
    ) -> Result<Announcement, BusError> {
        let meta = DeviceMeta {
            topic: &self.topic,
            name: &self.name,
            manufacturer: &self.manufacturer,
            sensor_type: self.sensor_type.as_str(),
            last_will_id,
            feature: self
                .features
                .values()
                .map(|f| {
                    (
                        f.name.as_str(),
                        FeatureMeta {
                            info: &f.info,
                            get_topic: &f.get_topic,
                        },
                    )
                })
                .collect(),
        };

        Ok(Announcement {
            topic: format!("{}/{}", announce_topic, self.topic),
            payload: serde_json::to_vec(&meta)?,
        })
    }

    pub async fn publish_metadata<T: Transport>(
        &self,
        transport: &T,
        announce_topic: &str,
        last_will_id: &str,
    ) -> Result<(), BusError> {
        let announcement = self.announcement(announce_topic, last_will_id)?;
        transport
            .publish(&announcement.topic, announcement.payload, true)
            .await
    }
}

/// Owns every sensor of the process.
#[derive(Debug)]
pub struct Registry {
    announce_topic: String,
    last_will_id: String,
    sensors: Vec<Sensor>,
}

impl Registry {
    pub fn new(announce_topic: impl Into<String>, last_will_id: impl Into<String>) -> Self {
        Self {
            announce_topic: announce_topic.into(),
            last_will_id: last_will_id.into(),
            sensors: Vec::new(),
        }
    }

    pub fn register(&mut self, spec: SensorSpec) -> Result<&Sensor, RegistryError> {
        if self.sensors.iter().any(|s| s.topic == spec.topic) {
            return Err(RegistryError::DuplicateTopic(spec.topic));
        }
        log::debug!("Registering {} sensor at {}", spec.sensor_type, spec.topic);
        self.sensors.push(Sensor::from_spec(spec));
        Ok(&self.sensors[self.sensors.len() - 1])
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut [Sensor] {
        &mut self.sensors
    }

    pub fn sensor(&self, topic: &str) -> Result<&Sensor, RegistryError> {
        self.sensors
            .iter()
            .find(|s| s.topic == topic)
            .ok_or_else(|| RegistryError::SensorNotFound(topic.to_string()))
    }

    pub fn get_feature(&self, topic: &str, feature: &str) -> Result<&Feature, RegistryError> {
        self.sensor(topic)?.feature(feature)
    }

    pub fn announcements(&self) -> Result<Vec<Announcement>, BusError> {
        self.sensors
            .iter()
            .map(|s| s.announcement(&self.announce_topic, &self.last_will_id))
            .collect()
    }

    /// Advertise every sensor. Must happen before the first value goes out.
    pub async fn announce_all<T: Transport>(&self, transport: &T) -> Result<(), BusError> {
        for sensor in &self.sensors {
            sensor
                .publish_metadata(transport, &self.announce_topic, &self.last_will_id)
                .await?;
            log::info!("Announced {} ({})", sensor.name, sensor.topic);
        }
        Ok(())
    }
}
