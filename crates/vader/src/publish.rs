//! Maps fetched conditions onto sensor features.

use crate::bus::Transport;
use crate::sensor::{Sensor, SensorType, CURRENT_RELATIVE_HUMIDITY, CURRENT_TEMPERATURE};
use crate::weather::Conditions;

/// Temperature with one decimal, `None` for NaN or infinity.
pub fn format_temperature(celsius: f64) -> Option<String> {
    celsius.is_finite().then(|| format!("{:.1}", celsius))
}

/// Humidity without its trailing percent sign.
pub fn strip_percent(humidity: &str) -> &str {
    let humidity = humidity.trim();
    humidity.strip_suffix('%').unwrap_or(humidity).trim_end()
}

/// Push the values from `conditions` to every sensor that wants one.
///
/// Best effort: a sensor whose value cannot be formatted or published is
/// logged and skipped. Returns how many feature updates went out.
pub async fn apply<T: Transport>(
    conditions: &Conditions,
    sensors: &mut [Sensor],
    transport: &T,
) -> usize {
    let mut published = 0;

    for sensor in sensors.iter_mut() {
        let (feature, value) = match sensor.sensor_type() {
            SensorType::TemperatureSensor => {
                match format_temperature(conditions.feels_like_celsius) {
                    Some(value) => (CURRENT_TEMPERATURE, value),
                    None => {
                        log::warn!(
                            "Skipping {}: temperature {} is not a number",
                            sensor.topic(),
                            conditions.feels_like_celsius
                        );
                        continue;
                    }
                }
            }
            SensorType::HumiditySensor => {
                let value = strip_percent(&conditions.relative_humidity);
                if value.is_empty() {
                    log::warn!(
                        "Skipping {}: empty relative humidity {:?}",
                        sensor.topic(),
                        conditions.relative_humidity
                    );
                    continue;
                }
                (CURRENT_RELATIVE_HUMIDITY, value.to_string())
            }
            SensorType::Other(_) => continue,
        };

        let topic = sensor.topic().to_string();
        let target = match sensor.feature_mut(feature) {
            Ok(target) => target,
            Err(e) => {
                log::warn!("Skipping {}: {}", topic, e);
                continue;
            }
        };

        log::debug!("{} {} = {}", topic, feature, value);
        match target.update(transport, value).await {
            Ok(()) => {
                published += 1;
                log::info!("Published {} for {}", feature, topic);
            }
            Err(e) => log::error!("Failed to publish {} for {}: {}", feature, topic, e),
        }
    }

    published
}
