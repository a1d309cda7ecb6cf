//! Publish adapter against a recording transport.

mod common;

use std::collections::BTreeMap;

use common::{weather_registry, RecordingTransport};
use vader::publish::apply;
use vader::sensor::{
    FeatureInfo, SensorSpec, SensorType, CURRENT_RELATIVE_HUMIDITY, CURRENT_TEMPERATURE,
    HUMIDITY_TOPIC, TEMPERATURE_TOPIC,
};
use vader::weather::Conditions;

const TEMPERATURE_GET: &str = "sensor/temperature/wunderground/currentTemperature/get";
const HUMIDITY_GET: &str = "sensor/humidity/wunderground/currentRelativeHumidity/get";

#[tokio::test]
async fn updates_one_feature_per_sensor() {
    let transport = RecordingTransport::new();
    let mut registry = weather_registry();

    let published = apply(
        &Conditions::new(18.4, "62%"),
        registry.sensors_mut(),
        &transport,
    )
    .await;

    assert_eq!(published, 2);
    assert_eq!(transport.values_on(TEMPERATURE_GET), vec!["18.4"]);
    assert_eq!(transport.values_on(HUMIDITY_GET), vec!["62"]);
    assert!(transport.published().iter().all(|p| p.retain));

    assert_eq!(
        registry
            .get_feature(TEMPERATURE_TOPIC, CURRENT_TEMPERATURE)
            .unwrap()
            .value(),
        Some("18.4")
    );
    assert_eq!(
        registry
            .get_feature(HUMIDITY_TOPIC, CURRENT_RELATIVE_HUMIDITY)
            .unwrap()
            .value(),
        Some("62")
    );
}

#[tokio::test]
async fn unchanged_values_are_published_again() {
    let transport = RecordingTransport::new();
    let mut registry = weather_registry();
    let conditions = Conditions::new(-3.2, "91");

    apply(&conditions, registry.sensors_mut(), &transport).await;
    apply(&conditions, registry.sensors_mut(), &transport).await;

    assert_eq!(transport.values_on(TEMPERATURE_GET), vec!["-3.2", "-3.2"]);
    assert_eq!(transport.values_on(HUMIDITY_GET), vec!["91", "91"]);
}

#[tokio::test]
async fn unknown_sensor_type_is_ignored() {
    let transport = RecordingTransport::new();
    let mut registry = weather_registry();
    registry
        .register(SensorSpec {
            topic: "sensor/wind/wunderground".to_string(),
            name: "Wind (outside)".to_string(),
            manufacturer: "vader".to_string(),
            sensor_type: SensorType::Other("windSensor".to_string()),
            features: BTreeMap::from([("currentWindSpeed".to_string(), FeatureInfo::default())]),
        })
        .unwrap();

    let published = apply(
        &Conditions::new(10.0, "40%"),
        registry.sensors_mut(),
        &transport,
    )
    .await;

    assert_eq!(published, 2);
    assert!(transport
        .published()
        .iter()
        .all(|p| !p.topic.starts_with("sensor/wind")));
    assert_eq!(
        registry
            .get_feature("sensor/wind/wunderground", "currentWindSpeed")
            .unwrap()
            .value(),
        None
    );
}

#[tokio::test]
async fn bad_temperature_does_not_stop_humidity() {
    let transport = RecordingTransport::new();
    let mut registry = weather_registry();

    let published = apply(
        &Conditions::new(f64::NAN, "70%"),
        registry.sensors_mut(),
        &transport,
    )
    .await;

    assert_eq!(published, 1);
    assert!(transport.values_on(TEMPERATURE_GET).is_empty());
    assert_eq!(transport.values_on(HUMIDITY_GET), vec!["70"]);
}

#[tokio::test]
async fn failed_publish_keeps_previous_value() {
    let transport = RecordingTransport::new();
    let mut registry = weather_registry();

    apply(
        &Conditions::new(12.0, "50%"),
        registry.sensors_mut(),
        &transport,
    )
    .await;

    transport.fail_on(TEMPERATURE_GET);
    let published = apply(
        &Conditions::new(13.5, "55%"),
        registry.sensors_mut(),
        &transport,
    )
    .await;

    assert_eq!(published, 1);
    assert_eq!(
        registry
            .get_feature(TEMPERATURE_TOPIC, CURRENT_TEMPERATURE)
            .unwrap()
            .value(),
        Some("12.0")
    );
    assert_eq!(
        registry
            .get_feature(HUMIDITY_TOPIC, CURRENT_RELATIVE_HUMIDITY)
            .unwrap()
            .value(),
        Some("55")
    );
}

#[tokio::test]
async fn sensor_missing_its_feature_is_skipped() {
    let transport = RecordingTransport::new();
    let mut registry = vader::Registry::new("announce", "vader");
    registry
        .register(SensorSpec {
            topic: "sensor/temperature/broken".to_string(),
            name: "Broken".to_string(),
            manufacturer: "vader".to_string(),
            sensor_type: SensorType::TemperatureSensor,
            features: BTreeMap::new(),
        })
        .unwrap();
    registry
        .register(vader::sensor::weather_sensors()[1].clone())
        .unwrap();

    let published = apply(
        &Conditions::new(20.0, "33%"),
        registry.sensors_mut(),
        &transport,
    )
    .await;

    assert_eq!(published, 1);
    assert_eq!(transport.values_on(HUMIDITY_GET), vec!["33"]);
}
