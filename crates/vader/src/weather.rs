//! Weather Underground "conditions" client.
//!
//! One request per fetch, no state kept between calls. The API key travels
//! in the URL path, so errors are stripped of their URL before they can end
//! up in a log line.

use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::time::Duration;

use crate::config::WeatherConfig;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors from a single fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {0}")]
    Status(u16),

    #[error("API error ({kind}): {description}")]
    Api { kind: String, description: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Current conditions are missing, check you have a valid API key")]
    MissingConditions,

    #[error("invalid field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

// ── Conditions ──────────────────────────────────────────────────────

/// Snapshot of the current weather, valid for a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub feels_like_celsius: f64,
    /// As reported, e.g. `"62%"`.
    pub relative_humidity: String,
    pub temperature_celsius: Option<f64>,
    pub weather: Option<String>,
    pub observation_time: Option<String>,
    pub location: Option<String>,
}

impl Conditions {
    /// Conditions carrying only the two values the sensors consume.
    pub fn new(feels_like_celsius: f64, relative_humidity: impl Into<String>) -> Self {
        Self {
            feels_like_celsius,
            relative_humidity: relative_humidity.into(),
            temperature_celsius: None,
            weather: None,
            observation_time: None,
            location: None,
        }
    }
}

/// Anything that can produce current conditions on demand.
pub trait WeatherSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Conditions, FetchError>> + Send;
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConditionsResponse {
    #[serde(default)]
    response: Option<ResponseMeta>,
    #[serde(default)]
    current_observation: Option<Observation>,
}

#[derive(Debug, Deserialize)]
struct ResponseMeta {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(deserialize_with = "number_or_string")]
    feelslike_c: NumberOrString,
    relative_humidity: String,
    #[serde(default)]
    temp_c: Option<f64>,
    #[serde(default)]
    weather: Option<String>,
    #[serde(default)]
    observation_time: Option<String>,
    #[serde(default)]
    display_location: Option<DisplayLocation>,
}

#[derive(Debug, Deserialize)]
struct DisplayLocation {
    full: String,
}

/// The API is inconsistent about quoting numbers.
#[derive(Debug)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn number_or_string<'de, D>(deserializer: D) -> Result<NumberOrString, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => NumberOrString::Number(n),
        Raw::Text(s) => NumberOrString::Text(s),
    })
}

/// Turn a raw API body into conditions.
pub fn parse_conditions(body: &str) -> Result<Conditions, FetchError> {
    let response: ConditionsResponse = serde_json::from_str(body)?;

    if let Some(error) = response.response.and_then(|meta| meta.error) {
        return Err(FetchError::Api {
            kind: error.kind,
            description: error.description,
        });
    }

    let observation = response
        .current_observation
        .ok_or(FetchError::MissingConditions)?;

    let feels_like_celsius = match observation.feelslike_c {
        NumberOrString::Number(n) => n,
        NumberOrString::Text(s) => {
            s.trim()
                .parse::<f64>()
                .map_err(|_| FetchError::InvalidField {
                    field: "feelslike_c",
                    value: s.clone(),
                })?
        }
    };

    Ok(Conditions {
        feels_like_celsius,
        relative_humidity: observation.relative_humidity,
        temperature_celsius: observation.temp_c,
        weather: observation.weather,
        observation_time: observation.observation_time,
        location: observation.display_location.map(|l| l.full),
    })
}

// ── Client ──────────────────────────────────────────────────────────

/// Client for the Weather Underground conditions endpoint.
#[derive(Debug)]
pub struct WundergroundClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    location: String,
}

impl WundergroundClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            location: config.location.clone(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn conditions_url(&self) -> String {
        format!(
            "{}/api/{}/conditions/q/{}.json",
            self.api_url, self.token, self.location
        )
    }

    /// Fetch the current conditions for the configured location.
    pub async fn fetch_conditions(&self) -> Result<Conditions, FetchError> {
        let response = self
            .client
            .get(self.conditions_url())
            .send()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;

        parse_conditions(&body)
    }
}

impl WeatherSource for WundergroundClient {
    async fn fetch(&self) -> Result<Conditions, FetchError> {
        self.fetch_conditions().await
    }
}
