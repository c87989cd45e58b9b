use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::data::sources::ForecastSource;
use crate::data::types::{normalize_location_key, ForecastPoint};

pub const SOURCE_NAME: &str = "open-meteo";

/// Open-Meteo geocoding + daily forecast client.
pub struct WeatherClient {
    client: Client,
    geocode_url: String,
    forecast_url: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
struct GeocodedPlace {
    name: String,
    latitude: f64,
    longitude: f64,
    raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DailyForecastResponse {
    daily: Option<DailyForecast>,
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
}

impl WeatherClient {
    pub fn new(geocode_url: String, forecast_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("weather-edge/0.1")
            .build()
            .context("Failed to build weather HTTP client")?;

        Ok(Self {
            client,
            geocode_url,
            forecast_url,
        })
    }

    /// Resolve a place name to coordinates (first geocoder hit).
    async fn geocode(&self, name: &str) -> Result<Option<GeocodedPlace>> {
        let response = self
            .client
            .get(&self.geocode_url)
            .query(&[("name", name), ("count", "1"), ("language", "en"), ("format", "json")])
            .send()
            .await
            .context("Failed to reach geocoder")?;

        if !response.status().is_success() {
            warn!("Geocoder returned HTTP {} for {}", response.status(), name);
            return Ok(None);
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .context("Failed to parse geocoder response")?;

        Ok(body
            .results
            .into_iter()
            .next()
            .and_then(|raw| parse_geocode_result(raw, name)))
    }

    /// Daily mean temperature in °F: midpoint of the forecast max and min.
    async fn fetch_daily_mean(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Option<(f64, serde_json::Value)>> {
        let date = date.format("%Y-%m-%d").to_string();
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("daily", "temperature_2m_max,temperature_2m_min".to_string()),
                ("start_date", date.clone()),
                ("end_date", date),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await
            .context("Failed to reach forecast API")?;

        if !response.status().is_success() {
            warn!("Forecast API returned HTTP {}", response.status());
            return Ok(None);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse forecast response")?;

        Ok(daily_mean(&raw).map(|mean| (mean, raw)))
    }
}

fn parse_geocode_result(raw: serde_json::Value, fallback_name: &str) -> Option<GeocodedPlace> {
    let latitude = raw.get("latitude")?.as_f64()?;
    let longitude = raw.get("longitude")?.as_f64()?;
    let name = raw
        .get("name")
        .and_then(|n| n.as_str())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(fallback_name)
        .to_string();

    Some(GeocodedPlace {
        name,
        latitude,
        longitude,
        raw,
    })
}

fn daily_mean(raw: &serde_json::Value) -> Option<f64> {
    let parsed: DailyForecastResponse = serde_json::from_value(raw.clone()).ok()?;
    let daily = parsed.daily?;
    let max = daily.temperature_2m_max.first().copied().flatten()?;
    let min = daily.temperature_2m_min.first().copied().flatten()?;
    Some((max + min) / 2.0)
}

#[async_trait]
impl ForecastSource for WeatherClient {
    async fn fetch_forecast(
        &self,
        location_name: &str,
        target_date: NaiveDate,
    ) -> Result<Option<ForecastPoint>> {
        let Some(place) = self.geocode(location_name).await? else {
            info!("No geocoder match for {}", location_name);
            return Ok(None);
        };

        debug!(
            "Geocoded {} -> {} ({:.4}, {:.4})",
            location_name, place.name, place.latitude, place.longitude
        );

        let Some((temperature_f, forecast_raw)) = self
            .fetch_daily_mean(place.latitude, place.longitude, target_date)
            .await?
        else {
            info!("No daily forecast for {} on {}", place.name, target_date);
            return Ok(None);
        };

        Ok(Some(ForecastPoint {
            location_key: normalize_location_key(&place.name),
            location_name: place.name,
            latitude: place.latitude,
            longitude: place.longitude,
            target_date,
            temperature_f,
            source: SOURCE_NAME.to_string(),
            raw: json!({ "geocode": place.raw, "forecast": forecast_raw }),
        }))
    }
}
