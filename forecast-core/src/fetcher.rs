use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{
    error::{Result, WeatherError},
    model::Query,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Issues the provider request and hands back the raw body.
#[async_trait]
pub trait HttpFetcher: Send + Sync + Debug {
    async fn fetch(&self, query: &Query) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OpenWeatherFetcher {
    endpoint: String,
    api_key: String,
    http: Client,
}

impl OpenWeatherFetcher {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            http,
        })
    }

    fn query_params(&self, query: &Query) -> Vec<(&'static str, String)> {
        let mut params = match query {
            Query::City(name) => vec![("q", name.clone())],
            Query::Coordinates(c) => vec![
                ("lat", c.latitude().to_string()),
                ("lon", c.longitude().to_string()),
            ],
        };
        params.push(("units", "metric".to_string()));
        params.push(("appid", self.api_key.clone()));
        params
    }
}

#[async_trait]
impl HttpFetcher for OpenWeatherFetcher {
    async fn fetch(&self, query: &Query) -> Result<String> {
        debug!(%query, endpoint = %self.endpoint, "requesting forecast");

        let res = self
            .http
            .get(&self.endpoint)
            .query(&self.query_params(query))
            .send()
            .await
            .map_err(|e| WeatherError::Fetch(format!("request to OpenWeather failed: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| WeatherError::Fetch(format!("failed to read OpenWeather body: {e}")))?;

        if !status.is_success() {
            return Err(WeatherError::Fetch(format!(
                "OpenWeather request failed with status {}: {}",
                status,
                truncate_body(&body),
            )));
        }

        Ok(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
