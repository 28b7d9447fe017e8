//! Turns an OpenWeather 5-day/3-hour forecast payload into [`WeatherData`].
//!
//! Numbers are truncated toward zero when converted to integers. Wind speed
//! arrives in m/s (`units=metric`) and is normalized to km/h here, once.
//!
//! The weekly forecast samples every [`SLOTS_PER_DAY`]th entry starting at
//! index 0. That picks one 3-hour snapshot per day rather than aggregating the
//! real daily min/max; it is a known approximation.

use serde::Deserialize;

use crate::{
    error::{Result, WeatherError},
    model::{DayWeather, TodayWeather, WeatherData},
};

/// The provider emits one entry per 3-hour slot.
pub const SLOTS_PER_DAY: usize = 8;

const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt_txt: String,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

/// Parse a raw provider payload. Never returns a partially populated model.
pub fn parse(payload: &str) -> Result<WeatherData> {
    let parsed: OwForecastResponse =
        serde_json::from_str(payload).map_err(|e| WeatherError::Parse(e.to_string()))?;

    let first = parsed
        .list
        .first()
        .ok_or_else(|| WeatherError::Parse("forecast list is empty".into()))?;

    let today = TodayWeather::new(
        truncate(first.main.temp, "main.temp")?,
        capitalize(description(first)?),
        humidity(first.main.humidity)?,
        truncate(first.wind.speed * MPS_TO_KMH, "wind.speed")?,
    )?;

    let weekly = parsed
        .list
        .iter()
        .step_by(SLOTS_PER_DAY)
        .map(day_from_entry)
        .collect::<Result<Vec<_>>>()?;

    Ok(WeatherData::new(today, weekly))
}

/// Uppercase the first character, leave the rest untouched.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn day_from_entry(entry: &OwForecastEntry) -> Result<DayWeather> {
    let date = entry
        .dt_txt
        .split(' ')
        .next()
        .unwrap_or_default();

    Ok(DayWeather::new(
        date,
        truncate(entry.main.temp_min, "main.temp_min")?,
        truncate(entry.main.temp_max, "main.temp_max")?,
        capitalize(description(entry)?),
    )?)
}

fn description(entry: &OwForecastEntry) -> Result<&str> {
    entry
        .weather
        .first()
        .map(|w| w.description.as_str())
        .ok_or_else(|| WeatherError::Parse(format!("no weather block for {}", entry.dt_txt)))
}

fn truncate(value: f64, field: &str) -> Result<i32> {
    if !value.is_finite() || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(WeatherError::Parse(format!("{field} out of range: {value}")));
    }
    Ok(value.trunc() as i32)
}

fn humidity(value: f64) -> Result<u8> {
    if !(0.0..=100.0).contains(&value) {
        return Err(WeatherError::Parse(format!(
            "main.humidity out of range: {value}"
        )));
    }
    Ok(value.trunc() as u8)
}
