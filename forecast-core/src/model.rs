use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Current conditions, taken from the first slot of the provider series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TodayRepr")]
pub struct TodayWeather {
    temperature: i32,
    condition: String,
    humidity: u8,
    /// km/h.
    wind_speed: i32,
}

impl TodayWeather {
    pub fn new(
        temperature: i32,
        condition: impl Into<String>,
        humidity: u8,
        wind_speed: i32,
    ) -> Result<Self, ModelError> {
        if humidity > 100 {
            return Err(ModelError::Humidity(humidity));
        }

        Ok(Self {
            temperature,
            condition: condition.into(),
            humidity,
            wind_speed,
        })
    }

    /// Degrees Celsius.
    pub fn temperature(&self) -> i32 {
        self.temperature
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> u8 {
        self.humidity
    }

    /// Wind speed in km/h.
    pub fn wind_speed(&self) -> i32 {
        self.wind_speed
    }
}

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DayRepr")]
pub struct DayWeather {
    date: String,
    min_temp: i32,
    max_temp: i32,
    description: String,
}

impl DayWeather {
    /// Builds a forecast day; `date` must be `YYYY-MM-DD` and `min_temp <= max_temp`.
    pub fn new(
        date: impl Into<String>,
        min_temp: i32,
        max_temp: i32,
        description: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let date = date.into();
        if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
            return Err(ModelError::Date(date));
        }
        if min_temp > max_temp {
            return Err(ModelError::InvertedRange {
                min: min_temp,
                max: max_temp,
            });
        }

        Ok(Self {
            date,
            min_temp,
            max_temp,
            description: description.into(),
        })
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn min_temp(&self) -> i32 {
        self.min_temp
    }

    pub fn max_temp(&self) -> i32 {
        self.max_temp
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// The aggregate exchanged between pipeline stages and cached as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    today_weather: TodayWeather,
    weekly_forecast: Vec<DayWeather>,
}

impl WeatherData {
    pub fn new(today_weather: TodayWeather, weekly_forecast: Vec<DayWeather>) -> Self {
        Self {
            today_weather,
            weekly_forecast,
        }
    }

    pub fn today(&self) -> &TodayWeather {
        &self.today_weather
    }

    /// Forecast days in chronological order.
    pub fn weekly_forecast(&self) -> &[DayWeather] {
        &self.weekly_forecast
    }
}

/// A resolved device coordinate; always finite and within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CoordinatesRepr")]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ModelError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if !valid {
            return Err(ModelError::Coordinates {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// What to ask the provider for.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    City(String),
    Coordinates(Coordinates),
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::City(name) => f.write_str(name),
            Query::Coordinates(c) => write!(f, "{:.4},{:.4}", c.latitude(), c.longitude()),
        }
    }
}

#[derive(Deserialize)]
struct CoordinatesRepr {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<CoordinatesRepr> for Coordinates {
    type Error = ModelError;

    fn try_from(r: CoordinatesRepr) -> Result<Self, Self::Error> {
        Coordinates::new(r.latitude, r.longitude)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodayRepr {
    temperature: i32,
    condition: String,
    humidity: u8,
    wind_speed: i32,
}

impl TryFrom<TodayRepr> for TodayWeather {
    type Error = ModelError;

    fn try_from(r: TodayRepr) -> Result<Self, Self::Error> {
        TodayWeather::new(r.temperature, r.condition, r.humidity, r.wind_speed)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayRepr {
    date: String,
    min_temp: i32,
    max_temp: i32,
    description: String,
}

impl TryFrom<DayRepr> for DayWeather {
    type Error = ModelError;

    fn try_from(r: DayRepr) -> Result<Self, Self::Error> {
        DayWeather::new(r.date, r.min_temp, r.max_temp, r.description)
    }
}
