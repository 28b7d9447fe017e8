use thiserror::Error;

/// Errors reported by a single acquisition attempt.
///
/// Every variant is terminal for that attempt only; the pipeline stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    /// Input rejected before reaching the network (e.g. blank city name).
    #[error("{0}")]
    Validation(String),

    /// Offline and no cached forecast to show.
    #[error("No data available: {0}")]
    Connectivity(String),

    /// Network or provider failure.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Provider payload did not have the expected shape.
    #[error("Failed to parse forecast: {0}")]
    Parse(String),

    /// Local cache could not be written (or the store failed to read).
    #[error("Cache error: {0}")]
    Cache(String),
}

/// Invariant violations when building model values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("min temperature {min} is above max temperature {max}")]
    InvertedRange { min: i32, max: i32 },

    #[error("humidity {0}% is outside 0..=100")]
    Humidity(u8),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    Date(String),

    #[error("invalid coordinates ({latitude}, {longitude})")]
    Coordinates { latitude: f64, longitude: f64 },
}

impl From<ModelError> for WeatherError {
    fn from(e: ModelError) -> Self {
        WeatherError::Parse(e.to_string())
    }
}

pub type Result<T, E = WeatherError> = std::result::Result<T, E>;
