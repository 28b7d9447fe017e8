//! Core library for the `forecast` CLI.
//!
//! This crate defines:
//! - The forecast model and the OpenWeather payload parser
//! - A single-slot offline cache over a pluggable key-value store
//! - Connectivity, location and HTTP collaborators behind traits
//! - The acquisition pipeline tying them together
//!
//! It is used by `forecast-cli`, but can also be embedded in other front ends.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod fetcher;
pub mod location;
pub mod model;
pub mod parser;
pub mod pipeline;

pub use cache::{FileStore, KeyValueStore, LocalCache, MemoryStore};
pub use config::Config;
pub use connectivity::{AlwaysOnline, Connectivity, Offline, TcpProbe};
pub use error::{ModelError, WeatherError};
pub use fetcher::{HttpFetcher, OpenWeatherFetcher};
pub use location::{FixedLocation, LocationProvider};
pub use model::{Coordinates, DayWeather, Query, TodayWeather, WeatherData};
pub use pipeline::{Outcome, Phase, Pipeline, ViewState, pipeline_from_config};
