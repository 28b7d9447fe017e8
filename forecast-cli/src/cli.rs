use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use forecast_core::{
    Config, Coordinates, FileStore, LocalCache, Outcome, Pipeline, WeatherError,
    pipeline_from_config,
};
use inquire::{Password, PasswordDisplayMode};
use tracing::debug;

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Current conditions and a 7-day forecast")]
pub struct Cli {
    /// Skip the network and show cached data only.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure,

    /// Show the forecast for a city.
    Show {
        /// City name, e.g. "Paris" or "Paris,FR".
        city: String,
    },

    /// Show the forecast for the current location.
    Here {
        /// Latitude; overrides the configured location.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude; overrides the configured location.
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Print the last cached forecast without touching the network.
    Cached,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure => {
                let key = Password::new("OpenWeather API key:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;
                config.set_api_key(key.trim().to_string());
                config.save()?;
                println!("Saved to {}", Config::config_file_path()?.display());
            }
            Command::Show { city } => {
                let pipeline = pipeline_from_config(&config, self.offline, None)?;
                let result = pipeline.search_city(&city).await;
                report(&pipeline, result)?;
            }
            Command::Here { lat, lon } => {
                let fix = match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)?),
                    _ => None,
                };
                let pipeline = pipeline_from_config(&config, self.offline, fix)?;
                pipeline.load_cached();

                let result = pipeline.refresh_location().await;
                report(&pipeline, result)?;
            }
            Command::Cached => {
                let cache = LocalCache::boxed(FileStore::new(config.cache_dir()?));
                match cache.load() {
                    Some(data) => print!("{}", render::weather(&data, true)),
                    None => bail!("Nothing cached yet."),
                }
            }
        }

        Ok(())
    }
}

fn report(pipeline: &Pipeline, result: Result<Outcome, WeatherError>) -> anyhow::Result<()> {
    let out = output(pipeline, result)?;
    for line in &out.notices {
        eprintln!("{line}");
    }
    print!("{}", out.text);
    Ok(())
}

/// What a finished request shows: the rendered forecast and any notices for stderr.
#[derive(Debug, Default)]
struct Output {
    text: String,
    notices: Vec<String>,
}

fn output(pipeline: &Pipeline, result: Result<Outcome, WeatherError>) -> anyhow::Result<Output> {
    let view = pipeline.view();
    debug!(phase = ?view.phase, "pipeline finished");

    let mut out = Output::default();
    match result {
        Ok(Outcome::Current(data)) => out.text = render::weather(&data, false),
        Ok(Outcome::Stale(data)) => {
            out.notices.extend(view.error.clone());
            out.text = render::weather(&data, true);
        }
        Ok(Outcome::AwaitingFix) => {
            // No fix is a steady state: show what the cache seeded, if anything.
            if let Some(data) = &view.data {
                out.text = render::weather(data, view.stale);
            }
            let config_path = Config::config_file_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the config file".to_string());
            out.notices.push(format!(
                "No location available.\n\
                 Hint: pass --lat/--lon or add a [location] table to {config_path}"
            ));
        }
        Ok(Outcome::Superseded) => {}
        Err(WeatherError::Cache(e)) => {
            // The forecast is still good; only persisting it failed.
            if let Some(data) = &view.data {
                out.text = render::weather(data, false);
            }
            out.notices.push(format!("warning: {e}"));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(out)
}
