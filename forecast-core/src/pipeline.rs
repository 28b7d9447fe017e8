//! Orchestrates one acquisition: pick the input, check the network, fetch,
//! parse, cache, and publish the result to the displayed state.
//!
//! Every trigger takes a generation token. A result whose token is no longer
//! the latest is dropped before it can touch the view or the cache, so the
//! last triggered request decides what is shown regardless of completion order.
//!
//! Fallback policy: the offline pre-check and any fetch failure both fall
//! back to the cached aggregate, reported as stale. Parse failures do not.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, instrument, warn};

use crate::{
    Config,
    cache::{FileStore, LocalCache},
    connectivity::{AlwaysOnline, Connectivity, Offline, TcpProbe},
    error::{Result, WeatherError},
    fetcher::{HttpFetcher, OpenWeatherFetcher},
    location::{FixedLocation, LocationProvider},
    model::{Coordinates, Query, WeatherData},
    parser,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const BLANK_CITY_MESSAGE: &str = "Please enter a city name.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Locating,
    AwaitingCity,
    Fetching,
    Success,
    Fallback,
    Failed,
}

/// What a trigger produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Freshly fetched and cached.
    Current(WeatherData),
    /// Served from cache because the network path failed.
    Stale(WeatherData),
    /// No location fix; nothing fetched.
    AwaitingFix,
    /// A newer request started before this one finished; result discarded.
    Superseded,
}

/// Snapshot of what the caller should display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub phase: Phase,
    pub data: Option<WeatherData>,
    pub stale: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct Pipeline {
    fetcher: Arc<dyn HttpFetcher>,
    connectivity: Arc<dyn Connectivity>,
    location: Arc<dyn LocationProvider>,
    cache: LocalCache,
    timeout: Duration,
    generation: AtomicU64,
    view: Mutex<ViewState>,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn HttpFetcher>,
        connectivity: Arc<dyn Connectivity>,
        location: Arc<dyn LocationProvider>,
        cache: LocalCache,
    ) -> Self {
        Self {
            fetcher,
            connectivity,
            location,
            cache,
            timeout: DEFAULT_TIMEOUT,
            generation: AtomicU64::new(0),
            view: Mutex::new(ViewState::default()),
        }
    }

    /// Bound on a single provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn view(&self) -> ViewState {
        self.lock_view().clone()
    }

    /// Seed the view from the cache on a cold start. Returns what was shown.
    pub fn load_cached(&self) -> Option<WeatherData> {
        let data = self.cache.load()?;
        let mut view = self.lock_view();
        if view.data.is_none() {
            view.data = Some(data.clone());
            view.stale = true;
            view.phase = Phase::Fallback;
        }
        Some(data)
    }

    /// City search. Blank input is rejected without touching the network.
    #[instrument(skip(self))]
    pub async fn search_city(&self, name: &str) -> Result<Outcome> {
        let city = name.trim();
        if city.is_empty() {
            let mut view = self.lock_view();
            view.phase = Phase::AwaitingCity;
            view.error = Some(BLANK_CITY_MESSAGE.to_string());
            return Err(WeatherError::Validation(BLANK_CITY_MESSAGE.to_string()));
        }

        let token = self.next_token();
        self.run(token, Query::City(city.to_string())).await
    }

    /// Current-location refresh. No fix means no fetch, and no error.
    #[instrument(skip(self))]
    pub async fn refresh_location(&self) -> Result<Outcome> {
        {
            let mut view = self.lock_view();
            if view.phase == Phase::Idle {
                view.phase = Phase::Locating;
            }
        }

        // The token is only taken once there is something to fetch, so a
        // refresh without a fix never supersedes a request in flight.
        match self.location.current_fix().await {
            Some(fix) => {
                debug!(lat = fix.latitude(), lon = fix.longitude(), "got location fix");
                let token = self.next_token();
                self.run(token, Query::Coordinates(fix)).await
            }
            None => {
                debug!("no location fix, not fetching");
                Ok(Outcome::AwaitingFix)
            }
        }
    }

    async fn run(&self, token: u64, query: Query) -> Result<Outcome> {
        if !self.connectivity.is_reachable().await {
            info!(%query, "offline, using cache");
            return self.fall_back(token, WeatherError::Connectivity("offline".into()));
        }

        self.set_phase(token, Phase::Fetching);
        info!(%query, token, "fetching forecast");

        let fetched = match tokio::time::timeout(self.timeout, self.fetcher.fetch(&query)).await {
            Ok(res) => res,
            Err(_) => Err(WeatherError::Fetch(format!(
                "no response within {}s",
                self.timeout.as_secs_f32()
            ))),
        };

        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                warn!(%query, error = %e, "fetch failed");
                return self.fall_back(token, e);
            }
        };

        match parser::parse(&body) {
            Ok(data) => self.publish(token, data),
            Err(e) => {
                warn!(%query, error = %e, "provider payload rejected");
                self.fail(token, e)
            }
        }
    }

    /// Cache then display a fresh aggregate, unless a newer request exists.
    fn publish(&self, token: u64, data: WeatherData) -> Result<Outcome> {
        let mut view = self.lock_view();
        if !self.is_current(token) {
            debug!(token, "dropping superseded result");
            return Ok(Outcome::Superseded);
        }

        // Saved under the view lock so the cache slot and the display always
        // hold the same request's result.
        let saved = self.cache.save(&data);

        view.phase = Phase::Success;
        view.data = Some(data.clone());
        view.stale = false;
        view.error = saved.as_ref().err().map(ToString::to_string);

        saved.map(|()| Outcome::Current(data))
    }

    /// Show the cached aggregate as stale, or report `cause` when there is none.
    fn fall_back(&self, token: u64, cause: WeatherError) -> Result<Outcome> {
        let mut view = self.lock_view();
        if !self.is_current(token) {
            return Ok(Outcome::Superseded);
        }

        match self.cache.load() {
            Some(data) => {
                view.phase = Phase::Fallback;
                view.data = Some(data.clone());
                view.stale = true;
                view.error = Some(match cause {
                    WeatherError::Connectivity(_) => "offline".to_string(),
                    other => other.to_string(),
                });
                Ok(Outcome::Stale(data))
            }
            None => {
                let err = match cause {
                    WeatherError::Connectivity(_) => {
                        WeatherError::Connectivity("offline and nothing cached".into())
                    }
                    other => other,
                };
                view.phase = Phase::Failed;
                view.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Record the error; previously displayed data stays.
    fn fail(&self, token: u64, err: WeatherError) -> Result<Outcome> {
        let mut view = self.lock_view();
        if !self.is_current(token) {
            return Ok(Outcome::Superseded);
        }

        view.phase = Phase::Failed;
        view.error = Some(err.to_string());
        Err(err)
    }

    fn set_phase(&self, token: u64, phase: Phase) {
        let mut view = self.lock_view();
        if self.is_current(token) {
            view.phase = phase;
        }
    }

    fn next_token(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == token
    }

    fn lock_view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wire the production collaborators from configuration.
///
/// `offline` forces the cache-only path; `fix` overrides the configured location.
pub fn pipeline_from_config(
    config: &Config,
    offline: bool,
    fix: Option<Coordinates>,
) -> anyhow::Result<Pipeline> {
    // Offline runs never reach the fetcher, so they work without a key.
    let api_key = if offline {
        config.api_key().unwrap_or_default()
    } else {
        config.api_key()?
    };
    let fetcher = OpenWeatherFetcher::new(&config.endpoint, api_key, config.timeout())?;

    let probe_timeout = config.timeout().min(Duration::from_secs(3));
    let connectivity: Arc<dyn Connectivity> = if offline {
        Arc::new(Offline)
    } else {
        match TcpProbe::for_endpoint(&config.endpoint, probe_timeout) {
            Some(probe) => Arc::new(probe),
            None => {
                warn!(endpoint = %config.endpoint, "cannot probe endpoint, assuming online");
                Arc::new(AlwaysOnline)
            }
        }
    };

    let location = FixedLocation::new(fix.or(config.location));
    let cache = LocalCache::boxed(FileStore::new(config.cache_dir()?));

    Ok(Pipeline::new(Arc::new(fetcher), connectivity, Arc::new(location), cache)
        .with_timeout(config.timeout()))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::AtomicUsize,
    };

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        cache::{KeyValueStore, MemoryStore},
        connectivity::{AlwaysOnline, Offline},
        location::FixedLocation,
        model::Coordinates,
    };

    fn payload(temp: f64, desc: &str) -> String {
        json!({"list": [{
            "dt_txt": "2024-05-01 12:00:00",
            "main": {"temp": temp, "temp_min": temp - 1.0, "temp_max": temp + 1.0, "humidity": 50},
            "weather": [{"description": desc}],
            "wind": {"speed": 2.0}
        }]})
        .to_string()
    }

    #[derive(Debug, Default)]
    struct ScriptedFetcher {
        responses: HashMap<String, Result<String>>,
        gates: HashMap<String, Arc<Notify>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Query>>,
    }

    impl ScriptedFetcher {
        fn respond(mut self, key: &str, res: Result<String>) -> Self {
            self.responses.insert(key.to_string(), res);
            self
        }

        fn gate(mut self, key: &str, gate: Arc<Notify>) -> Self {
            self.gates.insert(key.to_string(), gate);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpFetcher for ScriptedFetcher {
        async fn fetch(&self, query: &Query) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(query.clone());

            let key = query.to_string();
            if let Some(gate) = self.gates.get(&key) {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.responses
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Err(WeatherError::Fetch(format!("no script for {key}"))))
        }
    }

    #[derive(Debug)]
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Err(WeatherError::Cache("read-only".into()))
        }
    }

    fn pipeline(fetcher: Arc<ScriptedFetcher>, online: bool) -> Pipeline {
        let connectivity: Arc<dyn Connectivity> = if online {
            Arc::new(AlwaysOnline)
        } else {
            Arc::new(Offline)
        };
        Pipeline::new(
            fetcher,
            connectivity,
            Arc::new(FixedLocation::default()),
            LocalCache::boxed(MemoryStore::new()),
        )
    }

    fn cached_sample() -> WeatherData {
        parser::parse(&payload(12.0, "mist")).unwrap()
    }

    #[tokio::test]
    async fn blank_city_never_fetches() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let p = pipeline(fetcher.clone(), true);

        for input in ["", " ", "\t", "\n  \r", "\u{3000}"] {
            let err = p.search_city(input).await.unwrap_err();
            assert_eq!(err, WeatherError::Validation(BLANK_CITY_MESSAGE.into()));
        }

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(p.view().phase, Phase::AwaitingCity);
    }

    #[tokio::test]
    async fn success_caches_and_clears_error() {
        let fetcher = Arc::new(
            ScriptedFetcher::default().respond("London", Ok(payload(14.2, "broken clouds"))),
        );
        let p = pipeline(fetcher.clone(), true);
        let _ = p.search_city("  ").await;

        let outcome = p.search_city(" London ").await.unwrap();

        let Outcome::Current(data) = outcome else {
            panic!("expected current data");
        };
        assert_eq!(data.today().temperature(), 14);
        assert_eq!(data.today().condition(), "Broken clouds");
        assert_eq!(p.cache().load(), Some(data.clone()));

        let view = p.view();
        assert_eq!(view.phase, Phase::Success);
        assert_eq!(view.data, Some(data));
        assert!(!view.stale);
        assert_eq!(view.error, None);
        assert_eq!(*fetcher.seen.lock().unwrap(), vec![Query::City("London".into())]);
    }

    #[tokio::test]
    async fn offline_without_cache_reports_no_data() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let p = pipeline(fetcher.clone(), false);

        let err = p.search_city("Oslo").await.unwrap_err();

        assert!(matches!(err, WeatherError::Connectivity(_)));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(p.view().phase, Phase::Failed);
    }

    #[tokio::test]
    async fn offline_with_cache_serves_stale() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let p = pipeline(fetcher.clone(), false);
        p.cache().save(&cached_sample()).unwrap();

        let outcome = p.search_city("Oslo").await.unwrap();

        assert_eq!(outcome, Outcome::Stale(cached_sample()));
        assert_eq!(fetcher.calls(), 0);
        let view = p.view();
        assert!(view.stale);
        assert_eq!(view.phase, Phase::Fallback);
    }

    #[tokio::test]
    async fn parse_error_keeps_cache_and_display() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("Berlin", Ok(payload(9.0, "drizzle")))
                .respond("Paris", Ok(r#"{"list":[{"dt_txt":"2024-05-01 12:00:00","weather":[{"description":"x"}],"wind":{"speed":1}}]}"#.into())),
        );
        let p = pipeline(fetcher, true);
        let Outcome::Current(berlin) = p.search_city("Berlin").await.unwrap() else {
            panic!("expected current data");
        };

        let err = p.search_city("Paris").await.unwrap_err();

        assert!(matches!(err, WeatherError::Parse(_)));
        assert_eq!(p.cache().load(), Some(berlin.clone()));
        let view = p.view();
        assert_eq!(view.data, Some(berlin));
        assert_eq!(view.phase, Phase::Failed);
        assert!(view.error.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_cache() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("Lima", Err(WeatherError::Fetch("status 502".into()))),
        );
        let p = pipeline(fetcher, true);
        p.cache().save(&cached_sample()).unwrap();

        let outcome = p.search_city("Lima").await.unwrap();

        assert_eq!(outcome, Outcome::Stale(cached_sample()));
        assert!(p.view().error.unwrap().contains("status 502"));
    }

    #[tokio::test]
    async fn fetch_failure_without_cache_is_fetch_error() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("Lima", Err(WeatherError::Fetch("status 401".into()))),
        );
        let p = pipeline(fetcher, true);

        let err = p.search_city("Lima").await.unwrap_err();

        assert_eq!(err, WeatherError::Fetch("status 401".into()));
        assert_eq!(p.cache().load(), None);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedFetcher::default()
        });
        let p = pipeline(fetcher, true).with_timeout(Duration::from_millis(50));

        let err = p.search_city("Quito").await.unwrap_err();

        assert!(matches!(err, WeatherError::Fetch(ref msg) if msg.contains("no response")));
    }

    #[tokio::test]
    async fn error_does_not_block_next_attempt() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("Nowhere", Err(WeatherError::Fetch("404".into())))
                .respond("Madrid", Ok(payload(28.0, "clear sky"))),
        );
        let p = pipeline(fetcher, true);

        assert!(p.search_city("Nowhere").await.is_err());
        assert!(matches!(
            p.search_city("Madrid").await,
            Ok(Outcome::Current(_))
        ));
        assert_eq!(p.view().error, None);
    }

    #[tokio::test]
    async fn later_search_wins_over_slower_earlier_one() {
        let rome_gate = Arc::new(Notify::new());
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("Rome", Ok(payload(22.0, "few clouds")))
                .respond("Milan", Ok(payload(16.0, "fog")))
                .gate("Rome", rome_gate.clone()),
        );
        let p = pipeline(fetcher, true);

        let (rome, milan) = tokio::join!(p.search_city("Rome"), async {
            let res = p.search_city("Milan").await;
            rome_gate.notify_one();
            res
        });

        assert_eq!(rome.unwrap(), Outcome::Superseded);
        let Outcome::Current(milan) = milan.unwrap() else {
            panic!("expected current data for Milan");
        };
        assert_eq!(milan.today().condition(), "Fog");
        assert_eq!(p.view().data, Some(milan.clone()));
        assert_eq!(p.cache().load(), Some(milan));
    }

    #[tokio::test]
    async fn location_without_fix_does_not_cancel_city_search() {
        let rome_gate = Arc::new(Notify::new());
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("Rome", Ok(payload(22.0, "few clouds")))
                .gate("Rome", rome_gate.clone()),
        );
        let p = pipeline(fetcher.clone(), true);

        let (rome, located) = tokio::join!(p.search_city("Rome"), async {
            let res = p.refresh_location().await;
            rome_gate.notify_one();
            res
        });

        assert_eq!(located.unwrap(), Outcome::AwaitingFix);
        let Outcome::Current(rome) = rome.unwrap() else {
            panic!("expected current data for Rome");
        };
        let view = p.view();
        assert_eq!(view.data, Some(rome));
        assert_eq!(view.phase, Phase::Success);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn no_fix_means_no_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let p = pipeline(fetcher.clone(), true);

        assert_eq!(p.refresh_location().await.unwrap(), Outcome::AwaitingFix);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(p.view().phase, Phase::Locating);
    }

    #[tokio::test]
    async fn location_fix_fetches_by_coordinates() {
        let fix = Coordinates::new(41.9, 12.5).unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::default().respond(
                &Query::Coordinates(fix).to_string(),
                Ok(payload(20.0, "sky is clear")),
            ),
        );
        let p = Pipeline::new(
            fetcher.clone(),
            Arc::new(AlwaysOnline),
            Arc::new(FixedLocation::new(Some(fix))),
            LocalCache::boxed(MemoryStore::new()),
        );

        assert!(matches!(
            p.refresh_location().await,
            Ok(Outcome::Current(_))
        ));
        assert_eq!(*fetcher.seen.lock().unwrap(), vec![Query::Coordinates(fix)]);
    }

    #[tokio::test]
    async fn cache_write_failure_is_reported_but_data_shown() {
        let fetcher =
            Arc::new(ScriptedFetcher::default().respond("Cairo", Ok(payload(35.0, "haze"))));
        let p = Pipeline::new(
            fetcher,
            Arc::new(AlwaysOnline),
            Arc::new(FixedLocation::default()),
            LocalCache::boxed(ReadOnlyStore(MemoryStore::new())),
        );

        let err = p.search_city("Cairo").await.unwrap_err();

        assert!(matches!(err, WeatherError::Cache(_)));
        let view = p.view();
        assert_eq!(view.phase, Phase::Success);
        assert!(view.data.is_some());
    }

    #[tokio::test]
    async fn cold_start_seeds_view_from_cache() {
        let p = pipeline(Arc::new(ScriptedFetcher::default()), true);
        assert_eq!(p.load_cached(), None);

        p.cache().save(&cached_sample()).unwrap();
        assert_eq!(p.load_cached(), Some(cached_sample()));

        let view = p.view();
        assert!(view.stale);
        assert_eq!(view.data, Some(cached_sample()));
    }

    #[test]
    fn wiring_requires_api_key() {
        let err = pipeline_from_config(&Config::default(), false, None).unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[tokio::test]
    async fn wired_offline_pipeline_needs_no_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        LocalCache::boxed(FileStore::new(dir.path()))
            .save(&cached_sample())
            .unwrap();

        let p = pipeline_from_config(&config, true, None).unwrap();

        assert_eq!(
            p.search_city("Paris").await.unwrap(),
            Outcome::Stale(cached_sample())
        );
    }

    #[tokio::test]
    async fn wired_offline_pipeline_uses_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        config.set_api_key("KEY".into());

        let p = pipeline_from_config(&config, true, None).unwrap();
        assert!(matches!(
            p.search_city("Oslo").await,
            Err(WeatherError::Connectivity(_))
        ));

        p.cache().save(&cached_sample()).unwrap();
        assert!(dir.path().join("weather_data.json").exists());
        assert_eq!(
            p.search_city("Oslo").await.unwrap(),
            Outcome::Stale(cached_sample())
        );
    }
}
