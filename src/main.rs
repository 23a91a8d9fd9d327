#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use alphacloud_rs::api::{self, RequestError};
use alphacloud_rs::cache::today;
use alphacloud_rs::{
    Configuration, Connector, DailyEnergy, DayPowerSeries, DeviceInventory, ErrorCode, LiveData,
    RequestStatus,
};
use chrono::NaiveDate;
use config::Config;
use rocket::response::content::RawJson;
use rocket::{Build, Rocket, State};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

mod metrics;

const DEFAULT_INTERVAL: i64 = 60;
const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, serde::Deserialize)]
pub struct AlphacloudSettings {
    /// INI file to read the API credentials from, the platform default if unset.
    config_file: Option<String>,
    api_url: Option<String>,
    app_id: Option<String>,
    app_secret: Option<String>,
    interval: u64,
    /// Storage system to report on, the first one bound to the application if unset.
    serial_number: Option<String>,
}

/// Controllers shared by all handlers, driven one request at a time.
pub struct Controllers {
    inventory: DeviceInventory,
    live: LiveData,
    energy: DailyEnergy,
    history: DayPowerSeries,
    serial_number: Option<String>,
}

/// Maps the terminal state of a controller onto a handler result.
fn outcome(status: RequestStatus, error: ErrorCode, error_string: &str) -> Result<(), api::Error> {
    match status {
        RequestStatus::Finished => Ok(()),
        RequestStatus::Error => Err(RequestError::new(error, error_string).into()),
        _ => Err(api::Error::InternalError(format!(
            "request ended in state {:?}",
            status
        ))),
    }
}

fn not_sent(what: &str) -> api::Error {
    api::Error::Configuration(format!(
        "unable to request {}, check the application id and secret",
        what
    ))
}

impl Controllers {
    fn new(connector: Arc<Connector>, serial_number: Option<String>) -> Self {
        let connector = Some(connector);
        Controllers {
            inventory: DeviceInventory::new(connector.clone()),
            live: LiveData::new(connector.clone(), ""),
            energy: DailyEnergy::new(connector.clone(), "", None),
            history: DayPowerSeries::new(connector, "", None),
            serial_number,
        }
    }

    async fn refresh_inventory(&mut self) -> Result<(), api::Error> {
        if !self.inventory.reload() {
            return Err(not_sent("storage systems"));
        }
        let status = self.inventory.finished().await;
        outcome(status, self.inventory.error(), self.inventory.error_string())
    }

    /// Configured serial number, or the primary one of the inventory.
    async fn system(&mut self) -> Result<String, api::Error> {
        if let Some(serial_number) = &self.serial_number {
            return Ok(serial_number.clone());
        }

        if self.inventory.primary_serial_number().is_empty() {
            self.refresh_inventory().await?;
        }

        match self.inventory.primary_serial_number() {
            "" => Err(api::Error::NoSystem),
            serial_number => Ok(String::from(serial_number)),
        }
    }

    async fn refresh_live(&mut self, serial_number: &str) -> Result<(), api::Error> {
        self.live.set_serial_number(serial_number);
        if !self.live.reload() {
            return Err(not_sent("live data"));
        }
        let status = self.live.finished().await;
        outcome(status, self.live.error(), self.live.error_string())
    }

    async fn refresh_energy(
        &mut self,
        serial_number: &str,
        date: NaiveDate,
    ) -> Result<(), api::Error> {
        self.energy.set_serial_number(serial_number);
        self.energy.set_date(Some(date));
        if !self.energy.reload() {
            return Err(not_sent("daily energy"));
        }
        let status = self.energy.finished().await;
        outcome(status, self.energy.error(), self.energy.error_string())
    }

    async fn refresh_history(
        &mut self,
        serial_number: &str,
        date: NaiveDate,
    ) -> Result<(), api::Error> {
        self.history.set_serial_number(serial_number);
        self.history.set_date(Some(date));
        if !self.history.reload() {
            return Err(not_sent("power history"));
        }
        let status = self.history.finished().await;
        outcome(status, self.history.error(), self.history.error_string())
    }
}

/// Structure containing state for API handlers.
pub struct StateData {
    controllers: tokio::sync::Mutex<Controllers>,
    interval: u64,
    /// Timestamp of last successful metric collection via `metrics::collect()`
    timestamp: Mutex<Option<Instant>>,
}

impl StateData {
    /// Updates `timestamp` to `now()`.
    fn touch(&self) {
        if let Ok(mut ts) = self.timestamp.lock() {
            *ts = Some(Instant::now());
        } else {
            log::trace!("Unable to lock timestamp mutex, will refresh again")
        }
    }

    /// Checks whether `interval_seconds` elapsed since last `touch()`
    fn interval_elapsed(&self, interval_secs: u64) -> bool {
        let elapsed_opt = self
            .timestamp
            .lock()
            .ok()
            .and_then(|a| a.map(|b| b.elapsed().as_secs()));

        if let Some(elapsed) = elapsed_opt {
            elapsed > interval_secs
        } else {
            /* If there is None timestamp/elapsed, always return true to trigger action */
            true
        }
    }
}

pub fn read_settings() -> Result<AlphacloudSettings, config::ConfigError> {
    let mut settings = Config::default();
    settings
        .merge(config::Environment::with_prefix("ALPHACLOUD"))?
        .set_default("interval", DEFAULT_INTERVAL)?;

    settings.try_into()
}

/// API configuration from the INI file, overridden by the environment.
fn configuration(settings: &AlphacloudSettings) -> Configuration {
    let mut configuration = match &settings.config_file {
        Some(path) => Configuration::load(Path::new(path)),
        None => Configuration::load_default(),
    };

    if let Some(api_url) = &settings.api_url {
        configuration.set_api_url(api_url);
    }
    if let Some(app_id) = &settings.app_id {
        configuration.set_app_id(app_id);
    }
    if let Some(app_secret) = &settings.app_secret {
        configuration.set_app_secret(app_secret);
    }

    if !configuration.valid() {
        log::warn!("Application id or secret missing, requests will fail");
    }
    configuration
}

fn parse_date(date: Option<&str>) -> Result<NaiveDate, api::Error> {
    match date {
        None => Ok(today()),
        Some(date) => NaiveDate::parse_from_str(date, QUERY_DATE_FORMAT)
            .map_err(|_| api::Error::InvalidDate(String::from(date))),
    }
}

#[get("/metrics")]
async fn metrics_route(state: &State<StateData>) -> Result<String, api::Error> {
    if state.interval_elapsed(state.interval) {
        let mut controllers = state.controllers.lock().await;
        metrics::collect(&mut controllers).await?;
        state.touch();
    } else {
        log::info!("interval time not yet elapsed since last run; returning cached result")
    }
    metrics::read().await
}

#[get("/systems")]
async fn systems_route(state: &State<StateData>) -> Result<RawJson<String>, api::Error> {
    let mut controllers = state.controllers.lock().await;
    controllers.refresh_inventory().await?;
    Ok(RawJson(controllers.inventory.raw_json().to_string()))
}

#[get("/live")]
async fn live_route(state: &State<StateData>) -> Result<RawJson<String>, api::Error> {
    let mut controllers = state.controllers.lock().await;
    let serial_number = controllers.system().await?;
    controllers.refresh_live(&serial_number).await?;
    Ok(RawJson(
        Value::Object(controllers.live.raw_json().clone()).to_string(),
    ))
}

#[get("/energy?<date>")]
async fn energy_route(
    state: &State<StateData>,
    date: Option<&str>,
) -> Result<RawJson<String>, api::Error> {
    let date = parse_date(date)?;
    let mut controllers = state.controllers.lock().await;
    let serial_number = controllers.system().await?;
    controllers.refresh_energy(&serial_number, date).await?;
    Ok(RawJson(
        Value::Object(controllers.energy.raw_json().clone()).to_string(),
    ))
}

#[get("/history?<date>")]
async fn history_route(
    state: &State<StateData>,
    date: Option<&str>,
) -> Result<RawJson<String>, api::Error> {
    let date = parse_date(date)?;
    let mut controllers = state.controllers.lock().await;
    let serial_number = controllers.system().await?;
    controllers.refresh_history(&serial_number, date).await?;
    Ok(RawJson(controllers.history.raw_json().to_string()))
}

#[launch]
fn rocket() -> Rocket<Build> {
    env_logger::init();

    let settings = read_settings().expect("Configuration error");
    let connector =
        Connector::with_reqwest(configuration(&settings)).expect("Unable to build HTTP client");
    let state = StateData {
        controllers: tokio::sync::Mutex::new(Controllers::new(
            Arc::new(connector),
            settings.serial_number.clone(),
        )),
        interval: settings.interval,
        timestamp: Mutex::new(None),
    };

    rocket::build().manage(state).mount(
        "/",
        routes![
            metrics_route,
            systems_route,
            live_route,
            energy_route,
            history_route
        ],
    )
}
