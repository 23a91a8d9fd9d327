use super::{same_connector, Progress, RequestEvent, RequestSlot};
use crate::api::{ApiRequest, Endpoint, ErrorCode, RequestOutcome};
use crate::cache::{today, DateCache};
use crate::connector::Connector;
use crate::model::{as_object, json_has_any, DailyTotals, JsonObject, WattHour};
use crate::notify::{update_field, Notifier};
use crate::RequestStatus;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum DailyEnergyEvent {
    Request(RequestEvent),
    ConnectorChanged,
    SerialNumberChanged(String),
    DateChanged(Option<NaiveDate>),
    CachedChanged(bool),
    PhotovoltaicChanged(WattHour),
    InputChanged(WattHour),
    OutputChanged(WattHour),
    ChargeChanged(WattHour),
    DischargeChanged(WattHour),
    GridChargeChanged(WattHour),
    TotalLoadChanged(WattHour),
    RawJsonChanged,
    ValidChanged(bool),
}

impl From<RequestEvent> for DailyEnergyEvent {
    fn from(event: RequestEvent) -> Self {
        DailyEnergyEvent::Request(event)
    }
}

/// Energy totals of one storage system for one day (`getOneDateEnergyBySn`).
///
/// Results for past days are cached in memory, today's data is always fetched.
#[derive(Debug)]
pub struct DailyEnergy {
    connector: Option<Arc<Connector>>,
    serial_number: String,
    date: Option<NaiveDate>,
    cached: bool,
    cache: DateCache,
    totals: DailyTotals,
    total_load: WattHour,
    json: JsonObject,
    valid: bool,
    progress: Progress,
    slot: RequestSlot,
    notifier: Notifier<DailyEnergyEvent>,
}

impl DailyEnergy {
    /// Controller for `date`, defaulting to today.
    pub fn new(
        connector: Option<Arc<Connector>>,
        serial_number: &str,
        date: Option<NaiveDate>,
    ) -> Self {
        DailyEnergy {
            connector,
            serial_number: String::from(serial_number),
            date: Some(date.unwrap_or_else(today)),
            cached: true,
            cache: DateCache::default(),
            totals: DailyTotals::default(),
            total_load: 0,
            json: JsonObject::new(),
            valid: false,
            progress: Progress::default(),
            slot: RequestSlot::new(),
            notifier: Notifier::new(),
        }
    }

    pub fn connector(&self) -> Option<&Arc<Connector>> {
        self.connector.as_ref()
    }

    pub fn set_connector(&mut self, connector: Option<Arc<Connector>>) {
        if same_connector(&self.connector, &connector) {
            return;
        }
        self.connector = connector;
        self.notifier.emit(DailyEnergyEvent::ConnectorChanged);
        self.cache.clear();
        self.reset();
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn set_serial_number(&mut self, serial_number: &str) {
        if update_field(
            &mut self.serial_number,
            String::from(serial_number),
            &self.notifier,
            DailyEnergyEvent::SerialNumberChanged,
        ) {
            self.cache.clear();
            self.reset();
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Changes the queried day. Cached days are kept.
    pub fn set_date(&mut self, date: Option<NaiveDate>) {
        if update_field(
            &mut self.date,
            date,
            &self.notifier,
            DailyEnergyEvent::DateChanged,
        ) {
            self.clear();
        }
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    /// Disabling the cache discards it.
    pub fn set_cached(&mut self, cached: bool) {
        if update_field(
            &mut self.cached,
            cached,
            &self.notifier,
            DailyEnergyEvent::CachedChanged,
        ) && !cached
        {
            self.cache.clear();
        }
    }

    pub fn totals(&self) -> &DailyTotals {
        &self.totals
    }

    pub fn photovoltaic(&self) -> WattHour {
        self.totals.photovoltaic
    }

    pub fn input(&self) -> WattHour {
        self.totals.input
    }

    pub fn output(&self) -> WattHour {
        self.totals.output
    }

    pub fn charge(&self) -> WattHour {
        self.totals.charge
    }

    pub fn discharge(&self) -> WattHour {
        self.totals.discharge
    }

    pub fn grid_charge(&self) -> WattHour {
        self.totals.grid_charge
    }

    pub fn total_load(&self) -> WattHour {
        self.total_load
    }

    pub fn raw_json(&self) -> &JsonObject {
        &self.json
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn status(&self) -> RequestStatus {
        self.progress.status
    }

    pub fn error(&self) -> ErrorCode {
        self.progress.error
    }

    pub fn error_string(&self) -> &str {
        &self.progress.error_string
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DailyEnergyEvent> {
        self.notifier.subscribe()
    }

    /// Loads the current day, from the cache if possible.
    ///
    /// A cache hit is applied immediately and the status is `Finished` on return.
    pub fn reload(&mut self) -> bool {
        let connector = match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => {
                log::error!("Cannot reload daily energy without a connector");
                return false;
            }
        };

        if self.serial_number.is_empty() {
            log::warn!("Cannot reload daily energy without a serial number");
            return false;
        }

        let date = match self.date {
            Some(date) => date,
            None => {
                log::warn!("Cannot reload daily energy without a date");
                return false;
            }
        };

        if self.slot.cancel() {
            log::debug!("Cancelling daily energy request in flight");
        }

        if let Some(cached) = self.cache.get(&date).cloned() {
            log::debug!("Using cached daily energy of {}", date);
            self.process(Ok(cached));
            return true;
        }

        let mut request = ApiRequest::new(connector, Endpoint::OneDateEnergyBySn);
        request.set_sys_sn(&self.serial_number);
        request.set_query_date(date);
        if !self.slot.start(request) {
            return false;
        }

        self.progress.set_status(RequestStatus::Loading, &self.notifier);
        true
    }

    /// Discards all cached days, then reloads.
    pub fn force_reload(&mut self) -> bool {
        self.cache.clear();
        self.reload()
    }

    /// Drops the data of the current day, including its cache entry.
    pub fn reset(&mut self) {
        if let Some(date) = self.date {
            self.cache.remove(&date);
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.slot.cancel();
        self.apply(&JsonObject::new());
        self.progress.clear(&self.notifier);
    }

    pub async fn finished(&mut self) -> RequestStatus {
        if let Some(outcome) = self.slot.next().await {
            self.process(outcome);
        }
        self.status()
    }

    pub fn process_pending(&mut self) {
        while let Some(outcome) = self.slot.try_next() {
            self.process(outcome);
        }
    }

    fn process(&mut self, outcome: RequestOutcome) {
        match outcome {
            Ok(data) => {
                let json = as_object(&data);
                self.apply(&json);

                if let Some(date) = self.date {
                    if self.cached && self.valid && self.cache.insert(date, Value::Object(json)) {
                        log::trace!("Cached daily energy of {}", date);
                    }
                }

                self.progress.succeed(&self.notifier);
            }
            Err(error) => self.progress.fail(error, &self.notifier),
        }
    }

    fn apply(&mut self, json: &JsonObject) {
        let totals = DailyTotals::from_json(json);
        let notifier = &self.notifier;

        update_field(
            &mut self.totals.photovoltaic,
            totals.photovoltaic,
            notifier,
            DailyEnergyEvent::PhotovoltaicChanged,
        );
        update_field(
            &mut self.totals.input,
            totals.input,
            notifier,
            DailyEnergyEvent::InputChanged,
        );
        update_field(
            &mut self.totals.output,
            totals.output,
            notifier,
            DailyEnergyEvent::OutputChanged,
        );
        update_field(
            &mut self.totals.charge,
            totals.charge,
            notifier,
            DailyEnergyEvent::ChargeChanged,
        );
        update_field(
            &mut self.totals.discharge,
            totals.discharge,
            notifier,
            DailyEnergyEvent::DischargeChanged,
        );
        update_field(
            &mut self.totals.grid_charge,
            totals.grid_charge,
            notifier,
            DailyEnergyEvent::GridChargeChanged,
        );
        update_field(
            &mut self.total_load,
            totals.total_load(),
            notifier,
            DailyEnergyEvent::TotalLoadChanged,
        );

        if self.json != *json {
            self.json = json.clone();
            notifier.emit(DailyEnergyEvent::RawJsonChanged);
        }

        update_field(
            &mut self.valid,
            json_has_any(json, &DailyTotals::VALIDITY_KEYS),
            notifier,
            DailyEnergyEvent::ValidChanged,
        );
    }
}
