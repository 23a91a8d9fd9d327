use super::{same_connector, Progress, RequestEvent, RequestSlot};
use crate::api::{ApiRequest, Endpoint, ErrorCode, RequestOutcome};
use crate::cache::{today, DateCache};
use crate::connector::Connector;
use crate::model::{PowerEntry, Watt};
use crate::notify::{update_field, Notifier};
use crate::RequestStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum DayPowerEvent {
    Request(RequestEvent),
    ConnectorChanged,
    SerialNumberChanged(String),
    DateChanged(Option<NaiveDate>),
    CachedChanged(bool),
    /// All entries were replaced.
    ModelReset,
    CountChanged(usize),
    FromDateTimeChanged(Option<NaiveDateTime>),
    ToDateTimeChanged(Option<NaiveDateTime>),
    PeakPhotovoltaicChanged(Watt),
    PeakCurrentLoadChanged(Watt),
    PeakGridFeedChanged(Watt),
    PeakGridChargeChanged(Watt),
}

impl From<RequestEvent> for DayPowerEvent {
    fn from(event: RequestEvent) -> Self {
        DayPowerEvent::Request(event)
    }
}

/// Maxima over a series, starting at 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Peaks {
    pub photovoltaic: Watt,
    pub current_load: Watt,
    pub grid_feed: Watt,
    pub grid_charge: Watt,
}

/// Parses `array` into entries sorted by upload time, collecting the peaks on the way.
pub fn reconcile(array: &[Value]) -> (Vec<PowerEntry>, Peaks) {
    let mut peaks = Peaks::default();
    let mut entries: Vec<PowerEntry> = array
        .iter()
        .map(|value| {
            let entry = PowerEntry::from_json(value);
            peaks.photovoltaic = peaks.photovoltaic.max(entry.photovoltaic_power);
            peaks.current_load = peaks.current_load.max(entry.current_load);
            peaks.grid_feed = peaks.grid_feed.max(entry.grid_feed);
            peaks.grid_charge = peaks.grid_charge.max(entry.grid_charge);
            entry
        })
        .collect();

    /* stable, the API does not guarantee order */
    entries.sort_by(|a, b| a.upload_time.cmp(&b.upload_time));

    (entries, peaks)
}

/// Power curve of one storage system for one day (`getOneDayPowerBySn`).
#[derive(Debug)]
pub struct DayPowerSeries {
    connector: Option<Arc<Connector>>,
    serial_number: String,
    date: Option<NaiveDate>,
    cached: bool,
    cache: DateCache,
    entries: Vec<PowerEntry>,
    from_date_time: Option<NaiveDateTime>,
    to_date_time: Option<NaiveDateTime>,
    peaks: Peaks,
    progress: Progress,
    slot: RequestSlot,
    notifier: Notifier<DayPowerEvent>,
}

impl DayPowerSeries {
    /// Series for `date`, defaulting to today.
    pub fn new(
        connector: Option<Arc<Connector>>,
        serial_number: &str,
        date: Option<NaiveDate>,
    ) -> Self {
        DayPowerSeries {
            connector,
            serial_number: String::from(serial_number),
            date: Some(date.unwrap_or_else(today)),
            cached: true,
            cache: DateCache::default(),
            entries: Vec::new(),
            from_date_time: None,
            to_date_time: None,
            peaks: Peaks::default(),
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
        self.notifier.emit(DayPowerEvent::ConnectorChanged);
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
            DayPowerEvent::SerialNumberChanged,
        ) {
            self.cache.clear();
            self.reset();
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn set_date(&mut self, date: Option<NaiveDate>) {
        if update_field(&mut self.date, date, &self.notifier, DayPowerEvent::DateChanged) {
            self.clear();
        }
    }

    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn set_cached(&mut self, cached: bool) {
        if update_field(
            &mut self.cached,
            cached,
            &self.notifier,
            DayPowerEvent::CachedChanged,
        ) && !cached
        {
            self.cache.clear();
        }
    }

    /// Entries in ascending upload time.
    pub fn entries(&self) -> &[PowerEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PowerEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as received, in ascending upload time.
    pub fn raw_json(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|entry| Value::Object(entry.json.clone()))
                .collect(),
        )
    }

    pub fn from_date_time(&self) -> Option<NaiveDateTime> {
        self.from_date_time
    }

    pub fn to_date_time(&self) -> Option<NaiveDateTime> {
        self.to_date_time
    }

    pub fn peaks(&self) -> &Peaks {
        &self.peaks
    }

    pub fn peak_photovoltaic(&self) -> Watt {
        self.peaks.photovoltaic
    }

    pub fn peak_current_load(&self) -> Watt {
        self.peaks.current_load
    }

    pub fn peak_grid_feed(&self) -> Watt {
        self.peaks.grid_feed
    }

    pub fn peak_grid_charge(&self) -> Watt {
        self.peaks.grid_charge
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

    pub fn subscribe(&self) -> broadcast::Receiver<DayPowerEvent> {
        self.notifier.subscribe()
    }

    pub fn reload(&mut self) -> bool {
        let connector = match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => {
                log::error!("Cannot reload day power without a connector");
                return false;
            }
        };

        if self.serial_number.is_empty() {
            log::warn!("Cannot reload day power without a serial number");
            return false;
        }

        let date = match self.date {
            Some(date) => date,
            None => {
                log::warn!("Cannot reload day power without a date");
                return false;
            }
        };

        if self.slot.cancel() {
            log::debug!("Cancelling day power request in flight");
        }

        if let Some(cached) = self.cache.get(&date).cloned() {
            log::debug!("Using cached day power of {}", date);
            self.process(Ok(cached));
            return true;
        }

        let mut request = ApiRequest::new(connector, Endpoint::OneDayPowerBySn);
        request.set_sys_sn(&self.serial_number);
        request.set_query_date(date);
        if !self.slot.start(request) {
            return false;
        }

        self.progress.set_status(RequestStatus::Loading, &self.notifier);
        true
    }

    pub fn force_reload(&mut self) -> bool {
        self.cache.clear();
        self.reload()
    }

    /// Drops all entries of the current day, including its cache entry.
    pub fn reset(&mut self) {
        if let Some(date) = self.date {
            self.cache.remove(&date);
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.slot.cancel();
        self.apply(&[]);
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
                let array = match data {
                    Value::Array(array) => array,
                    _ => Vec::new(),
                };
                self.apply(&array);

                if let Some(date) = self.date {
                    if self.cached && !array.is_empty() {
                        self.cache.insert(date, Value::Array(array));
                    }
                }

                self.progress.succeed(&self.notifier);
            }
            Err(error) => self.progress.fail(error, &self.notifier),
        }
    }

    fn apply(&mut self, array: &[Value]) {
        let (entries, peaks) = reconcile(array);
        let old_count = self.entries.len();

        self.entries = entries;
        self.notifier.emit(DayPowerEvent::ModelReset);
        if self.entries.len() != old_count {
            self.notifier
                .emit(DayPowerEvent::CountChanged(self.entries.len()));
        }

        let from = self.entries.first().and_then(|entry| entry.upload_time);
        let to = self.entries.last().and_then(|entry| entry.upload_time);
        let notifier = &self.notifier;
        update_field(
            &mut self.from_date_time,
            from,
            notifier,
            DayPowerEvent::FromDateTimeChanged,
        );
        update_field(
            &mut self.to_date_time,
            to,
            notifier,
            DayPowerEvent::ToDateTimeChanged,
        );

        update_field(
            &mut self.peaks.photovoltaic,
            peaks.photovoltaic,
            notifier,
            DayPowerEvent::PeakPhotovoltaicChanged,
        );
        update_field(
            &mut self.peaks.current_load,
            peaks.current_load,
            notifier,
            DayPowerEvent::PeakCurrentLoadChanged,
        );
        update_field(
            &mut self.peaks.grid_feed,
            peaks.grid_feed,
            notifier,
            DayPowerEvent::PeakGridFeedChanged,
        );
        update_field(
            &mut self.peaks.grid_charge,
            peaks.grid_charge,
            notifier,
            DayPowerEvent::PeakGridChargeChanged,
        );
    }
}
