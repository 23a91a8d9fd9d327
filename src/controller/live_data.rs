use super::{same_connector, Progress, RequestEvent, RequestSlot};
use crate::api::{ApiRequest, Endpoint, ErrorCode, RequestOutcome};
use crate::connector::Connector;
use crate::model::{as_object, json_has_any, JsonObject, LivePower, LiveSensors, Watt};
use crate::notify::{update_field, Notifier};
use crate::RequestStatus;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveDataEvent {
    Request(RequestEvent),
    ConnectorChanged,
    SerialNumberChanged(String),
    PhotovoltaicPowerChanged(Watt),
    CurrentLoadChanged(Watt),
    GridPowerChanged(Watt),
    BatteryPowerChanged(Watt),
    BatterySocChanged(f64),
    RawJsonChanged,
    ValidChanged(bool),
}

impl From<RequestEvent> for LiveDataEvent {
    fn from(event: RequestEvent) -> Self {
        LiveDataEvent::Request(event)
    }
}

/// Current power flow of one storage system (`getLastPowerData`).
#[derive(Debug)]
pub struct LiveData {
    connector: Option<Arc<Connector>>,
    serial_number: String,
    power: LivePower,
    json: JsonObject,
    valid: bool,
    progress: Progress,
    slot: RequestSlot,
    notifier: Notifier<LiveDataEvent>,
}

impl LiveData {
    pub fn new(connector: Option<Arc<Connector>>, serial_number: &str) -> Self {
        LiveData {
            connector,
            serial_number: String::from(serial_number),
            power: LivePower::default(),
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
        self.notifier.emit(LiveDataEvent::ConnectorChanged);
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
            LiveDataEvent::SerialNumberChanged,
        ) {
            self.reset();
        }
    }

    pub fn power(&self) -> &LivePower {
        &self.power
    }

    pub fn sensors(&self) -> LiveSensors {
        LiveSensors::from(&self.power)
    }

    pub fn photovoltaic_power(&self) -> Watt {
        self.power.photovoltaic_power
    }

    pub fn current_load(&self) -> Watt {
        self.power.current_load
    }

    pub fn grid_power(&self) -> Watt {
        self.power.grid_power
    }

    pub fn battery_power(&self) -> Watt {
        self.power.battery_power
    }

    pub fn battery_soc(&self) -> f64 {
        self.power.battery_soc
    }

    /// The `data` object of the last response.
    pub fn raw_json(&self) -> &JsonObject {
        &self.json
    }

    /// Whether data has been loaded, kept when a later reload fails.
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

    pub fn subscribe(&self) -> broadcast::Receiver<LiveDataEvent> {
        self.notifier.subscribe()
    }

    /// Requests fresh data, superseding a request in flight.
    pub fn reload(&mut self) -> bool {
        let connector = match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => {
                log::error!("Cannot reload live data without a connector");
                return false;
            }
        };

        if self.serial_number.is_empty() {
            log::warn!("Cannot reload live data without a serial number");
            return false;
        }

        if self.slot.cancel() {
            log::debug!("Cancelling live data request in flight");
        }

        let mut request = ApiRequest::new(connector, Endpoint::LastPowerData);
        request.set_sys_sn(&self.serial_number);
        if !self.slot.start(request) {
            return false;
        }

        self.progress.set_status(RequestStatus::Loading, &self.notifier);
        true
    }

    /// Drops all data and any request in flight.
    pub fn reset(&mut self) {
        self.slot.cancel();
        self.apply(&JsonObject::new());
        self.progress.clear(&self.notifier);
    }

    /// Waits for the request in flight and applies its result.
    pub async fn finished(&mut self) -> RequestStatus {
        if let Some(outcome) = self.slot.next().await {
            self.process(outcome);
        }
        self.status()
    }

    /// Applies a result that already arrived, without waiting.
    pub fn process_pending(&mut self) {
        while let Some(outcome) = self.slot.try_next() {
            self.process(outcome);
        }
    }

    fn process(&mut self, outcome: RequestOutcome) {
        match outcome {
            Ok(data) => {
                self.apply(&as_object(&data));
                self.progress.succeed(&self.notifier);
            }
            Err(error) => self.progress.fail(error, &self.notifier),
        }
    }

    fn apply(&mut self, json: &JsonObject) {
        let power = LivePower::from_json(json);
        let notifier = &self.notifier;

        update_field(
            &mut self.power.photovoltaic_power,
            power.photovoltaic_power,
            notifier,
            LiveDataEvent::PhotovoltaicPowerChanged,
        );
        update_field(
            &mut self.power.current_load,
            power.current_load,
            notifier,
            LiveDataEvent::CurrentLoadChanged,
        );
        update_field(
            &mut self.power.grid_power,
            power.grid_power,
            notifier,
            LiveDataEvent::GridPowerChanged,
        );
        update_field(
            &mut self.power.battery_power,
            power.battery_power,
            notifier,
            LiveDataEvent::BatteryPowerChanged,
        );
        update_field(
            &mut self.power.battery_soc,
            power.battery_soc,
            notifier,
            LiveDataEvent::BatterySocChanged,
        );

        if self.json != *json {
            self.json = json.clone();
            notifier.emit(LiveDataEvent::RawJsonChanged);
        }

        update_field(
            &mut self.valid,
            json_has_any(json, &LivePower::VALIDITY_KEYS),
            notifier,
            LiveDataEvent::ValidChanged,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notify::drain;

    #[test]
    fn reload_without_connector() {
        let mut data = LiveData::new(None, "SERIAL");
        assert!(!data.reload());
        assert_eq!(RequestStatus::NoRequest, data.status());
    }

    #[test]
    fn reload_without_serial_number() {
        let connector = Arc::new(Connector::default());
        let mut data = LiveData::new(Some(connector), "");
        assert!(!data.reload());
        assert_eq!(RequestStatus::NoRequest, data.status());
    }

    #[test]
    fn reload_with_invalid_connector() {
        let connector = Arc::new(Connector::default());
        let mut data = LiveData::new(Some(connector), "SERIAL");
        assert!(!data.reload());
        assert_eq!(RequestStatus::NoRequest, data.status());
    }

    #[test]
    fn apply_notifies_changed_fields_only() {
        let mut data = LiveData::new(None, "SERIAL");
        let mut receiver = data.subscribe();

        let json = as_object(&serde_json::json!({"ppv": 0, "pload": 610, "soc": 98}));
        data.apply(&json);

        assert_eq!(
            vec![
                LiveDataEvent::CurrentLoadChanged(610),
                LiveDataEvent::BatterySocChanged(98.0),
                LiveDataEvent::RawJsonChanged,
                LiveDataEvent::ValidChanged(true),
            ],
            drain(&mut receiver)
        );

        data.apply(&json);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn photovoltaic_alone_is_not_valid() {
        let mut data = LiveData::new(None, "SERIAL");
        data.apply(&as_object(&serde_json::json!({"ppv": 100})));
        assert_eq!(100, data.photovoltaic_power());
        assert!(!data.valid());
    }

    #[test]
    fn set_serial_number_resets() {
        let mut data = LiveData::new(None, "SERIAL");
        data.apply(&as_object(&serde_json::json!({"pload": 610})));
        assert!(data.valid());

        data.set_serial_number("SERIAL");
        assert!(data.valid());

        data.set_serial_number("OTHER");
        assert!(!data.valid());
        assert_eq!(0, data.current_load());
        assert!(data.raw_json().is_empty());
    }
}
