use crate::SystemStatus;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Map, Value};
use std::convert::TryFrom;

pub type Watt = i32;
pub type WattHour = i32;
pub type JsonObject = Map<String, Value>;

const UPLOAD_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// `value` clamped to the `i32` range.
fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Integer member of `object`, 0 if missing or not integral. Out of range values saturate.
pub(crate) fn json_int(object: &JsonObject, key: &str) -> i32 {
    match object.get(key) {
        Some(value) => saturate(
            value
                .as_i64()
                .or_else(|| value.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
                .unwrap_or(0),
        ),
        None => 0,
    }
}

/// Numeric member of `object`, 0.0 if missing.
pub(crate) fn json_f64(object: &JsonObject, key: &str) -> f64 {
    object.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

pub(crate) fn json_str(object: &JsonObject, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_default()
}

/// Whether any of `keys` is present and not null.
pub(crate) fn json_has_any(object: &JsonObject, keys: &[&str]) -> bool {
    keys.iter()
        .any(|key| object.get(*key).map(|v| !v.is_null()).unwrap_or(false))
}

/// kWh (or kW) reported as decimal, converted to Wh (or W).
pub(crate) fn kilo_to_unit(object: &JsonObject, key: &str) -> i32 {
    saturate((json_f64(object, key) * 1000.0).round() as i64)
}

/// Object payload, an empty object for anything else.
pub(crate) fn as_object(value: &Value) -> JsonObject {
    value.as_object().cloned().unwrap_or_default()
}

/// Current power flow of one storage system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LivePower {
    pub photovoltaic_power: Watt,
    pub current_load: Watt,
    /// Negative when feeding into the grid.
    pub grid_power: Watt,
    /// Negative when charging the battery.
    pub battery_power: Watt,
    pub battery_soc: f64,
}

impl LivePower {
    pub(crate) const VALIDITY_KEYS: [&'static str; 4] = ["pload", "soc", "pgrid", "pbat"];

    pub fn from_json(object: &JsonObject) -> Self {
        LivePower {
            photovoltaic_power: json_int(object, "ppv"),
            current_load: json_int(object, "pload"),
            grid_power: json_int(object, "pgrid"),
            battery_power: json_int(object, "pbat"),
            battery_soc: json_f64(object, "soc"),
        }
    }
}

/// Live readings split into non-negative directional values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiveSensors {
    pub photovoltaic_power: Watt,
    pub current_load: Watt,
    pub grid_feed: Watt,
    pub grid_consumption: Watt,
    pub battery_soc: f64,
    pub battery_charge: Watt,
    pub battery_discharge: Watt,
}

impl From<&LivePower> for LiveSensors {
    fn from(power: &LivePower) -> Self {
        LiveSensors {
            photovoltaic_power: power.photovoltaic_power,
            current_load: power.current_load.max(0),
            grid_feed: (-power.grid_power).max(0),
            grid_consumption: power.grid_power.max(0),
            battery_soc: power.battery_soc,
            battery_charge: (-power.battery_power).max(0),
            battery_discharge: power.battery_power.max(0),
        }
    }
}

/// Energy totals of one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    pub photovoltaic: WattHour,
    pub input: WattHour,
    pub output: WattHour,
    pub charge: WattHour,
    pub discharge: WattHour,
    pub grid_charge: WattHour,
}

impl DailyTotals {
    pub(crate) const VALIDITY_KEYS: [&'static str; 6] =
        ["epv", "eInput", "eOutput", "eCharge", "eDischarge", "eGridCharge"];

    pub fn from_json(object: &JsonObject) -> Self {
        DailyTotals {
            photovoltaic: kilo_to_unit(object, "epv"),
            input: kilo_to_unit(object, "eInput"),
            output: kilo_to_unit(object, "eOutput"),
            charge: kilo_to_unit(object, "eCharge"),
            discharge: kilo_to_unit(object, "eDischarge"),
            grid_charge: kilo_to_unit(object, "eGridCharge"),
        }
    }

    /// Energy consumed by the house: everything produced or drawn minus what left or was stored.
    pub fn total_load(&self) -> WattHour {
        self.photovoltaic + self.discharge + self.input - self.output - self.charge
    }
}

/// One sample of a day's power curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerEntry {
    pub json: JsonObject,
    pub upload_time: Option<NaiveDateTime>,
    pub photovoltaic_power: Watt,
    pub current_load: Watt,
    pub grid_feed: Watt,
    pub grid_charge: Watt,
    pub battery_soc: f64,
}

pub(crate) fn parse_upload_time(value: &str) -> Option<NaiveDateTime> {
    UPLOAD_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

impl PowerEntry {
    pub fn from_json(value: &Value) -> Self {
        let json = as_object(value);
        PowerEntry {
            upload_time: parse_upload_time(&json_str(&json, "uploadTime")),
            photovoltaic_power: json_int(&json, "ppv"),
            current_load: json_int(&json, "load"),
            grid_feed: json_int(&json, "feedIn"),
            grid_charge: json_int(&json, "gridCharge"),
            battery_soc: json_f64(&json, "cbat"),
            json,
        }
    }
}

/// A storage system (inverter and battery) bound to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSystem {
    pub json: JsonObject,
    pub serial_number: String,
    pub status: SystemStatus,
    pub inverter_model: String,
    pub inverter_power: Watt,
    pub battery_model: String,
    pub battery_gross_capacity: WattHour,
    pub battery_remaining_capacity: WattHour,
    /// Percent of the gross capacity that is usable.
    pub battery_usable_capacity: f64,
    pub photovoltaic_power: Watt,
}

impl StorageSystem {
    pub fn from_json(value: &Value) -> Self {
        let json = as_object(value);
        StorageSystem {
            serial_number: json_str(&json, "sysSn"),
            status: SystemStatus::from_ems_status(&json_str(&json, "emsStatus")),
            inverter_model: json_str(&json, "minv"),
            inverter_power: kilo_to_unit(&json, "poinv"),
            battery_model: json_str(&json, "mbat"),
            battery_gross_capacity: kilo_to_unit(&json, "cobat"),
            battery_remaining_capacity: kilo_to_unit(&json, "surplusCobat"),
            battery_usable_capacity: json_f64(&json, "usCapacity"),
            photovoltaic_power: kilo_to_unit(&json, "popv"),
            json,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn out_of_range_values_saturate() {
        let object = as_object(&json!({
            "big": 5_000_000_000_i64,
            "small": -5_000_000_000_i64,
            "kilo": 3_000_000.0,
            "negative_kilo": -3_000_000.0
        }));
        assert_eq!(i32::MAX, json_int(&object, "big"));
        assert_eq!(i32::MIN, json_int(&object, "small"));
        assert_eq!(i32::MAX, kilo_to_unit(&object, "kilo"));
        assert_eq!(i32::MIN, kilo_to_unit(&object, "negative_kilo"));
    }

    #[test]
    fn lenient_readers() {
        let object = as_object(&json!({
            "int": 5,
            "integral": 6.0,
            "fraction": 6.5,
            "text": "abc",
            "null": null
        }));
        assert_eq!(5, json_int(&object, "int"));
        assert_eq!(6, json_int(&object, "integral"));
        assert_eq!(0, json_int(&object, "fraction"));
        assert_eq!(0, json_int(&object, "missing"));
        assert_eq!(6.5, json_f64(&object, "fraction"));
        assert_eq!("abc", json_str(&object, "text"));
        assert_eq!("", json_str(&object, "int"));
        assert!(json_has_any(&object, &["missing", "text"]));
        assert!(!json_has_any(&object, &["missing", "null"]));
    }

    #[test]
    fn non_object_is_empty() {
        assert!(as_object(&json!([1, 2])).is_empty());
        assert!(as_object(&Value::Null).is_empty());
    }

    #[test]
    fn daily_totals() {
        let totals = DailyTotals::from_json(&as_object(&json!({
            "epv": 20.1,
            "eInput": 0.03,
            "eOutput": 14.63,
            "eCharge": 5.2,
            "eDischarge": 4.8,
            "eGridCharge": 0.01
        })));
        assert_eq!(20100, totals.photovoltaic);
        assert_eq!(30, totals.input);
        assert_eq!(14630, totals.output);
        assert_eq!(5200, totals.charge);
        assert_eq!(4800, totals.discharge);
        assert_eq!(10, totals.grid_charge);
        assert_eq!(20100 + 4800 + 30 - 14630 - 5200, totals.total_load());
    }

    #[test]
    fn live_sensors() {
        let sensors = LiveSensors::from(&LivePower {
            photovoltaic_power: 4397,
            current_load: -3,
            grid_power: -4358,
            battery_power: 111,
            battery_soc: 98.0,
        });
        assert_eq!(0, sensors.current_load);
        assert_eq!(4358, sensors.grid_feed);
        assert_eq!(0, sensors.grid_consumption);
        assert_eq!(0, sensors.battery_charge);
        assert_eq!(111, sensors.battery_discharge);
    }

    #[test]
    fn upload_time_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(14, 59, 32)
            .unwrap();
        assert_eq!(Some(expected), parse_upload_time("2023-01-01 14:59:32"));
        assert_eq!(Some(expected), parse_upload_time("2023-01-01T14:59:32"));
        assert_eq!(None, parse_upload_time(""));
    }

    #[test]
    fn storage_system() {
        let system = StorageSystem::from_json(&json!({
            "sysSn": "SERIAL",
            "popv": 10,
            "minv": "INVERTER",
            "poinv": 10,
            "cobat": 8.19,
            "mbat": "BATTERY",
            "surplusCobat": 7.8,
            "usCapacity": 95,
            "emsStatus": "Normal"
        }));
        assert_eq!("SERIAL", system.serial_number);
        assert_eq!(SystemStatus::Normal, system.status);
        assert_eq!("INVERTER", system.inverter_model);
        assert_eq!(10000, system.inverter_power);
        assert_eq!("BATTERY", system.battery_model);
        assert_eq!(8190, system.battery_gross_capacity);
        assert_eq!(7800, system.battery_remaining_capacity);
        assert_eq!(95.0, system.battery_usable_capacity);
        assert_eq!(10000, system.photovoltaic_power);
    }
}
