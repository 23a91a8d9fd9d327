pub mod api;
pub mod cache;
pub mod configuration;
pub mod connector;
pub mod controller;
pub mod model;
mod notify;

pub use api::error::{ApiErrorCode, ErrorCode, TransportErrorKind};
pub use api::Error;
pub use configuration::Configuration;
pub use connector::Connector;
pub use controller::daily_energy::DailyEnergy;
pub use controller::day_power::DayPowerSeries;
pub use controller::device_inventory::DeviceInventory;
pub use controller::live_data::LiveData;

/// Request state of an entity controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    /// No request has been issued, or the controller was reset.
    NoRequest,
    Loading,
    Finished,
    Error,
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::NoRequest
    }
}

/// Operating state of a storage system as reported in `emsStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum SystemStatus {
    Unknown,
    Normal,
    Fault,
}

impl SystemStatus {
    pub fn from_ems_status(status: &str) -> Self {
        match status {
            "Normal" => SystemStatus::Normal,
            "Fault" => SystemStatus::Fault,
            _ => SystemStatus::Unknown,
        }
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        SystemStatus::Unknown
    }
}
