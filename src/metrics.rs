use crate::Controllers;
use alphacloud_rs::api::Error;
use alphacloud_rs::cache::today;
use alphacloud_rs::model::{DailyTotals, LiveSensors, StorageSystem, WattHour};
use alphacloud_rs::SystemStatus;
use prometheus::{Encoder, GaugeVec, TextEncoder};

lazy_static! {
    static ref LIVE_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "live_power",
            "current power flow reported by storage system (in W)",
        ),
        &["sys_sn", "sensor"],
    )
    .unwrap();
    static ref BATTERY_SOC_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("battery_soc", "battery state of charge (in %)",),
        &["sys_sn"],
    )
    .unwrap();
    static ref DAY_ENERGY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "day_energy",
            "energy totals of current day (in Wh)",
        ),
        &["sys_sn", "kind"],
    )
    .unwrap();
    static ref SYSTEM_CAPACITY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "system_battery_capacity",
            "battery capacity of storage system (in Wh)",
        ),
        &["sys_sn", "kind"],
    )
    .unwrap();
    static ref SYSTEM_USABLE_CAPACITY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "system_battery_usable_capacity",
            "usable share of battery capacity (in %)",
        ),
        &["sys_sn"],
    )
    .unwrap();
    static ref SYSTEM_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "system_rated_power",
            "rated power of storage system components (in W)",
        ),
        &["sys_sn", "kind"],
    )
    .unwrap();
    static ref SYSTEM_FAULT_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "system_fault",
            "1 if storage system reports a fault, 0 otherwise",
        ),
        &["sys_sn"],
    )
    .unwrap();
}

fn process_live_sensors(sys_sn: &str, sensors: &LiveSensors) {
    let readings = [
        ("photovoltaic", sensors.photovoltaic_power),
        ("load", sensors.current_load),
        ("grid_feed", sensors.grid_feed),
        ("grid_consumption", sensors.grid_consumption),
        ("battery_charge", sensors.battery_charge),
        ("battery_discharge", sensors.battery_discharge),
    ];

    for &(sensor, watts) in readings.iter() {
        LIVE_POWER_GAUGE
            .with_label_values(&[sys_sn, sensor])
            .set(f64::from(watts));
    }

    BATTERY_SOC_GAUGE
        .with_label_values(&[sys_sn])
        .set(sensors.battery_soc);
}

fn process_daily_totals(sys_sn: &str, totals: &DailyTotals, total_load: WattHour) {
    let energies = [
        ("photovoltaic", totals.photovoltaic),
        ("input", totals.input),
        ("output", totals.output),
        ("charge", totals.charge),
        ("discharge", totals.discharge),
        ("grid_charge", totals.grid_charge),
        ("total_load", total_load),
    ];

    for &(kind, watt_hours) in energies.iter() {
        DAY_ENERGY_GAUGE
            .with_label_values(&[sys_sn, kind])
            .set(f64::from(watt_hours));
    }
}

fn process_storage_system(system: &StorageSystem) {
    let sys_sn = system.serial_number.as_str();

    SYSTEM_CAPACITY_GAUGE
        .with_label_values(&[sys_sn, "gross"])
        .set(f64::from(system.battery_gross_capacity));
    SYSTEM_CAPACITY_GAUGE
        .with_label_values(&[sys_sn, "remaining"])
        .set(f64::from(system.battery_remaining_capacity));
    SYSTEM_USABLE_CAPACITY_GAUGE
        .with_label_values(&[sys_sn])
        .set(system.battery_usable_capacity);
    SYSTEM_POWER_GAUGE
        .with_label_values(&[sys_sn, "inverter"])
        .set(f64::from(system.inverter_power));
    SYSTEM_POWER_GAUGE
        .with_label_values(&[sys_sn, "photovoltaic"])
        .set(f64::from(system.photovoltaic_power));

    let fault = match system.status {
        SystemStatus::Fault => 1.0,
        _ => 0.0,
    };
    SYSTEM_FAULT_GAUGE.with_label_values(&[sys_sn]).set(fault);
}

/// Collect all supported metrics, updating Prometheus exporter registry.
///
/// Storage systems are refreshed first; live data and today's energy are collected for the
/// selected system only.
pub async fn collect(controllers: &mut Controllers) -> Result<(), Error> {
    controllers.refresh_inventory().await?;
    for system in controllers.inventory.entries() {
        process_storage_system(system);
    }

    let sys_sn = controllers.system().await?;

    controllers.refresh_live(&sys_sn).await?;
    process_live_sensors(&sys_sn, &controllers.live.sensors());

    controllers.refresh_energy(&sys_sn, today()).await?;
    process_daily_totals(
        &sys_sn,
        controllers.energy.totals(),
        controllers.energy.total_load(),
    );

    Ok(())
}

/// Read metrics from Prometheus exporter registry.
pub async fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| Error::FormatError)?;
    String::from_utf8(buffer).or(Err(Error::FormatError))
}
