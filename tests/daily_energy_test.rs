// Integration tests for `DailyEnergy` and its per-date cache.

mod common;

use alphacloud_rs::cache::today;
use alphacloud_rs::{DailyEnergy, RequestStatus};
use chrono::NaiveDate;
use common::{endpoint, resource_response, setup};
use wiremock::matchers::query_param;

fn new_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

#[tokio::test]
async fn test_daily_energy() {
    let (server, connector) = setup().await;

    endpoint("getOneDateEnergyBySn")
        .and(query_param("sysSn", "SERIAL"))
        .and(query_param("queryDate", "2023-01-01"))
        .respond_with(resource_response("onedateenergy.json"))
        .mount(&server)
        .await;

    let mut energy = DailyEnergy::new(Some(connector), "SERIAL", Some(new_year()));
    assert!(energy.reload());
    assert_eq!(RequestStatus::Finished, energy.finished().await);

    assert!(energy.valid());
    assert_eq!(20100, energy.photovoltaic());
    assert_eq!(30, energy.input());
    assert_eq!(14630, energy.output());
    assert_eq!(5200, energy.charge());
    assert_eq!(4800, energy.discharge());
    assert_eq!(10, energy.grid_charge());
    assert_eq!(5100, energy.total_load());
}

#[tokio::test]
async fn test_past_day_is_requested_once() {
    let (server, connector) = setup().await;

    endpoint("getOneDateEnergyBySn")
        .and(query_param("queryDate", "2023-01-01"))
        .respond_with(resource_response("onedateenergy.json"))
        .expect(1)
        .mount(&server)
        .await;

    let mut energy = DailyEnergy::new(Some(connector), "SERIAL", Some(new_year()));
    energy.reload();
    energy.finished().await;

    energy.set_date(NaiveDate::from_ymd_opt(2023, 1, 2));
    assert!(!energy.valid());
    energy.set_date(Some(new_year()));

    assert!(energy.reload());
    assert_eq!(RequestStatus::Finished, energy.status());
    assert_eq!(20100, energy.photovoltaic());
}

#[tokio::test]
async fn test_force_reload_bypasses_cache() {
    let (server, connector) = setup().await;

    endpoint("getOneDateEnergyBySn")
        .respond_with(resource_response("onedateenergy.json"))
        .expect(2)
        .mount(&server)
        .await;

    let mut energy = DailyEnergy::new(Some(connector), "SERIAL", Some(new_year()));
    energy.reload();
    energy.finished().await;

    assert!(energy.force_reload());
    assert_eq!(RequestStatus::Loading, energy.status());
    assert_eq!(RequestStatus::Finished, energy.finished().await);
}

#[tokio::test]
async fn test_today_is_always_requested() {
    let (server, connector) = setup().await;

    endpoint("getOneDateEnergyBySn")
        .respond_with(resource_response("onedateenergy.json"))
        .expect(2)
        .mount(&server)
        .await;

    let mut energy = DailyEnergy::new(Some(connector), "SERIAL", None);
    assert_eq!(Some(today()), energy.date());

    for _ in 0..2 {
        assert!(energy.reload());
        assert_eq!(RequestStatus::Finished, energy.finished().await);
    }
}

#[tokio::test]
async fn test_uncached_requests_every_time() {
    let (server, connector) = setup().await;

    endpoint("getOneDateEnergyBySn")
        .respond_with(resource_response("onedateenergy.json"))
        .expect(2)
        .mount(&server)
        .await;

    let mut energy = DailyEnergy::new(Some(connector), "SERIAL", Some(new_year()));
    energy.set_cached(false);

    for _ in 0..2 {
        energy.reload();
        assert_eq!(RequestStatus::Finished, energy.finished().await);
    }
}
