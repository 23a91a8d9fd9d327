#![allow(dead_code)]

use alphacloud_rs::{Configuration, Connector};
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const APP_ID: &str = "alpha123456";
pub const APP_SECRET: &str = "abc123456789";

pub fn read_resource(filename: &str) -> String {
    let path = format!("{}/resources/test/{}", env!("CARGO_MANIFEST_DIR"), filename);
    std::fs::read_to_string(path).unwrap()
}

/// The `data` member of a fixture envelope.
pub fn resource_data(filename: &str) -> Value {
    let envelope: Value = serde_json::from_str(&read_resource(filename)).unwrap();
    envelope["data"].clone()
}

pub fn configuration(server: &MockServer) -> Configuration {
    Configuration::new(&format!("{}/api", server.uri()), APP_ID, APP_SECRET)
}

pub async fn setup() -> (MockServer, Arc<Connector>) {
    let server = MockServer::start().await;
    let connector = Connector::with_reqwest(configuration(&server)).unwrap();
    (server, Arc::new(connector))
}

/// Same as `setup()` with a request timeout of `timeout_ms`.
pub async fn setup_with_timeout(timeout_ms: i64) -> (MockServer, Arc<Connector>) {
    let server = MockServer::start().await;
    let mut configuration = configuration(&server);
    configuration.set_request_timeout(timeout_ms);
    let connector = Connector::with_reqwest(configuration).unwrap();
    (server, Arc::new(connector))
}

/// Signed GET of `endpoint`.
pub fn endpoint(endpoint: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path(format!("/api/{}", endpoint)))
        .and(header_exists("appid"))
        .and(header_exists("timestamp"))
        .and(header_exists("sign"))
}

pub fn resource_response(filename: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(read_resource(filename), "application/json")
}
