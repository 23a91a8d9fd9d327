pub mod endpoint;
pub mod error;
pub mod response;
pub mod signer;
pub mod transport;

use crate::connector::Connector;
use chrono::NaiveDate;
pub use endpoint::Endpoint;
pub use error::{Error, ErrorCode, RequestError};
use error::{error_text, ErrorDetails, TransportErrorKind};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use transport::{RequestDescriptor, TransportFailure};
use url::Url;

/// Terminal result of an `ApiRequest`: the `data` member of the envelope, or the failure.
pub type RequestOutcome = Result<Value, RequestError>;

/* header names are case-insensitive, `HeaderName` requires lowercase */
const HEADER_APP_ID: &str = "appid";
const HEADER_TIMESTAMP: &str = "timestamp";
const HEADER_SIGN: &str = "sign";

const QUERY_SYS_SN: &str = "sysSn";
const QUERY_DATE: &str = "queryDate";
const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Sent,
    Done,
}

/// A single signed request to one endpoint.
///
/// The request runs as a spawned task once sent and reports exactly one outcome, unless it is
/// aborted first. Dropping an `ApiRequest` aborts it.
pub struct ApiRequest {
    connector: Arc<Connector>,
    endpoint: Endpoint,
    sys_sn: Option<String>,
    query_date: Option<NaiveDate>,
    state: RequestState,
    task: Option<JoinHandle<()>>,
    receiver: Option<oneshot::Receiver<RequestOutcome>>,
}

impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("endpoint", &self.endpoint)
            .field("sys_sn", &self.sys_sn)
            .field("query_date", &self.query_date)
            .field("state", &self.state())
            .finish()
    }
}

/// Collapse duplicate separators and `.`/`..` segments of an URL path.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, String> {
    HeaderValue::from_str(value).map_err(|e| format!("Invalid {} header: {}", name, e))
}

impl ApiRequest {
    pub fn new(connector: Arc<Connector>, endpoint: Endpoint) -> Self {
        ApiRequest {
            connector,
            endpoint,
            sys_sn: None,
            query_date: None,
            state: RequestState::Idle,
            task: None,
            receiver: None,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn sys_sn(&self) -> Option<&str> {
        self.sys_sn.as_deref()
    }

    pub fn set_sys_sn(&mut self, sys_sn: &str) {
        self.sys_sn = Some(String::from(sys_sn));
    }

    pub fn query_date(&self) -> Option<NaiveDate> {
        self.query_date
    }

    pub fn set_query_date(&mut self, query_date: NaiveDate) {
        self.query_date = Some(query_date);
    }

    pub fn state(&self) -> RequestState {
        match (&self.state, &self.task) {
            (RequestState::Sent, Some(task)) if task.is_finished() => RequestState::Done,
            (state, _) => *state,
        }
    }

    /// Signed request for `timestamp` (seconds since epoch).
    pub fn descriptor(&self, timestamp: i64) -> Result<RequestDescriptor, String> {
        let configuration = self
            .connector
            .configuration()
            .ok_or_else(|| String::from("Cannot send request without configuration"))?;

        let mut url = Url::parse(configuration.api_url())
            .map_err(|e| format!("Invalid API URL {}: {}", configuration.api_url(), e))?;
        let path = clean_path(&format!("{}/{}", url.path(), self.endpoint.name()));
        url.set_path(&path);
        url.set_query(None);
        if self.sys_sn.is_some() || self.query_date.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(sys_sn) = &self.sys_sn {
                query.append_pair(QUERY_SYS_SN, sys_sn);
            }
            if let Some(query_date) = &self.query_date {
                query.append_pair(QUERY_DATE, &query_date.format(QUERY_DATE_FORMAT).to_string());
            }
        }

        let sign = signer::sign(configuration.app_id(), configuration.app_secret(), timestamp);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        headers.insert(
            HeaderName::from_static(HEADER_APP_ID),
            header_value(HEADER_APP_ID, configuration.app_id())?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_TIMESTAMP),
            header_value(HEADER_TIMESTAMP, &timestamp.to_string())?,
        );
        headers.insert(
            HeaderName::from_static(HEADER_SIGN),
            header_value(HEADER_SIGN, &sign)?,
        );

        let timeout = match configuration.request_timeout() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(RequestDescriptor {
            url,
            headers,
            timeout,
        })
    }

    /// Sends the request, the outcome is retrieved with `finished()`.
    pub fn send(&mut self) -> bool {
        let (sender, receiver) = oneshot::channel();
        if !self.send_with(move |outcome| {
            let _ = sender.send(outcome);
        }) {
            return false;
        }
        self.receiver = Some(receiver);
        true
    }

    /// Sends the request, calling `on_finished` with its outcome from the request task.
    ///
    /// Returns false, logging the reason, if the connector cannot carry the request. Must be
    /// called within a tokio runtime.
    pub fn send_with<F>(&mut self, on_finished: F) -> bool
    where
        F: FnOnce(RequestOutcome) + Send + 'static,
    {
        if self.state != RequestState::Idle {
            log::error!("Request to {} was already sent", self.endpoint);
            return false;
        }

        let configuration = match self.connector.configuration() {
            Some(configuration) => configuration,
            None => {
                log::error!("Cannot send request without configuration");
                return false;
            }
        };
        if !configuration.valid() {
            log::error!("Cannot send request with invalid configuration");
            return false;
        }

        let transport = match self.connector.transport() {
            Some(transport) => Arc::clone(transport),
            None => {
                log::error!("Cannot send request without transport");
                return false;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Cannot send request outside of a tokio runtime: {}", e);
                return false;
            }
        };

        let descriptor = match self.descriptor(chrono::Utc::now().timestamp()) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::error!("{}", e);
                return false;
            }
        };

        log::debug!("Sending request {}", descriptor.url);

        let endpoint = self.endpoint;
        let deadline = descriptor.timeout;
        self.task = Some(runtime.spawn(async move {
            let transferred = match deadline {
                Some(deadline) => tokio::time::timeout(deadline, transport.send(descriptor))
                    .await
                    .unwrap_or_else(|_| {
                        Err(TransportFailure::new(
                            TransportErrorKind::Timeout,
                            error_text(
                                ErrorCode::Transport(TransportErrorKind::Timeout),
                                ErrorDetails::None,
                            ),
                        ))
                    }),
                None => transport.send(descriptor).await,
            };

            let outcome = match transferred {
                Err(failure) => {
                    if failure.kind == TransportErrorKind::OperationCanceled {
                        log::debug!("Request to {} was canceled", endpoint);
                    } else {
                        log::warn!("Request to {} failed: {}", endpoint, failure);
                    }
                    Err(RequestError::from(failure))
                }
                Ok(body) => response::classify(&body),
            };

            if let Err(e) = &outcome {
                log::debug!("Request to {} finished with error: {}", endpoint, e);
            }

            on_finished(outcome);
        }));
        self.state = RequestState::Sent;

        true
    }

    /// Waits for the outcome of a request sent with `send()`.
    ///
    /// Returns `None` if the request was never sent this way or was aborted.
    pub async fn finished(&mut self) -> Option<RequestOutcome> {
        let receiver = self.receiver.take()?;
        let outcome = receiver.await.ok();
        self.state = RequestState::Done;
        self.task = None;
        outcome
    }

    /// Cancels the request. No outcome is reported afterwards.
    pub fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            log::debug!("Aborting request to {}", self.endpoint);
            task.abort();
        }
        self.receiver = None;
        if self.state == RequestState::Sent {
            self.state = RequestState::Done;
        }
    }
}

impl Drop for ApiRequest {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
