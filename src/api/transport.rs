use super::error::{ErrorCode, RequestError, TransportErrorKind};
use async_trait::async_trait;
use http::HeaderMap;
use std::time::Duration;
use url::Url;

/// Everything a `Transport` needs to perform one GET request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: Url,
    pub headers: HeaderMap,
    /// Deadline of the whole request, enforced by `ApiRequest` around `Transport::send`.
    pub timeout: Option<Duration>,
}

/// Failure reported by a `Transport`, forwarded unchanged to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportFailure {
            kind,
            message: message.into(),
        }
    }
}

impl From<TransportFailure> for RequestError {
    fn from(failure: TransportFailure) -> Self {
        RequestError::new(ErrorCode::Transport(failure.kind), failure.message)
    }
}

/// Asynchronous HTTP capability used by `ApiRequest`.
///
/// Dropping the returned future cancels the operation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> Result<Vec<u8>, TransportFailure>;
}

/// `Transport` backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, super::Error> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .map_err(|e| super::Error::InternalError(e.to_string()))?;
        Ok(ReqwestTransport { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

/// Map reqwest failure to the closest `TransportErrorKind`
fn map_transport_err(error: reqwest::Error) -> TransportFailure {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if let Some(status) = error.status() {
        TransportErrorKind::from_status(status)
    } else if error.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else if error.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::RemoteHostClosed
    } else {
        TransportErrorKind::UnknownNetwork
    };

    TransportFailure::new(kind, error.to_string())
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RequestDescriptor) -> Result<Vec<u8>, TransportFailure> {
        self.client
            .get(request.url)
            .headers(request.headers)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(map_transport_err)?
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(map_transport_err)
    }
}
