use num_derive::FromPrimitive;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::Value;
use std::io::Cursor;

/// Error codes returned by the API in the `code` field of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, strum::IntoStaticStr)]
pub enum ApiErrorCode {
    ParameterError = 6001,
    SnNotBoundToUser = 6002,
    CheckCodeError = 6004,
    AppIdNotBoundToSn = 6005,
    TimestampError = 6006,
    SignVerificationError = 6007,
    SetFailed = 6008,
    WhitelistVerificationFailed = 6009,
    SignEmpty = 6010,
    TimestampEmpty = 6011,
    AppIdEmpty = 6012,
    DataDoesNotExist = 6016,
    InvalidDate = 6026,
    OperationFailed = 6029,
    SystemSnDoesNotExist = 6038,
    SystemOffline = 6042,
    VerificationCode = 6046,
    TooManyRequests = 6053,
}

impl ApiErrorCode {
    fn template(self) -> &'static str {
        match self {
            ApiErrorCode::ParameterError => "Invalid parameter provided.",
            ApiErrorCode::SnNotBoundToUser => {
                "The provided serial number is not associated with this user."
            }
            ApiErrorCode::CheckCodeError => "Check code error.",
            ApiErrorCode::AppIdNotBoundToSn => {
                "The provided application ID is not associated with this serial number."
            }
            ApiErrorCode::TimestampError => {
                "The provided time stamp is either invalid, or too far in the past."
            }
            ApiErrorCode::SignVerificationError => "API secret verification error.",
            ApiErrorCode::SetFailed => "Failed to set requested configuration.",
            ApiErrorCode::WhitelistVerificationFailed => "Whitelist verification failed.",
            ApiErrorCode::SignEmpty => "API secret was not provided.",
            ApiErrorCode::TimestampEmpty => "Request time stamp was not provided.",
            ApiErrorCode::AppIdEmpty => "Application ID was not provided.",
            ApiErrorCode::DataDoesNotExist => "Data does not exist or has been deleted.",
            ApiErrorCode::InvalidDate => "Invalid date provided.",
            ApiErrorCode::OperationFailed => "Operation failed.",
            ApiErrorCode::SystemSnDoesNotExist => "System serial number does not exist.",
            ApiErrorCode::SystemOffline => "System is offline.",
            ApiErrorCode::VerificationCode => "Verification code error.",
            ApiErrorCode::TooManyRequests => "Too many requests, try again later.",
        }
    }
}

/// Failure classes reported by a `Transport`.
///
/// Values follow the common network reply error numbering so codes stay stable when logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, strum::IntoStaticStr)]
pub enum TransportErrorKind {
    ConnectionRefused = 1,
    RemoteHostClosed = 2,
    HostNotFound = 3,
    Timeout = 4,
    OperationCanceled = 5,
    SslHandshakeFailed = 6,
    TemporaryNetworkFailure = 7,
    NetworkSessionFailed = 8,
    TooManyRedirects = 10,
    InsecureRedirect = 11,
    UnknownNetwork = 99,
    ProxyConnectionRefused = 101,
    ProxyConnectionClosed = 102,
    ProxyNotFound = 103,
    ProxyTimeout = 104,
    ProxyAuthenticationRequired = 105,
    UnknownProxy = 199,
    ContentAccessDenied = 201,
    ContentOperationNotPermitted = 202,
    ContentNotFound = 203,
    AuthenticationRequired = 204,
    ContentConflict = 206,
    ContentGone = 207,
    UnknownContent = 299,
    ProtocolUnknown = 301,
    ProtocolInvalidOperation = 302,
    ProtocolFailure = 399,
    InternalServerError = 401,
    OperationNotImplemented = 402,
    ServiceUnavailable = 403,
    UnknownServer = 499,
}

impl TransportErrorKind {
    /// Maps a non-success HTTP status onto the closest transport error class.
    pub fn from_status(status: http::StatusCode) -> Self {
        match status {
            http::StatusCode::BAD_REQUEST => TransportErrorKind::ProtocolInvalidOperation,
            http::StatusCode::UNAUTHORIZED => TransportErrorKind::AuthenticationRequired,
            http::StatusCode::FORBIDDEN => TransportErrorKind::ContentAccessDenied,
            http::StatusCode::NOT_FOUND => TransportErrorKind::ContentNotFound,
            http::StatusCode::METHOD_NOT_ALLOWED => {
                TransportErrorKind::ContentOperationNotPermitted
            }
            http::StatusCode::CONFLICT => TransportErrorKind::ContentConflict,
            http::StatusCode::GONE => TransportErrorKind::ContentGone,
            http::StatusCode::INTERNAL_SERVER_ERROR => TransportErrorKind::InternalServerError,
            http::StatusCode::NOT_IMPLEMENTED => TransportErrorKind::OperationNotImplemented,
            http::StatusCode::SERVICE_UNAVAILABLE => TransportErrorKind::ServiceUnavailable,
            s if s.is_server_error() => TransportErrorKind::UnknownServer,
            s if s.is_client_error() => TransportErrorKind::UnknownContent,
            _ => TransportErrorKind::ProtocolFailure,
        }
    }
}

/// Outcome classification of a request, unifying transport, protocol and API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    UnknownError,
    Transport(TransportErrorKind),
    JsonParseError,
    UnexpectedJsonDataError,
    EmptyJsonObjectError,
    Api(ApiErrorCode),
    /// API returned a code that is not known to this library.
    UnknownApiError(i64),
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::NoError
    }
}

impl ErrorCode {
    pub const JSON_PARSE_ERROR: i64 = 1001;
    pub const UNEXPECTED_JSON_DATA_ERROR: i64 = 1002;
    pub const EMPTY_JSON_OBJECT_ERROR: i64 = 1003;

    /// Numeric value of the code.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::UnknownError => -1,
            ErrorCode::Transport(kind) => *kind as i64,
            ErrorCode::JsonParseError => Self::JSON_PARSE_ERROR,
            ErrorCode::UnexpectedJsonDataError => Self::UNEXPECTED_JSON_DATA_ERROR,
            ErrorCode::EmptyJsonObjectError => Self::EMPTY_JSON_OBJECT_ERROR,
            ErrorCode::Api(code) => *code as i64,
            ErrorCode::UnknownApiError(code) => *code,
        }
    }

    /// Maps the `code` of a failed envelope.
    pub fn from_api_code(code: i64) -> Self {
        match num::FromPrimitive::from_i64(code) {
            Some(api_code) => ErrorCode::Api(api_code),
            None => ErrorCode::UnknownApiError(code),
        }
    }

    pub fn is_error(&self) -> bool {
        *self != ErrorCode::NoError
    }

    /// Symbolic name, empty for codes unknown to this library.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NoError",
            ErrorCode::UnknownError => "UnknownError",
            ErrorCode::Transport(kind) => (*kind).into(),
            ErrorCode::JsonParseError => "JsonParseError",
            ErrorCode::UnexpectedJsonDataError => "UnexpectedJsonDataError",
            ErrorCode::EmptyJsonObjectError => "EmptyJsonObjectError",
            ErrorCode::Api(code) => (*code).into(),
            ErrorCode::UnknownApiError(_) => "",
        }
    }
}

/// Extra information passed to `error_text`.
#[derive(Debug, Clone, Copy)]
pub enum ErrorDetails<'a> {
    None,
    Message(&'a str),
    Json(&'a Value),
}

impl<'a> ErrorDetails<'a> {
    fn message(&self) -> &'a str {
        match self {
            ErrorDetails::Message(message) => *message,
            _ => "",
        }
    }
}

/// Human readable description of `code`.
///
/// API codes only use their fixed description when no message was returned by the server.
pub fn error_text(code: ErrorCode, details: ErrorDetails<'_>) -> String {
    let message = details.message();

    match code {
        ErrorCode::UnknownError => return String::from("An unknown error occurred."),
        ErrorCode::NoError => return String::from("The operation completed successfully."),
        ErrorCode::Transport(TransportErrorKind::Timeout) => {
            return String::from("Operation timed out.")
        }
        ErrorCode::Transport(TransportErrorKind::OperationCanceled) => {
            return String::from("Operation was canceled.")
        }
        ErrorCode::JsonParseError => {
            return if message.is_empty() {
                String::from("Failed to parse JSON.")
            } else {
                format!("Failed to parse JSON: {}", message)
            };
        }
        ErrorCode::UnexpectedJsonDataError => {
            return match details {
                ErrorDetails::Json(Value::Array(_)) => {
                    String::from("Unexpected JSON Array received.")
                }
                _ => String::from("Unexpected JSON content received."),
            };
        }
        ErrorCode::EmptyJsonObjectError => {
            if message.is_empty() {
                return String::from("Empty JSON object received.");
            }
        }
        ErrorCode::Api(api_code) => {
            if message.is_empty() {
                return String::from(api_code.template());
            }
        }
        _ => {}
    }

    if !message.is_empty() {
        return String::from(message);
    }

    String::from(code.name())
}

/// Terminal failure of an `ApiRequest`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({})", .code.name())]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

impl RequestError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        RequestError {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(#[from] RequestError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no storage system available")]
    NoSystem,
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("failed to encode metrics")]
    FormatError,
    #[error("internal error: {0}")]
    InternalError(String),
}

fn html_response(status: Status, title: &str, detail: &str) -> response::Result<'static> {
    let error = format!(
        "<html><body><h3>{}</h3><code>{}</code></body></html>",
        title, detail
    );
    Response::build()
        .status(status)
        .sized_body(error.len(), Cursor::new(error))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match &self {
            Error::Request(e) => match e.code {
                ErrorCode::Api(ApiErrorCode::TooManyRequests) => html_response(
                    Status::TooManyRequests,
                    "429 Too Many Requests",
                    &e.message,
                ),
                ErrorCode::Api(ApiErrorCode::SignVerificationError)
                | ErrorCode::Api(ApiErrorCode::AppIdNotBoundToSn)
                | ErrorCode::Api(ApiErrorCode::SnNotBoundToUser)
                | ErrorCode::Api(ApiErrorCode::AppIdEmpty)
                | ErrorCode::Api(ApiErrorCode::SignEmpty) => {
                    html_response(Status::Forbidden, "403 Forbidden", &e.message)
                }
                ErrorCode::Transport(_)
                | ErrorCode::JsonParseError
                | ErrorCode::UnexpectedJsonDataError
                | ErrorCode::EmptyJsonObjectError => html_response(
                    Status::BadGateway,
                    "502 Bad Gateway",
                    &format!("Error while talking to downstream API: {}", e),
                ),
                _ => html_response(Status::InternalServerError, "API error", &e.to_string()),
            },
            Error::InvalidDate(_) => {
                html_response(Status::BadRequest, "400 Bad Request", &self.to_string())
            }
            Error::NoSystem => html_response(Status::NotFound, "404 Not Found", &self.to_string()),
            _ => html_response(
                Status::InternalServerError,
                "Unknown exception",
                &format!("{:?}", self),
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_error_with_message() {
        assert_eq!(
            "API said no.",
            error_text(
                ErrorCode::Api(ApiErrorCode::ParameterError),
                ErrorDetails::Message("API said no.")
            )
        );
    }

    #[test]
    fn api_error_without_message() {
        assert_eq!(
            "Invalid parameter provided.",
            error_text(
                ErrorCode::Api(ApiErrorCode::ParameterError),
                ErrorDetails::None
            )
        );
        assert_eq!(
            "Invalid parameter provided.",
            error_text(
                ErrorCode::Api(ApiErrorCode::ParameterError),
                ErrorDetails::Message("")
            )
        );
    }

    #[test]
    fn json_parse_error() {
        assert_eq!(
            "Failed to parse JSON: Unexpected , on line 2.",
            error_text(
                ErrorCode::JsonParseError,
                ErrorDetails::Message("Unexpected , on line 2.")
            )
        );
    }

    #[test]
    fn unexpected_json() {
        assert_eq!(
            "Unexpected JSON content received.",
            error_text(
                ErrorCode::UnexpectedJsonDataError,
                ErrorDetails::Json(&Value::Null)
            )
        );
        assert_eq!(
            "Unexpected JSON Array received.",
            error_text(
                ErrorCode::UnexpectedJsonDataError,
                ErrorDetails::Json(&json!([]))
            )
        );
    }

    #[test]
    fn transport_error() {
        assert_eq!(
            "Operation timed out.",
            error_text(
                ErrorCode::Transport(TransportErrorKind::Timeout),
                ErrorDetails::None
            )
        );
        assert_eq!(
            "ContentNotFound",
            error_text(
                ErrorCode::Transport(TransportErrorKind::ContentNotFound),
                ErrorDetails::None
            )
        );
    }

    #[test]
    fn out_of_bounds() {
        assert_eq!("", error_text(ErrorCode::from_api_code(9999), ErrorDetails::None));
        assert_eq!(
            "Out of bounds",
            error_text(
                ErrorCode::from_api_code(9999),
                ErrorDetails::Message("Out of bounds")
            )
        );
    }

    #[test]
    fn api_codes() {
        assert_eq!(
            ErrorCode::Api(ApiErrorCode::ParameterError),
            ErrorCode::from_api_code(6001)
        );
        assert_eq!(
            ErrorCode::Api(ApiErrorCode::TooManyRequests),
            ErrorCode::from_api_code(6053)
        );
        assert_eq!(ErrorCode::UnknownApiError(6003), ErrorCode::from_api_code(6003));
        assert_eq!(6001, ErrorCode::from_api_code(6001).code());
        assert_eq!(6003, ErrorCode::from_api_code(6003).code());
    }

    #[test]
    fn library_codes_are_distinct() {
        assert_ne!(
            ErrorCode::UnexpectedJsonDataError.code(),
            ErrorCode::EmptyJsonObjectError.code()
        );
        assert_eq!(1001, ErrorCode::JsonParseError.code());
        assert_eq!(5, ErrorCode::Transport(TransportErrorKind::OperationCanceled).code());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            TransportErrorKind::AuthenticationRequired,
            TransportErrorKind::from_status(http::StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            TransportErrorKind::UnknownServer,
            TransportErrorKind::from_status(http::StatusCode::BAD_GATEWAY)
        );
        assert_eq!(
            TransportErrorKind::UnknownContent,
            TransportErrorKind::from_status(http::StatusCode::IM_A_TEAPOT)
        );
    }
}
