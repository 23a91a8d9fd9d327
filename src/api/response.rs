use super::error::{error_text, ErrorCode, ErrorDetails, RequestError};
use serde_json::Value;

/// `code` of a successful envelope.
pub const SUCCESS_CODE: i64 = 200;

/// Classify a raw response body.
///
/// Every endpoint wraps its payload in `{"code": int, "msg": string, "data": ...}`. Returns the
/// `data` member if the envelope indicates success, otherwise the matching `RequestError`.
pub fn classify(body: &[u8]) -> Result<Value, RequestError> {
    let value = serde_json::from_slice::<Value>(body).map_err(|e| {
        RequestError::new(
            ErrorCode::JsonParseError,
            error_text(ErrorCode::JsonParseError, ErrorDetails::Message(&e.to_string())),
        )
    })?;

    let envelope = match &value {
        Value::Object(envelope) => envelope,
        _ => {
            return Err(RequestError::new(
                ErrorCode::UnexpectedJsonDataError,
                error_text(ErrorCode::UnexpectedJsonDataError, ErrorDetails::Json(&value)),
            ))
        }
    };

    if envelope.is_empty() {
        return Err(RequestError::new(
            ErrorCode::EmptyJsonObjectError,
            error_text(ErrorCode::EmptyJsonObjectError, ErrorDetails::None),
        ));
    }

    let code = envelope
        .get("code")
        .and_then(as_integer)
        .ok_or_else(|| {
            RequestError::new(ErrorCode::UnexpectedJsonDataError, "missing response code")
        })?;

    if code != SUCCESS_CODE {
        let error = ErrorCode::from_api_code(code);
        let msg = envelope.get("msg").and_then(Value::as_str).unwrap_or_default();
        return Err(RequestError::new(
            error,
            error_text(error, ErrorDetails::Message(msg)),
        ));
    }

    Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
}

/* {"code": 200.0} is accepted as well */
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

#[cfg(test)]
mod test {
    use super::classify;
    use crate::api::error::{ApiErrorCode, ErrorCode};
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    fn read_resource(filename: &str) -> Vec<u8> {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push(format!("resources/test/{}", filename));
        fs::read(d.as_path()).unwrap()
    }

    #[test]
    fn success_returns_data() {
        let data = classify(&read_resource("lastpowerdata_1.json")).unwrap();
        assert_eq!(4397, data["ppv"]);
        assert_eq!(98, data["soc"]);
    }

    #[test]
    fn api_error() {
        let error = classify(&read_resource("api_error.json")).unwrap_err();
        assert_eq!(ErrorCode::Api(ApiErrorCode::ParameterError), error.code);
        assert_eq!("Parameter error", error.message);
    }

    #[test]
    fn api_error_without_message() {
        let error = classify(br#"{"code":6007}"#).unwrap_err();
        assert_eq!(ErrorCode::Api(ApiErrorCode::SignVerificationError), error.code);
        assert_eq!("API secret verification error.", error.message);
    }

    #[test]
    fn unknown_api_error() {
        let error = classify(br#"{"code":6999,"msg":"Something odd"}"#).unwrap_err();
        assert_eq!(ErrorCode::UnknownApiError(6999), error.code);
        assert_eq!("Something odd", error.message);
    }

    #[test]
    fn garbled() {
        let error = classify(&read_resource("garbled.json")).unwrap_err();
        assert_eq!(ErrorCode::JsonParseError, error.code);
        assert!(error.message.starts_with("Failed to parse JSON: "));

        let error = classify(b"{not json").unwrap_err();
        assert_eq!(ErrorCode::JsonParseError, error.code);
    }

    #[test]
    fn not_an_object() {
        let error = classify(b"[1, 2, 3]").unwrap_err();
        assert_eq!(ErrorCode::UnexpectedJsonDataError, error.code);
        assert_eq!("Unexpected JSON Array received.", error.message);

        let error = classify(b"\"text\"").unwrap_err();
        assert_eq!(ErrorCode::UnexpectedJsonDataError, error.code);
        assert_eq!("Unexpected JSON content received.", error.message);
    }

    #[test]
    fn empty_object() {
        let error = classify(b"{}").unwrap_err();
        assert_eq!(ErrorCode::EmptyJsonObjectError, error.code);
        assert!(!error.message.is_empty());
    }

    #[test]
    fn missing_code() {
        let error = classify(br#"{"msg":"Success","data":{}}"#).unwrap_err();
        assert_eq!(ErrorCode::UnexpectedJsonDataError, error.code);
    }

    #[test]
    fn missing_data_is_null() {
        assert_eq!(json!(null), classify(br#"{"code":200,"msg":"Success"}"#).unwrap());
        assert_eq!(json!([]), classify(br#"{"code":200.0,"data":[]}"#).unwrap());
    }
}
