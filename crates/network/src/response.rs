// crates/network/src/response.rs
//! Response validation and decoding

use crate::normalize::Failure;
use crate::transport::RawResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Passes responses with a status in 200..=299
pub fn validate(response: RawResponse) -> Result<RawResponse, Failure> {
    if (200..=299).contains(&response.status) {
        Ok(response)
    } else {
        Err(Failure::Status(response.status))
    }
}

/// Decodes the body as JSON into `M`
///
/// Dates are expected as ISO-8601 strings; model them with `chrono` types.
pub fn decode<M: DeserializeOwned>(response: &RawResponse) -> Result<M, Failure> {
    serde_json::from_slice(&response.body).map_err(Failure::Decode)
}

/// Backend response wrapper `{code, msg, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessEnvelope<D> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: D,
}

/// Unwraps `data` when `code` equals `success_code`
///
/// The payload is decoded only on success, so failing envelopes may carry a
/// `null` or mismatched `data`.
pub fn unwrap_business<M: DeserializeOwned>(
    envelope: BusinessEnvelope<serde_json::Value>,
    success_code: i64,
) -> Result<M, Failure> {
    if envelope.code != success_code {
        return Err(Failure::Business {
            code: envelope.code,
            msg: envelope.msg,
        });
    }
    serde_json::from_value(envelope.data).map_err(Failure::Decode)
}

/// Envelope as it arrives, with an optional payload
#[derive(Deserialize)]
pub(crate) struct WireEnvelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl From<WireEnvelope> for BusinessEnvelope<serde_json::Value> {
    fn from(wire: WireEnvelope) -> Self {
        Self {
            code: wire.code,
            msg: wire.msg,
            data: wire.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{DateTime, Utc};

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            headers: Default::default(),
            body: Bytes::copy_from_slice(body.as_bytes()),
            final_location: None,
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
        created_at: DateTime<Utc>,
    }

    #[test]
    fn test_validate_boundaries() {
        assert!(validate(raw(200, "")).is_ok());
        assert!(validate(raw(299, "")).is_ok());
        assert!(matches!(validate(raw(199, "")), Err(Failure::Status(199))));
        assert!(matches!(validate(raw(300, "")), Err(Failure::Status(300))));
        assert!(matches!(validate(raw(500, "{}")), Err(Failure::Status(500))));
    }

    #[test]
    fn test_decode_with_iso8601_date() {
        let response = raw(
            200,
            r#"{"id":1,"name":"Ada","created_at":"2025-12-16T08:30:00Z"}"#,
        );
        let user: User = decode(&response).unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.created_at.to_rfc3339(), "2025-12-16T08:30:00+00:00");
    }

    #[test]
    fn test_decode_malformed() {
        let result: Result<User, _> = decode(&raw(200, "not json"));
        assert!(matches!(result, Err(Failure::Decode(_))));

        let result: Result<User, _> = decode(&raw(200, ""));
        assert!(matches!(result, Err(Failure::Decode(_))));
    }

    fn envelope(body: &str) -> BusinessEnvelope<serde_json::Value> {
        serde_json::from_str::<WireEnvelope>(body).unwrap().into()
    }

    #[test]
    fn test_unwrap_success() {
        let value: Vec<u32> = unwrap_business(envelope(r#"{"code":0,"msg":"","data":[1,2]}"#), 0).unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[test]
    fn test_unwrap_business_error_ignores_data_shape() {
        let result: Result<Vec<u32>, _> =
            unwrap_business(envelope(r#"{"code":7,"msg":"bad","data":null}"#), 0);
        assert!(matches!(result, Err(Failure::Business { code: 7, ref msg }) if msg == "bad"));
    }

    #[test]
    fn test_unwrap_custom_success_code() {
        let value: String =
            unwrap_business(envelope(r#"{"code":200,"msg":"ok","data":"hi"}"#), 200).unwrap();
        assert_eq!(value, "hi");

        let result: Result<String, _> =
            unwrap_business(envelope(r#"{"code":0,"msg":"nope","data":"hi"}"#), 200);
        assert!(matches!(result, Err(Failure::Business { code: 0, .. })));
    }

    #[test]
    fn test_unwrap_unit_payload() {
        let result: Result<(), _> = unwrap_business(envelope(r#"{"code":0,"msg":""}"#), 0);
        assert!(result.is_ok());
    }
}
