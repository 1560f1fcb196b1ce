//! Msgbus wire envelope.
//!
//! Every RPC exchange and every pushed trap is a two-element JSON array:
//! a header object followed by an opaque params object. The header is
//! parsed once at the transport boundary; everything above works with
//! the typed [`Message`].

use crate::error::{LogDbError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// First element of the two-element wire array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub guid: String,

    #[serde(rename = "type")]
    pub msg_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// RPC method for requests/responses, trap topic for pushed events.
    #[serde(default)]
    pub method: String,

    /// Present only on error responses.
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A parsed msgbus message: RPC response or pushed trap.
#[derive(Debug, Clone)]
pub struct Message {
    pub guid: String,
    pub msg_type: String,
    pub method: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Opaque structured payload (second wire element).
    pub params: JsonValue,
}

impl Message {
    /// Parse a two-element wire array into a typed message.
    pub fn parse(value: JsonValue) -> Result<Self> {
        let (header, params): (EnvelopeHeader, JsonValue) = serde_json::from_value(value)?;
        Ok(Self {
            guid: header.guid,
            msg_type: header.msg_type,
            method: header.method,
            error_code: header.error_code,
            error_message: header.error_message,
            params,
        })
    }

    /// Build a request envelope header with a fresh guid.
    pub(crate) fn request_header(method: &str) -> EnvelopeHeader {
        EnvelopeHeader {
            guid: Uuid::new_v4().to_string(),
            msg_type: "Request".to_string(),
            source: Some("0".to_string()),
            target: Some("0".to_string()),
            method: method.to_string(),
            error_code: None,
            error_message: None,
        }
    }

    /// Serialize a request envelope (header + params) to its wire form.
    pub(crate) fn request_body(method: &str, params: &JsonValue) -> Result<String> {
        let header = Self::request_header(method);
        Ok(serde_json::to_string(&(&header, params))?)
    }

    /// Convert an error envelope into [`LogDbError::RemoteError`].
    pub(crate) fn into_result(self) -> Result<Self> {
        match self.error_code {
            Some(code) => Err(LogDbError::RemoteError {
                code,
                message: self.error_message.unwrap_or_default(),
            }),
            None => Ok(self),
        }
    }
}
