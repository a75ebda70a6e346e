//! Typed metadata records carried in the metadata block.
//!
//! The codec itself treats metadata as opaque bytes. These records are the
//! JSON shapes peers conventionally exchange: a [`Header`] describing the
//! sender and a [`StatusMessage`] reporting an outcome.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::Transmission;
use crate::error::Result;

/// Identifies the sending agent and the endpoint a transmission targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "agentname")]
    pub agent_name: String,
    pub endpoint: i64,
    #[serde(rename = "addldata", default)]
    pub additional_data: String,
}

/// Outcome reported by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusMessage {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: None,
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Serialize a record into metadata bytes.
pub fn to_metadata<M: Serialize + ?Sized>(record: &M) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

impl Transmission {
    /// Deserialize the metadata block as JSON.
    pub fn metadata_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.metadata)?)
    }

    /// Build a transmission whose metadata is `record` serialized as JSON.
    pub fn with_json_metadata<M: Serialize + ?Sized>(payload: impl Into<bytes::Bytes>, record: &M) -> Result<Self> {
        Transmission::new(payload, to_metadata(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;

    #[test]
    fn header_uses_wire_field_names() {
        let header = Header {
            agent_name: "probe".to_string(),
            endpoint: 12,
            additional_data: "x=1".to_string(),
        };

        let json = String::from_utf8(to_metadata(&header).unwrap()).unwrap();
        assert_eq!(json, r#"{"agentname":"probe","endpoint":12,"addldata":"x=1"}"#);
    }

    #[test]
    fn header_tolerates_missing_addldata() {
        let header: Header = serde_json::from_str(r#"{"agentname":"a","endpoint":-1}"#).unwrap();
        assert_eq!(header.endpoint, -1);
        assert!(header.additional_data.is_empty());
    }

    #[test]
    fn status_message_omits_absent_message() {
        let json = serde_json::to_string(&StatusMessage::ok()).unwrap();
        assert_eq!(json, r#"{"code":0}"#);

        let json = serde_json::to_string(&StatusMessage::error(2, "bad endpoint")).unwrap();
        assert_eq!(json, r#"{"code":2,"message":"bad endpoint"}"#);
    }

    #[test]
    fn transmission_metadata_roundtrip() {
        let status = StatusMessage::error(7, "retry later");
        let t = Transmission::with_json_metadata(&b""[..], &status).unwrap();

        assert_eq!(t.payload_size, 0);
        let back: StatusMessage = t.metadata_json().unwrap();
        assert_eq!(back, status);
        assert!(!back.is_ok());
    }

    #[test]
    fn non_json_metadata_is_a_metadata_error() {
        let t = Transmission::new(&b"p"[..], &b"not json"[..]).unwrap();
        let err = t.metadata_json::<Header>().unwrap_err();
        assert!(matches!(err, FrameError::Metadata(_)));
    }
}
