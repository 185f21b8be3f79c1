//! Request/response envelope.
//!
//! The caller sends [`Request`]s tagged with a sequential id; the peer answers
//! each with exactly one [`Response`] carrying either a result or an
//! [`ErrorPayload`]. Peers never push unsolicited messages, but the caller
//! tolerates them as [`Message::Unknown`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::UNKNOWN_TARGET;

/// Request sent from the caller to the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request ID for correlating responses
	pub id: u32,
	/// GUID of the target object, empty for the root
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	/// Method name to invoke
	pub method: String,
	/// Method parameters
	#[serde(default)]
	pub params: Value,
}

/// Serde helpers for `Arc<str>` serialization
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Response sent from the peer to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request ID this response correlates to
	pub id: u32,
	/// Success result (mutually exclusive with error)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

impl Response {
	pub fn ok(id: u32, result: Value) -> Self {
		Self {
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn err(id: u32, error: ErrorPayload) -> Self {
		Self {
			id,
			result: None,
			error: Some(ErrorWrapper { error }),
		}
	}
}

/// Wrapper for protocol error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWrapper {
	pub error: ErrorPayload,
}

/// Error raised on the peer side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// Error message
	pub message: String,
	/// Error type name (e.g. "ValueError", "UnknownTarget")
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Stack trace
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl ErrorPayload {
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			name: Some(name.into()),
			stack: None,
		}
	}

	/// Payload for a name that the peer could not resolve.
	pub fn unknown_target(target: impl Into<String>) -> Self {
		Self::new(UNKNOWN_TARGET, target)
	}

	pub fn is_unknown_target(&self) -> bool {
		self.name.as_deref() == Some(UNKNOWN_TARGET)
	}
}

/// Any message a caller may read off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}
