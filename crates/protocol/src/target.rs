//! Root accessor params, object references and invocation params.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a root accessor resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
	Module,
	Component,
	UserObject,
}

impl ObjectKind {
	pub fn as_str(self) -> &'static str {
		match self {
			ObjectKind::Module => "module",
			ObjectKind::Component => "component",
			ObjectKind::UserObject => "userObject",
		}
	}
}

impl fmt::Display for ObjectKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Reference to a peer-side object, returned by the root accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
	/// Peer-unique identifier, `"<kind>@<name>"`.
	pub guid: String,
	pub kind: ObjectKind,
	/// Name the object was resolved by.
	pub name: String,
}

impl ObjectRef {
	pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			guid: format!("{kind}@{name}"),
			kind,
			name,
		}
	}

	/// Reference to the cluster variant of a component.
	pub fn cluster(name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			guid: format!("{}@{name}#cluster", ObjectKind::Component),
			kind: ObjectKind::Component,
			name,
		}
	}
}

/// Params of `getModule` and `getUserObject`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameParams {
	pub name: String,
}

/// Params of `getComponent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentParams {
	pub name: String,
	#[serde(default)]
	pub is_cluster: bool,
}

/// Params of `call` on an object reference.
///
/// Modules need `function`; components and user objects are called directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(default)]
	pub args: Vec<Value>,
	#[serde(default)]
	pub kwargs: Map<String, Value>,
}

impl Invocation {
	pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
		Self {
			function: None,
			args,
			kwargs,
		}
	}

	pub fn with_function(mut self, function: impl Into<String>) -> Self {
		self.function = Some(function.into());
		self
	}
}
