//! A single named remote invocation and its optional output projection.

use std::fmt;

use peerlink_protocol::Invocation;
use peerlink_runtime::{RemoteObject, Root};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// What a call resolves through the root accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	/// `function` inside the module `module` (interpreter direction).
	Module { module: String, function: String },
	/// A component, compiled or cluster (host direction).
	Component { name: String, is_cluster: bool },
	/// A user object (host direction).
	UserObject { name: String },
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Target::Module { module, function } => write!(f, "function {module}.{function}"),
			Target::Component { name, is_cluster: false } => write!(f, "component {name}"),
			Target::Component { name, is_cluster: true } => write!(f, "cluster {name}"),
			Target::UserObject { name } => write!(f, "user object {name}"),
		}
	}
}

/// Picks one element out of a structured result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSelector {
	/// Field of an object result.
	Field(String),
	/// Element of an array result.
	Index(usize),
}

impl OutputSelector {
	/// Returns the selected element, or [`Error::MissingOutput`].
	pub fn apply(&self, result: Value) -> Result<Value> {
		let selected = match (self, result) {
			(OutputSelector::Field(field), Value::Object(mut map)) => map.remove(field),
			(OutputSelector::Index(index), Value::Array(mut items)) if *index < items.len() => {
				Some(items.swap_remove(*index))
			}
			_ => None,
		};
		selected.ok_or_else(|| Error::MissingOutput {
			selector: self.to_string(),
		})
	}
}

impl fmt::Display for OutputSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OutputSelector::Field(field) => write!(f, "'{field}'"),
			OutputSelector::Index(index) => write!(f, "[{index}]"),
		}
	}
}

impl From<&str> for OutputSelector {
	fn from(field: &str) -> Self {
		OutputSelector::Field(field.to_string())
	}
}

impl From<usize> for OutputSelector {
	fn from(index: usize) -> Self {
		OutputSelector::Index(index)
	}
}

/// A remote invocation: target, forwarded arguments and output selector.
///
/// The same `Call` is re-issued unchanged after every rebuild, so building
/// one is the only place arguments are ever evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
	pub target: Target,
	pub args: Vec<Value>,
	pub kwargs: Map<String, Value>,
	pub output: Option<OutputSelector>,
}

impl Call {
	pub fn new(target: Target) -> Self {
		Self {
			target,
			args: Vec::new(),
			kwargs: Map::new(),
			output: None,
		}
	}

	pub fn function(module: impl Into<String>, function: impl Into<String>) -> Self {
		Self::new(Target::Module {
			module: module.into(),
			function: function.into(),
		})
	}

	pub fn component(name: impl Into<String>) -> Self {
		Self::new(Target::Component {
			name: name.into(),
			is_cluster: false,
		})
	}

	pub fn cluster(name: impl Into<String>) -> Self {
		Self::new(Target::Component {
			name: name.into(),
			is_cluster: true,
		})
	}

	pub fn user_object(name: impl Into<String>) -> Self {
		Self::new(Target::UserObject { name: name.into() })
	}

	/// Appends a positional argument.
	pub fn arg(mut self, value: impl Into<Value>) -> Self {
		self.args.push(value.into());
		self
	}

	pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
		self.args.extend(values);
		self
	}

	pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.kwargs.insert(key.into(), value.into());
		self
	}

	pub fn kwargs(mut self, kwargs: Map<String, Value>) -> Self {
		self.kwargs.extend(kwargs);
		self
	}

	/// Returns only the selected element of the result.
	pub fn select(mut self, output: impl Into<OutputSelector>) -> Self {
		self.output = Some(output.into());
		self
	}

	/// Projects `result` through the output selector, if any.
	pub fn project(&self, result: Value) -> Result<Value> {
		match &self.output {
			Some(selector) => selector.apply(result),
			None => Ok(result),
		}
	}

	/// Resolves the target on `root` and invokes it once.
	pub(crate) async fn invoke(&self, root: &Root) -> peerlink_runtime::Result<Value> {
		let (object, invocation) = self.resolve(root).await?;
		object.call(&invocation).await
	}

	async fn resolve(&self, root: &Root) -> peerlink_runtime::Result<(RemoteObject, Invocation)> {
		let invocation = Invocation::new(self.args.clone(), self.kwargs.clone());
		Ok(match &self.target {
			Target::Module { module, function } => {
				(root.get_module(module).await?, invocation.with_function(function))
			}
			Target::Component { name, is_cluster } => {
				(root.get_component(name, *is_cluster).await?, invocation)
			}
			Target::UserObject { name } => (root.get_user_object(name).await?, invocation),
		})
	}
}

impl fmt::Display for Call {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.target, f)
	}
}
