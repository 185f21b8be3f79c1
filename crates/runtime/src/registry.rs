//! Named targets a [`crate::PeerServer`] exposes through its root accessors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use peerlink_protocol::{ErrorPayload, Invocation, ObjectKind, ObjectRef};
use serde_json::Value;

/// Outcome of a handler that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
	/// Application-level error, reported to the caller as-is.
	Raise(ErrorPayload),
	/// Drop the connection without answering, as a crashing peer would.
	Abort,
}

impl Fault {
	pub fn raise(name: impl Into<String>, message: impl Into<String>) -> Self {
		Fault::Raise(ErrorPayload::new(name, message))
	}
}

pub type HandlerResult = std::result::Result<Value, Fault>;

/// A callable target.
pub type Handler = Arc<dyn Fn(&Invocation) -> HandlerResult + Send + Sync>;

/// Name -> callable tables, one per root accessor.
///
/// Built once with the chaining setters and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct Registry {
	modules: HashMap<String, HashMap<String, Handler>>,
	components: HashMap<String, Handler>,
	clusters: HashMap<String, Handler>,
	user_objects: HashMap<String, Handler>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `function` to `module`, creating the module on first use.
	pub fn function<F>(mut self, module: &str, function: &str, handler: F) -> Self
	where
		F: Fn(&Invocation) -> HandlerResult + Send + Sync + 'static,
	{
		self.modules
			.entry(module.to_string())
			.or_default()
			.insert(function.to_string(), Arc::new(handler));
		self
	}

	/// Adds a compiled component.
	pub fn component<F>(mut self, name: &str, handler: F) -> Self
	where
		F: Fn(&Invocation) -> HandlerResult + Send + Sync + 'static,
	{
		self.components.insert(name.to_string(), Arc::new(handler));
		self
	}

	/// Adds a cluster component, found only with `isCluster` set.
	pub fn cluster<F>(mut self, name: &str, handler: F) -> Self
	where
		F: Fn(&Invocation) -> HandlerResult + Send + Sync + 'static,
	{
		self.clusters.insert(name.to_string(), Arc::new(handler));
		self
	}

	pub fn user_object<F>(mut self, name: &str, handler: F) -> Self
	where
		F: Fn(&Invocation) -> HandlerResult + Send + Sync + 'static,
	{
		self.user_objects.insert(name.to_string(), Arc::new(handler));
		self
	}

	pub fn module_names(&self) -> impl Iterator<Item = &str> {
		self.modules.keys().map(String::as_str)
	}

	pub(crate) fn resolve_module(&self, name: &str) -> Option<ObjectRef> {
		self.modules
			.contains_key(name)
			.then(|| ObjectRef::new(ObjectKind::Module, name))
	}

	pub(crate) fn resolve_component(&self, name: &str, is_cluster: bool) -> Option<ObjectRef> {
		if is_cluster {
			self.clusters.contains_key(name).then(|| ObjectRef::cluster(name))
		} else {
			self.components
				.contains_key(name)
				.then(|| ObjectRef::new(ObjectKind::Component, name))
		}
	}

	pub(crate) fn resolve_user_object(&self, name: &str) -> Option<ObjectRef> {
		self.user_objects
			.contains_key(name)
			.then(|| ObjectRef::new(ObjectKind::UserObject, name))
	}

	/// Runs the handler behind a resolved reference.
	pub(crate) fn invoke(&self, reference: &ObjectRef, invocation: &Invocation) -> HandlerResult {
		let handler = match reference.kind {
			ObjectKind::Module => {
				let Some(function) = invocation.function.as_deref() else {
					return Err(Fault::raise(
						"TypeError",
						format!("call on module '{}' needs a function name", reference.name),
					));
				};
				self.modules
					.get(&reference.name)
					.and_then(|functions| functions.get(function))
					.ok_or_else(|| unknown(format!("function '{}.{function}'", reference.name)))?
			}
			ObjectKind::Component if reference.guid.ends_with("#cluster") => self
				.clusters
				.get(&reference.name)
				.ok_or_else(|| unknown(format!("cluster '{}'", reference.name)))?,
			ObjectKind::Component => self
				.components
				.get(&reference.name)
				.ok_or_else(|| unknown(format!("component '{}'", reference.name)))?,
			ObjectKind::UserObject => self
				.user_objects
				.get(&reference.name)
				.ok_or_else(|| unknown(format!("user object '{}'", reference.name)))?,
		};
		handler(invocation)
	}
}

fn unknown(target: String) -> Fault {
	Fault::Raise(ErrorPayload::unknown_target(target))
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("modules", &self.modules.keys().collect::<Vec<_>>())
			.field("components", &self.components.keys().collect::<Vec<_>>())
			.field("clusters", &self.clusters.keys().collect::<Vec<_>>())
			.field("user_objects", &self.user_objects.keys().collect::<Vec<_>>())
			.finish()
	}
}
