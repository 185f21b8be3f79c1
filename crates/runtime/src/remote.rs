//! Handles to peer-side objects.

use std::sync::Arc;

use peerlink_protocol::{
	ComponentParams, Invocation, NameParams, ObjectKind, ObjectRef, ROOT_GUID, methods,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Reference to an object living in the peer, bound to the connection that
/// resolved it.
///
/// A handle does not survive a reconnection: once its connection is closed
/// every call fails with a transport error and the object has to be resolved
/// again through a fresh [`Root`].
#[derive(Clone)]
pub struct RemoteObject {
	reference: ObjectRef,
	connection: Arc<Connection>,
}

impl RemoteObject {
	pub fn new(reference: ObjectRef, connection: Arc<Connection>) -> Self {
		Self { reference, connection }
	}

	pub fn guid(&self) -> &str {
		&self.reference.guid
	}

	pub fn name(&self) -> &str {
		&self.reference.name
	}

	pub fn kind(&self) -> ObjectKind {
		self.reference.kind
	}

	pub fn reference(&self) -> &ObjectRef {
		&self.reference
	}

	/// Invokes the object with a prepared [`Invocation`].
	pub async fn call(&self, invocation: &Invocation) -> Result<Value> {
		let params = serde_json::to_value(invocation)?;
		self.connection
			.send_message(&self.reference.guid, methods::CALL, params)
			.await
	}

	/// Calls `function` inside a module object.
	pub async fn call_function(
		&self,
		function: &str,
		args: Vec<Value>,
		kwargs: Map<String, Value>,
	) -> Result<Value> {
		self.call(&Invocation::new(args, kwargs).with_function(function))
			.await
	}

	/// Calls the object and deserializes the result.
	pub async fn call_as<R: DeserializeOwned>(&self, invocation: &Invocation) -> Result<R> {
		let value = self.call(invocation).await?;
		serde_json::from_value(value).map_err(Error::from)
	}
}

impl std::fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteObject")
			.field("guid", &self.reference.guid)
			.field("kind", &self.reference.kind)
			.finish()
	}
}

/// The peer's root accessors.
///
/// Borrowed from the current connection each time it is needed; it holds no
/// state of its own, so there is nothing to invalidate on rebuild.
#[derive(Clone)]
pub struct Root {
	connection: Arc<Connection>,
}

impl Root {
	pub fn new(connection: Arc<Connection>) -> Self {
		Self { connection }
	}

	/// Resolves a module/namespace by name.
	pub async fn get_module(&self, name: &str) -> Result<RemoteObject> {
		let params = serde_json::to_value(NameParams { name: name.to_string() })?;
		self.resolve(methods::GET_MODULE, params).await
	}

	/// Resolves a component, or its cluster variant when `is_cluster` is set.
	pub async fn get_component(&self, name: &str, is_cluster: bool) -> Result<RemoteObject> {
		let params = serde_json::to_value(ComponentParams {
			name: name.to_string(),
			is_cluster,
		})?;
		self.resolve(methods::GET_COMPONENT, params).await
	}

	/// Resolves a user object by name.
	pub async fn get_user_object(&self, name: &str) -> Result<RemoteObject> {
		let params = serde_json::to_value(NameParams { name: name.to_string() })?;
		self.resolve(methods::GET_USER_OBJECT, params).await
	}

	async fn resolve(&self, method: &str, params: Value) -> Result<RemoteObject> {
		let value = self.connection.send_message(ROOT_GUID, method, params).await?;
		let reference: ObjectRef = serde_json::from_value(value)
			.map_err(|e| Error::ProtocolError(format!("{method} returned an invalid object reference: {e}")))?;
		Ok(RemoteObject::new(reference, Arc::clone(&self.connection)))
	}
}
