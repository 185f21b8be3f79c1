//! Wire types for the peerlink RPC protocol.
//!
//! Both ends of a link (the caller-side manager and the peer-side server)
//! exchange length-prefixed JSON frames. This crate holds everything the two
//! sides must agree on and nothing that performs I/O:
//!
//! - [`Request`] / [`Response`] / [`ErrorPayload`] - request/response envelope
//! - [`ObjectRef`] / [`Invocation`] - root accessor results and call params
//! - [`LogLevel`] - the level token passed on the peer command line
//! - [`frame`] - frame header constants and encoding helpers
//! - legacy well-known ports for peers started without a port argument

pub mod frame;
pub mod level;
pub mod message;
pub mod target;

pub use level::LogLevel;
pub use message::{ErrorPayload, ErrorWrapper, Message, Request, Response};
pub use target::{ComponentParams, Invocation, NameParams, ObjectKind, ObjectRef};

/// GUID addressing the peer root object.
pub const ROOT_GUID: &str = "";

/// Port the interpreter-side service binds when none is given.
pub const LEGACY_INTERPRETER_PORT: u16 = 18872;

/// Port the host-application component service binds when none is given.
pub const LEGACY_HOST_PORT: u16 = 18871;

/// Error name reported by a peer that cannot resolve a requested target.
pub const UNKNOWN_TARGET: &str = "UnknownTarget";

/// Method names understood by the peer root and by object references.
pub mod methods {
	/// Liveness probe on the root object.
	pub const PING: &str = "ping";
	/// Resolve a module/namespace by name.
	pub const GET_MODULE: &str = "getModule";
	/// Resolve a component by name, optionally its cluster variant.
	pub const GET_COMPONENT: &str = "getComponent";
	/// Resolve a user object by name.
	pub const GET_USER_OBJECT: &str = "getUserObject";
	/// Invoke a resolved object reference.
	pub const CALL: &str = "call";
}
