//! Launch a peer process, keep an RPC session to it alive, and call into it.
//!
//! Two managers cover the two directions a link can run in:
//!
//! - [`InterpreterRemote`] drives a remote interpreter through its module
//!   accessor (`run_function`, `get_module`).
//! - [`HostRemote`] drives a remote host application through its component
//!   and user-object accessors (`run_component`, `run_user_object`).
//!
//! Both launch the peer with the configured port and log level, wait until
//! it accepts and answers a ping, and re-run a call after a transport drop
//! by tearing the peer down, cooling off and relaunching it, up to
//! `max_retry` times.
//!
//! ```ignore
//! let config = RemoteConfig::new("python3", "service.py").with_max_retry(3);
//! let mut remote = InterpreterRemote::connect(&config).await?;
//! let sum = remote.call(&Call::function("math", "fsum").arg(json!([0.1, 0.2]))).await?;
//! remote.close().await;
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod remote;
pub mod session;
pub mod slot;
pub mod supervisor;

pub use call::{Call, OutputSelector, Target};
pub use config::RemoteConfig;
pub use error::{Error, Result};
pub use peerlink_protocol::{LEGACY_HOST_PORT, LEGACY_INTERPRETER_PORT, LogLevel};
pub use peerlink_runtime::{
	Fault, InvocationStyle, LaunchSpec, PeerServer, Registry, RemoteObject, Root,
};
pub use remote::{Direction, HostRemote, InterpreterRemote, Remote};
pub use session::{Session, SessionState};
pub use slot::{SETTLE_INTERVAL, SETTLE_POLLS, SessionSlot, SlotResource, SlotState};
pub use supervisor::{COOL_DOWN, Supervisor, SupervisorState};
