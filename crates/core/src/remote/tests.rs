use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use peerlink_protocol::Invocation;
use peerlink_protocol::frame::MAX_FRAME_LEN;
use peerlink_runtime::{
	Fault, LaunchSpec, LoopbackConnector, PeerProcess, PeerServer, ProcessState, Registry,
};
use serde_json::json;
use tokio::time::Instant;

use super::*;
use crate::supervisor::COOL_DOWN;

/// Launch bookkeeping shared between a test and its fake processes.
#[derive(Default)]
struct LaunchLog {
	launches: AtomicU32,
	terminations: AtomicU32,
	kills: AtomicU32,
	specs: Mutex<Vec<LaunchSpec>>,
	/// 1-based launch number from which launching fails.
	fail_from: Mutex<Option<u32>>,
	current: Mutex<Option<Arc<AtomicBool>>>,
}

impl LaunchLog {
	fn launches(&self) -> u32 {
		self.launches.load(Ordering::SeqCst)
	}

	fn terminations(&self) -> u32 {
		self.terminations.load(Ordering::SeqCst)
	}

	/// Makes the most recently launched process report that it exited.
	fn crash_current(&self) {
		if let Some(running) = self.current.lock().as_ref() {
			running.store(false, Ordering::SeqCst);
		}
	}
}

struct FakeLauncher(Arc<LaunchLog>);

impl Launcher for FakeLauncher {
	fn launch(&self, spec: &LaunchSpec) -> peerlink_runtime::Result<Box<dyn PeerProcess>> {
		spec.validate()?;
		let number = self.0.launches.fetch_add(1, Ordering::SeqCst) + 1;
		if matches!(*self.0.fail_from.lock(), Some(from) if number >= from) {
			return Err(peerlink_runtime::Error::LaunchFailed {
				peer: spec.peer_name(),
				source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
			});
		}
		self.0.specs.lock().push(spec.clone());
		let running = Arc::new(AtomicBool::new(true));
		*self.0.current.lock() = Some(Arc::clone(&running));
		Ok(Box::new(FakeProcess {
			running,
			log: Arc::clone(&self.0),
		}))
	}
}

struct FakeProcess {
	running: Arc<AtomicBool>,
	log: Arc<LaunchLog>,
}

impl PeerProcess for FakeProcess {
	fn id(&self) -> Option<u32> {
		Some(4242)
	}

	fn poll(&mut self) -> peerlink_runtime::Result<ProcessState> {
		Ok(if self.running.load(Ordering::SeqCst) {
			ProcessState::Running
		} else {
			ProcessState::Exited { code: Some(0) }
		})
	}

	fn terminate(&mut self) -> BoxFuture<'_, peerlink_runtime::Result<()>> {
		Box::pin(async move {
			if self.running.swap(false, Ordering::SeqCst) {
				self.log.terminations.fetch_add(1, Ordering::SeqCst);
			}
			Ok(())
		})
	}

	fn start_kill(&mut self) {
		if self.running.swap(false, Ordering::SeqCst) {
			self.log.kills.fetch_add(1, Ordering::SeqCst);
		}
	}
}

/// Peer whose `flaky.echo` drops the connection a scripted number of times.
struct Harness {
	log: Arc<LaunchLog>,
	connector: LoopbackConnector,
	received: Arc<Mutex<Vec<Invocation>>>,
}

impl Harness {
	fn new(aborts: u32) -> Self {
		let received = Arc::new(Mutex::new(Vec::new()));

		let flaky_aborts = Arc::new(AtomicU32::new(aborts));
		let flaky_received = Arc::clone(&received);
		let record = move |inv: &Invocation| {
			flaky_received.lock().push(inv.clone());
			let left = flaky_aborts.load(Ordering::SeqCst);
			if left > 0 {
				flaky_aborts.store(left - 1, Ordering::SeqCst);
				return Err(Fault::Abort);
			}
			Ok(json!({"echo": inv.args, "options": inv.kwargs}))
		};
		let component_record = record.clone();

		let registry = Registry::new()
			.function("math", "add", |inv| {
				Ok(json!(inv.args.iter().filter_map(Value::as_i64).sum::<i64>()))
			})
			.function("math", "divide", |inv| {
				let a = inv.args.first().and_then(Value::as_f64).unwrap_or_default();
				let b = inv.args.get(1).and_then(Value::as_f64).unwrap_or_default();
				if b == 0.0 {
					return Err(Fault::raise("ZeroDivisionError", "float division by zero"));
				}
				Ok(json!(a / b))
			})
			.function("flaky", "echo", record)
			.component("Divide Curve", |inv| {
				let count = inv.kwargs.get("count").and_then(Value::as_u64).unwrap_or(2);
				Ok(json!({"points": (0..=count).collect::<Vec<_>>(), "count": count}))
			})
			.component("Flaky", component_record)
			.cluster("Offset", |_| Ok(json!({"curve": "offset"})))
			.user_object("Greeter", |inv| {
				let name = inv.args.first().and_then(Value::as_str).unwrap_or("world");
				Ok(json!(format!("hello {name}")))
			});

		Self {
			log: Arc::new(LaunchLog::default()),
			connector: LoopbackConnector::new(PeerServer::new(registry)),
			received,
		}
	}

	fn config(&self, max_retry: u32) -> RemoteConfig {
		RemoteConfig::new("/opt/peer/python3", "/srv/peer/service.py")
			.with_port(40123)
			.with_timeout_secs(5)
			.with_max_retry(max_retry)
	}

	async fn interpreter(&self, max_retry: u32) -> Result<InterpreterRemote> {
		InterpreterRemote::connect_with(
			&self.config(max_retry),
			Arc::new(FakeLauncher(Arc::clone(&self.log))),
			Arc::new(self.connector.clone()),
		)
		.await
	}

	async fn host(&self, max_retry: u32) -> Result<HostRemote> {
		HostRemote::connect_with(
			&self.config(max_retry),
			Arc::new(FakeLauncher(Arc::clone(&self.log))),
			Arc::new(self.connector.clone()),
		)
		.await
	}

	fn received(&self) -> Vec<Invocation> {
		self.received.lock().clone()
	}
}

fn echo_call() -> Call {
	Call::function("flaky", "echo").arg(7).arg("seven").kwarg("precise", true)
}

#[tokio::test(start_paused = true)]
async fn connect_launches_once_and_calls_through() {
	let harness = Harness::new(0);
	let mut remote = harness.interpreter(3).await.unwrap();

	let sum = remote
		.run_function("math", "add", vec![json!(2), json!(3)], Map::new())
		.await
		.unwrap();

	assert_eq!(sum, json!(5));
	assert_eq!(harness.log.launches(), 1);
	assert_eq!(remote.session_state(), SessionState::Connected);
	assert_eq!(remote.port(), 40123);
	assert_eq!(remote.retries(), 0);

	let spec = &harness.log.specs.lock()[0];
	assert_eq!(spec.style, InvocationStyle::Direct);
	assert_eq!(spec.port, 40123);
}

#[tokio::test(start_paused = true)]
async fn accessor_resolves_known_module() {
	let harness = Harness::new(0);
	let remote = harness.interpreter(3).await.unwrap();

	let math = remote.get_module("math").await.unwrap();
	assert_eq!(math.name(), "math");
	let quotient: f64 = math
		.call_as(&Invocation::new(vec![json!(9), json!(3)], Map::new()).with_function("divide"))
		.await
		.unwrap();
	assert_eq!(quotient, 3.0);
}

#[tokio::test(start_paused = true)]
async fn transport_drop_is_rebuilt_and_call_reissued() {
	let harness = Harness::new(1);
	let mut remote = harness.interpreter(3).await.unwrap();
	let start = Instant::now();

	let result = remote.call(&echo_call()).await.unwrap();

	assert_eq!(result["echo"], json!([7, "seven"]));
	assert_eq!(harness.log.launches(), 2);
	assert_eq!(harness.log.terminations(), 1);
	assert_eq!(harness.connector.sessions(), 2);
	assert_eq!(remote.retries(), 1);
	assert_eq!(remote.supervisor_state(), SupervisorState::Idle);
	assert_eq!(start.elapsed(), COOL_DOWN);

	let received = harness.received();
	assert_eq!(received.len(), 2);
	assert_eq!(received[0], received[1]);
}

#[tokio::test(start_paused = true)]
async fn retries_exactly_max_retry_times_then_exhausts() {
	let harness = Harness::new(u32::MAX);
	let mut remote = harness.interpreter(2).await.unwrap();
	let start = Instant::now();

	let err = remote.call(&echo_call()).await.unwrap_err();

	match &err {
		Error::RetryCeilingExhausted { peer, operation, max_retry } => {
			assert_eq!(peer, "/opt/peer/python3");
			assert_eq!(operation, "function flaky.echo");
			assert_eq!(*max_retry, 2);
		}
		other => panic!("expected RetryCeilingExhausted, got {other:?}"),
	}
	assert!(err.to_string().contains("(2)"));
	assert_eq!(harness.log.launches(), 3);
	assert_eq!(remote.retries(), 2);
	assert_eq!(remote.supervisor_state(), SupervisorState::Exhausted);
	assert_eq!(remote.session_state(), SessionState::Failed);
	assert_eq!(start.elapsed(), COOL_DOWN * 2);

	let received = harness.received();
	assert_eq!(received.len(), 3);
	assert!(received.iter().all(|inv| *inv == received[0]));

	// Terminal: no further launches, same error.
	let again = remote.call(&Call::function("math", "add").arg(1)).await.unwrap_err();
	assert!(matches!(again, Error::RetryCeilingExhausted { .. }));
	assert_eq!(harness.log.launches(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_max_retry_exhausts_on_first_drop() {
	let harness = Harness::new(1);
	let mut remote = harness.interpreter(0).await.unwrap();

	let err = remote.call(&echo_call()).await.unwrap_err();

	assert!(matches!(err, Error::RetryCeilingExhausted { max_retry: 0, .. }));
	assert_eq!(harness.log.launches(), 1);
	assert_eq!(harness.received().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_error_propagates_without_rebuild() {
	let harness = Harness::new(0);
	let mut remote = harness.interpreter(3).await.unwrap();

	let err = remote
		.run_function("math", "divide", vec![json!(1), json!(0)], Map::new())
		.await
		.unwrap_err();

	assert!(err.is_remote(), "got {err:?}");
	assert!(!err.is_transport());
	match err {
		Error::Runtime(peerlink_runtime::Error::Remote { name, message, .. }) => {
			assert_eq!(name, "ZeroDivisionError");
			assert_eq!(message, "float division by zero");
		}
		other => panic!("expected remote error, got {other:?}"),
	}
	assert_eq!(harness.log.launches(), 1);
	assert_eq!(remote.retries(), 0);
	assert_eq!(remote.supervisor_state(), SupervisorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unknown_target_is_distinct_and_not_retried() {
	let harness = Harness::new(0);
	let mut remote = harness.interpreter(3).await.unwrap();

	let err = remote.call(&Call::function("numpyy", "array")).await.unwrap_err();
	assert!(err.is_unknown_target(), "got {err:?}");

	let err = remote.call(&Call::function("math", "mul")).await.unwrap_err();
	assert!(err.is_unknown_target(), "got {err:?}");
	assert_eq!(harness.log.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn oversized_request_is_a_protocol_error_not_a_rebuild() {
	let harness = Harness::new(0);
	let mut remote = harness.interpreter(1).await.unwrap();

	let call = Call::function("math", "add").arg("x".repeat(MAX_FRAME_LEN + 16));
	let err = remote.call(&call).await.unwrap_err();

	assert!(
		matches!(err, Error::Runtime(peerlink_runtime::Error::ProtocolError(_))),
		"got {err:?}"
	);
	assert!(!err.is_transport());
	assert_eq!(harness.log.launches(), 1);
	assert_eq!(remote.retries(), 0);
	assert_eq!(remote.session_state(), SessionState::Connected);

	let sum = remote.call(&Call::function("math", "add").arg(2).arg(3)).await.unwrap();
	assert_eq!(sum, json!(5));
	assert_eq!(harness.log.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn output_selector_projects_component_result() {
	let harness = Harness::new(0);
	let mut remote = harness.host(3).await.unwrap();

	let full = remote
		.run_component("Divide Curve", false, vec![], Map::new())
		.await
		.unwrap();
	assert_eq!(full, json!({"points": [0, 1, 2], "count": 2}));

	let count = remote
		.call(&Call::component("Divide Curve").kwarg("count", 4).select("count"))
		.await
		.unwrap();
	assert_eq!(count, json!(4));

	let err = remote
		.call(&Call::component("Divide Curve").select("length"))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::MissingOutput { .. }));
	assert_eq!(harness.log.launches(), 1);

	let spec = &harness.log.specs.lock()[0];
	assert_eq!(spec.style, InvocationStyle::RunScript);
}

#[tokio::test(start_paused = true)]
async fn host_reaches_clusters_and_user_objects() {
	let harness = Harness::new(0);
	let mut remote = harness.host(3).await.unwrap();

	let offset = remote.run_component("Offset", true, vec![], Map::new()).await.unwrap();
	assert_eq!(offset["curve"], "offset");

	let err = remote.run_component("Offset", false, vec![], Map::new()).await.unwrap_err();
	assert!(err.is_unknown_target());

	let greeting = remote
		.run_user_object("Greeter", vec![json!("rhino")], Map::new())
		.await
		.unwrap();
	assert_eq!(greeting, json!("hello rhino"));

	let greeter = remote.get_user_object("Greeter").await.unwrap();
	assert_eq!(greeter.guid(), "userObject@Greeter");
	let cluster = remote.get_component("Offset", true).await.unwrap();
	assert_eq!(cluster.guid(), "component@Offset#cluster");
}

#[tokio::test(start_paused = true)]
async fn host_component_drop_is_rebuilt() {
	let harness = Harness::new(1);
	let mut remote = harness.host(1).await.unwrap();

	let result = remote
		.call(&Call::component("Flaky").arg(1).select("echo"))
		.await
		.unwrap();
	assert_eq!(result, json!([1]));
	assert_eq!(remote.retries(), 1);
	assert_eq!(harness.log.launches(), 2);
}

#[tokio::test(start_paused = true)]
async fn wrong_direction_target_is_rejected_locally() {
	let harness = Harness::new(0);
	let mut interpreter = harness.interpreter(3).await.unwrap();
	let err = interpreter.call(&Call::component("Divide Curve")).await.unwrap_err();
	assert!(matches!(err, Error::UnsupportedTarget { .. }));

	let mut host = harness.host(3).await.unwrap();
	let err = host.call(&Call::function("math", "add")).await.unwrap_err();
	assert!(matches!(err, Error::UnsupportedTarget { direction: "host application", .. }));
}

#[tokio::test(start_paused = true)]
async fn close_twice_and_after_exit_is_quiet() {
	let harness = Harness::new(0);
	let mut remote = harness.interpreter(3).await.unwrap();

	remote.close().await;
	remote.close().await;
	assert_eq!(remote.session_state(), SessionState::Disconnected);
	assert_eq!(harness.log.terminations(), 1);

	let err = remote.call(&Call::function("math", "add")).await.unwrap_err();
	match &err {
		Error::Closed { peer, operation } => {
			assert_eq!(peer, "/opt/peer/python3");
			assert_eq!(operation, "function math.add");
		}
		other => panic!("expected closed session, got {other:?}"),
	}
	assert_eq!(
		err.to_string(),
		"Session with peer /opt/peer/python3 is closed; cannot run function math.add"
	);
	assert!(matches!(remote.root(), Err(Error::Closed { operation, .. }) if operation == "root access"));

	let mut remote = harness.interpreter(3).await.unwrap();
	harness.log.crash_current();
	remote.close().await;
	assert_eq!(harness.log.terminations(), 1);
}

#[tokio::test(start_paused = true)]
async fn handles_from_before_a_rebuild_are_invalid() {
	let harness = Harness::new(1);
	let mut remote = harness.interpreter(3).await.unwrap();
	let stale = remote.get_module("math").await.unwrap();

	remote.call(&echo_call()).await.unwrap();

	let err = stale.call_function("add", vec![json!(1)], Map::new()).await.unwrap_err();
	assert!(err.is_transport());
	let fresh = remote.get_module("math").await.unwrap();
	assert_eq!(fresh.call_function("add", vec![json!(1)], Map::new()).await.unwrap(), json!(1));
}

#[tokio::test(start_paused = true)]
async fn failed_rebuild_is_fatal() {
	let harness = Harness::new(1);
	*harness.log.fail_from.lock() = Some(2);
	let mut remote = harness.interpreter(3).await.unwrap();

	let err = remote.call(&echo_call()).await.unwrap_err();
	assert!(
		matches!(err, Error::Runtime(peerlink_runtime::Error::LaunchFailed { .. })),
		"got {err:?}"
	);
	assert_eq!(remote.session_state(), SessionState::Failed);

	let err = remote.call(&Call::function("math", "add")).await.unwrap_err();
	assert!(matches!(err, Error::Closed { .. }), "got {err:?}");
	assert!(err.to_string().contains("/opt/peer/python3"));
}

#[tokio::test(start_paused = true)]
async fn launch_failure_surfaces_at_construction() {
	let harness = Harness::new(0);
	*harness.log.fail_from.lock() = Some(1);

	let err = harness.interpreter(3).await.unwrap_err();
	assert!(matches!(err, Error::Runtime(peerlink_runtime::Error::LaunchFailed { .. })));
	assert!(err.to_string().contains("/opt/peer/python3"));
}

#[tokio::test(start_paused = true)]
async fn invalid_config_fails_before_launch() {
	let harness = Harness::new(0);
	let config = RemoteConfig::new("", "/srv/peer/service.py");
	let err = InterpreterRemote::connect_with(
		&config,
		Arc::new(FakeLauncher(Arc::clone(&harness.log))),
		Arc::new(harness.connector.clone()),
	)
	.await
	.unwrap_err();

	assert!(matches!(err, Error::Runtime(peerlink_runtime::Error::Precondition(_))));
	assert_eq!(harness.log.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn scope_closes_on_error_and_success() {
	let harness = Harness::new(0);

	let remote = harness.interpreter(3).await.unwrap();
	let err = remote
		.scope(|remote| {
			Box::pin(async move {
				remote
					.run_function("math", "divide", vec![json!(1), json!(0)], Map::new())
					.await
			})
		})
		.await
		.unwrap_err();
	assert!(err.is_remote());
	assert_eq!(harness.log.terminations(), 1);

	let remote = harness.interpreter(3).await.unwrap();
	let sum = remote
		.scope(|remote| {
			Box::pin(async move {
				remote
					.run_function("math", "add", vec![json!(20), json!(22)], Map::new())
					.await
			})
		})
		.await
		.unwrap();
	assert_eq!(sum, json!(42));
	assert_eq!(harness.log.terminations(), 2);
}

#[tokio::test(start_paused = true)]
async fn drop_kills_the_peer() {
	let harness = Harness::new(0);
	let remote = harness.interpreter(3).await.unwrap();
	drop(remote);
	assert_eq!(harness.log.kills.load(Ordering::SeqCst), 1);
}

#[test]
fn direction_defaults() {
	assert_eq!(Direction::Interpreter.default_style(), InvocationStyle::Direct);
	assert_eq!(Direction::Host.default_style(), InvocationStyle::RunScript);
	assert!(Direction::Host.allows(&Target::UserObject { name: "Greeter".into() }));
	assert!(!Direction::Interpreter.allows(&Target::UserObject { name: "Greeter".into() }));
}
