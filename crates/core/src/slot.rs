//! Caller-owned session-state token.
//!
//! Some callers run as a series of short, otherwise stateless invocations
//! (scripts re-executed by a host application) and still want one manager
//! to survive between them. A [`SessionSlot`] is the value they keep around
//! for that: it holds at most one open resource and an explicit lifecycle
//! state, and every invocation goes through [`SessionSlot::open_with`] and
//! [`SessionSlot::acquire`] instead of reaching for a global.
//!
//! A slot found in a transitional state (another invocation is connecting
//! or closing) is polled with [`SessionSlot::settle`]. If it does not settle
//! in time the slot is reset to [`SlotState::Closed`] and the caller gets
//! [`Error::InconsistentState`].

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{MappedMutexGuard, MutexGuard};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::remote::{HostRemote, InterpreterRemote};

/// How many times [`SessionSlot::settle`] re-checks a transitional state.
pub const SETTLE_POLLS: u32 = 10;
/// Pause between two settle checks.
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
	Closed,
	Connecting,
	Open,
	Closing,
}

impl SlotState {
	pub fn is_transitional(self) -> bool {
		matches!(self, SlotState::Connecting | SlotState::Closing)
	}

	/// Allowed moves:
	///
	/// | from         | to                     |
	/// |--------------|------------------------|
	/// | `Closed`     | `Connecting`           |
	/// | `Connecting` | `Open`, `Closed`       |
	/// | `Open`       | `Closing`              |
	/// | `Closing`    | `Closed`               |
	pub fn can_transition_to(self, to: SlotState) -> bool {
		matches!(
			(self, to),
			(SlotState::Closed, SlotState::Connecting)
				| (SlotState::Connecting, SlotState::Open)
				| (SlotState::Connecting, SlotState::Closed)
				| (SlotState::Open, SlotState::Closing)
				| (SlotState::Closing, SlotState::Closed)
		)
	}
}

impl fmt::Display for SlotState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SlotState::Closed => "closed",
			SlotState::Connecting => "connecting",
			SlotState::Open => "open",
			SlotState::Closing => "closing",
		})
	}
}

/// Something a slot can hold and release.
pub trait SlotResource: Send + 'static {
	fn shutdown(&mut self) -> BoxFuture<'_, ()>;
}

impl SlotResource for InterpreterRemote {
	fn shutdown(&mut self) -> BoxFuture<'_, ()> {
		Box::pin(self.close())
	}
}

impl SlotResource for HostRemote {
	fn shutdown(&mut self) -> BoxFuture<'_, ()> {
		Box::pin(self.close())
	}
}

#[derive(Debug)]
struct Meta {
	state: SlotState,
	linked: BTreeSet<String>,
}

/// Shared handle to one optional resource and its lifecycle state.
///
/// Clones refer to the same slot.
pub struct SessionSlot<R> {
	meta: Arc<parking_lot::Mutex<Meta>>,
	resource: Arc<tokio::sync::Mutex<Option<R>>>,
}

impl<R> Clone for SessionSlot<R> {
	fn clone(&self) -> Self {
		Self {
			meta: Arc::clone(&self.meta),
			resource: Arc::clone(&self.resource),
		}
	}
}

impl<R> Default for SessionSlot<R> {
	fn default() -> Self {
		Self {
			meta: Arc::new(parking_lot::Mutex::new(Meta {
				state: SlotState::Closed,
				linked: BTreeSet::new(),
			})),
			resource: Arc::new(tokio::sync::Mutex::new(None)),
		}
	}
}

impl<R> fmt::Debug for SessionSlot<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let meta = self.meta.lock();
		f.debug_struct("SessionSlot")
			.field("state", &meta.state)
			.field("linked", &meta.linked)
			.finish()
	}
}

impl<R: SlotResource> SessionSlot<R> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> SlotState {
		self.meta.lock().state
	}

	/// Moves to `to` if the transition table allows it.
	pub fn transition(&self, to: SlotState) -> Result<()> {
		let mut meta = self.meta.lock();
		if !meta.state.can_transition_to(to) {
			return Err(Error::InvalidTransition {
				from: meta.state,
				to,
			});
		}
		debug!(target = "peerlink", from = %meta.state, %to, "session slot transition");
		meta.state = to;
		Ok(())
	}

	/// Waits until the slot is `Closed` or `Open` and returns that state.
	///
	/// Gives up after [`SETTLE_POLLS`] checks [`SETTLE_INTERVAL`] apart,
	/// drops whatever the slot held and resets it to `Closed`.
	pub async fn settle(&self) -> Result<SlotState> {
		for _ in 0..SETTLE_POLLS {
			let state = self.state();
			if !state.is_transitional() {
				return Ok(state);
			}
			tokio::time::sleep(SETTLE_INTERVAL).await;
		}
		let state = self.state();
		if !state.is_transitional() {
			return Ok(state);
		}

		warn!(target = "peerlink", %state, polls = SETTLE_POLLS, "session slot stuck, resetting");
		self.reset();
		if let Some(mut stale) = self.resource.lock().await.take() {
			stale.shutdown().await;
		}
		Err(Error::InconsistentState { polls: SETTLE_POLLS })
	}

	/// Opens the slot with `connect` unless it is open already.
	///
	/// `connect` only runs when the slot settled as `Closed`. A failed
	/// connect leaves the slot `Closed` and returns the error.
	pub async fn open_with<F, Fut>(&self, connect: F) -> Result<()>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<R>>,
	{
		loop {
			self.settle().await?;
			let mut meta = self.meta.lock();
			match meta.state {
				SlotState::Open => return Ok(()),
				SlotState::Closed => {
					meta.state = SlotState::Connecting;
					break;
				}
				// Lost a race with another opener; wait for it.
				SlotState::Connecting | SlotState::Closing => {}
			}
		}

		match connect().await {
			Ok(mut resource) => {
				let mut slot = self.resource.lock().await;
				if let Err(err) = self.transition(SlotState::Open) {
					drop(slot);
					resource.shutdown().await;
					return Err(err);
				}
				*slot = Some(resource);
				Ok(())
			}
			Err(err) => {
				let mut meta = self.meta.lock();
				if meta.state == SlotState::Connecting {
					meta.state = SlotState::Closed;
				}
				Err(err)
			}
		}
	}

	/// Exclusive access to the open resource.
	pub async fn acquire(&self) -> Result<MappedMutexGuard<'_, R>> {
		let guard = self.resource.lock().await;
		let state = self.state();
		if state != SlotState::Open {
			return Err(Error::SlotNotOpen { state });
		}
		MutexGuard::try_map(guard, Option::as_mut).map_err(|_| Error::SlotNotOpen { state })
	}

	/// Shuts the resource down and forgets linked names. Closing a closed
	/// slot is a no-op.
	pub async fn close(&self) -> Result<()> {
		if self.settle().await? == SlotState::Closed {
			return Ok(());
		}
		self.transition(SlotState::Closing)?;

		let resource = self.resource.lock().await.take();
		if let Some(mut resource) = resource {
			resource.shutdown().await;
		}

		let mut meta = self.meta.lock();
		meta.state = SlotState::Closed;
		meta.linked.clear();
		Ok(())
	}

	/// Records a name bound while the slot is open.
	pub fn link(&self, name: impl Into<String>) -> Result<()> {
		let mut meta = self.meta.lock();
		if meta.state != SlotState::Open {
			return Err(Error::SlotNotOpen { state: meta.state });
		}
		meta.linked.insert(name.into());
		Ok(())
	}

	/// Names recorded with [`Self::link`] since the slot opened.
	pub fn linked(&self) -> Vec<String> {
		self.meta.lock().linked.iter().cloned().collect()
	}

	fn reset(&self) {
		let mut meta = self.meta.lock();
		meta.state = SlotState::Closed;
		meta.linked.clear();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use tokio::time::Instant;

	use super::*;

	struct Tracked {
		id: u32,
		shutdowns: Arc<AtomicU32>,
	}

	impl SlotResource for Tracked {
		fn shutdown(&mut self) -> BoxFuture<'_, ()> {
			Box::pin(async move {
				self.shutdowns.fetch_add(1, Ordering::SeqCst);
			})
		}
	}

	fn tracked(id: u32, shutdowns: &Arc<AtomicU32>) -> Tracked {
		Tracked {
			id,
			shutdowns: Arc::clone(shutdowns),
		}
	}

	#[test]
	fn transition_table() {
		use SlotState::*;
		let all = [Closed, Connecting, Open, Closing];
		let allowed = [
			(Closed, Connecting),
			(Connecting, Open),
			(Connecting, Closed),
			(Open, Closing),
			(Closing, Closed),
		];
		for from in all {
			for to in all {
				assert_eq!(
					from.can_transition_to(to),
					allowed.contains(&(from, to)),
					"{from} -> {to}"
				);
			}
		}
	}

	#[tokio::test]
	async fn invalid_transition_is_rejected() {
		let slot = SessionSlot::<Tracked>::new();
		let err = slot.transition(SlotState::Open).unwrap_err();
		assert!(matches!(
			err,
			Error::InvalidTransition { from: SlotState::Closed, to: SlotState::Open }
		));
		assert_eq!(slot.state(), SlotState::Closed);
	}

	#[tokio::test]
	async fn open_acquire_link_close() {
		let shutdowns = Arc::new(AtomicU32::new(0));
		let slot = SessionSlot::new();

		slot.open_with(|| async { Ok(tracked(1, &shutdowns)) }).await.unwrap();
		assert_eq!(slot.state(), SlotState::Open);
		assert_eq!(slot.acquire().await.unwrap().id, 1);

		// Already open: the connect closure is not run.
		slot.open_with(|| async { Ok(tracked(2, &shutdowns)) }).await.unwrap();
		assert_eq!(slot.acquire().await.unwrap().id, 1);

		slot.link("math").unwrap();
		slot.link("rhinoscriptsyntax").unwrap();
		slot.link("math").unwrap();
		assert_eq!(slot.linked(), vec!["math", "rhinoscriptsyntax"]);

		slot.close().await.unwrap();
		assert_eq!(slot.state(), SlotState::Closed);
		assert!(slot.linked().is_empty());
		assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
		assert!(matches!(
			slot.acquire().await,
			Err(Error::SlotNotOpen { state: SlotState::Closed })
		));
		let err = slot.link("math").unwrap_err();
		assert_eq!(err.to_string(), "Session slot is closed, not open");

		slot.close().await.unwrap();
		assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failed_connect_returns_to_closed() {
		let slot = SessionSlot::<Tracked>::new();
		let err = slot
			.open_with(|| async { Err(Error::Config("no peer".into())) })
			.await
			.unwrap_err();
		assert!(matches!(err, Error::Config(_)));
		assert_eq!(slot.state(), SlotState::Closed);
	}

	#[tokio::test(start_paused = true)]
	async fn stuck_transition_is_reset() {
		let slot = SessionSlot::<Tracked>::new();
		slot.transition(SlotState::Connecting).unwrap();
		let start = Instant::now();

		let err = slot.settle().await.unwrap_err();

		assert!(matches!(err, Error::InconsistentState { polls: 10 }));
		assert_eq!(start.elapsed(), SETTLE_INTERVAL * SETTLE_POLLS);
		assert_eq!(slot.state(), SlotState::Closed);
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_open_waits_for_the_first() {
		let shutdowns = Arc::new(AtomicU32::new(0));
		let connects = Arc::new(AtomicU32::new(0));
		let slot = SessionSlot::new();

		let first = {
			let slot = slot.clone();
			let shutdowns = Arc::clone(&shutdowns);
			let connects = Arc::clone(&connects);
			tokio::spawn(async move {
				slot.open_with(|| async {
					connects.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_secs(3)).await;
					Ok(tracked(1, &shutdowns))
				})
				.await
			})
		};
		tokio::task::yield_now().await;
		assert_eq!(slot.state(), SlotState::Connecting);

		let start = Instant::now();
		slot.open_with(|| async {
			connects.fetch_add(1, Ordering::SeqCst);
			Ok(tracked(2, &shutdowns))
		})
		.await
		.unwrap();

		first.await.unwrap().unwrap();
		assert_eq!(connects.load(Ordering::SeqCst), 1);
		assert_eq!(slot.acquire().await.unwrap().id, 1);
		assert!(start.elapsed() >= Duration::from_secs(3));
	}
}
