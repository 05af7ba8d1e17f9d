// crates.io
use futures::channel::oneshot;
// self
use crate::{
	_prelude::*,
	obs,
	refresh::{RefreshMetrics, RefreshOutcome},
};

type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Debug, Default)]
struct CycleState {
	in_flight: bool,
	waiters: VecDeque<Waiter>,
}

enum Role {
	Driver,
	Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Singleflight gate for credential refreshes.
///
/// The first caller to arrive while no cycle is running drives one; everyone arriving before
/// it settles is queued and receives the same outcome, in the order they arrived. Settling
/// resets the in-flight flag and drains the queue in one critical section, so a caller that
/// arrives afterwards starts a new cycle instead of seeing the old outcome.
///
/// If the driving future is dropped mid-cycle, the queued callers are released and race to
/// drive a replacement cycle themselves.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
	state: Mutex<CycleState>,
	metrics: RefreshMetrics,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Counters for cycles driven through this coordinator.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Whether a cycle is currently in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().in_flight
	}

	/// Number of callers queued on the in-flight cycle.
	pub fn waiting(&self) -> usize {
		self.state.lock().waiters.len()
	}

	/// Runs `perform` as a new cycle, or waits for the cycle already in flight.
	///
	/// `perform` is only called when this caller ends up driving a cycle.
	pub async fn coalesce<F, Fut>(&self, perform: F) -> RefreshOutcome
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = RefreshOutcome>,
	{
		loop {
			match self.join() {
				Role::Waiter(receiver) => match receiver.await {
					Ok(outcome) => return outcome,
					// The driver was dropped before settling; try again.
					Err(oneshot::Canceled) => continue,
				},
				Role::Driver => {
					let guard = CycleGuard { coordinator: self, settled: false };
					let outcome = perform().await;

					guard.settle(&outcome);

					return outcome;
				},
			}
		}
	}

	fn join(&self) -> Role {
		let mut state = self.state.lock();

		if state.in_flight {
			let (sender, receiver) = oneshot::channel();

			state.waiters.push_back(sender);
			self.metrics.record_coalesced();

			Role::Waiter(receiver)
		} else {
			state.in_flight = true;
			self.metrics.record_cycle();

			Role::Driver
		}
	}

	fn finish_cycle(&self) -> VecDeque<Waiter> {
		let mut state = self.state.lock();

		state.in_flight = false;

		std::mem::take(&mut state.waiters)
	}
}

struct CycleGuard<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl CycleGuard<'_> {
	fn settle(mut self, outcome: &RefreshOutcome) {
		self.settled = true;

		let waiters = self.coordinator.finish_cycle();

		match outcome {
			Ok(_) => self.coordinator.metrics.record_success(),
			Err(_) => self.coordinator.metrics.record_failure(),
		}

		obs::refresh_settled(if outcome.is_ok() { "success" } else { "failure" }, waiters.len());

		for waiter in waiters {
			// A waiter whose caller went away has dropped its receiver.
			let _ = waiter.send(outcome.clone());
		}
	}
}
impl Drop for CycleGuard<'_> {
	fn drop(&mut self) {
		if !self.settled {
			let abandoned = self.coordinator.finish_cycle();

			obs::refresh_settled("abandoned", abandoned.len());
		}
	}
}
