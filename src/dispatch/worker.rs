//! The single pacing worker and its lifecycle.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	client::ApiClient,
	dispatch::{
		DispatchCounts, DispatchQueue, DispatchStats, QueuedRequest, RateLimit, queue::millis,
	},
	error::InvalidRate,
	obs::{self, DispatchOutcome, RelaySpan},
};

/// Lifecycle of the dispatcher worker; there is no way back to `Running`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WorkerState {
	/// Draining the queue.
	Running,
	/// Shutdown requested; finishing the in-flight call.
	Stopping,
	/// Worker has exited or was abandoned.
	Stopped,
}

/// Read-only snapshot of the queue and worker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QueueStatus {
	/// Items currently buffered.
	pub current_size: usize,
	/// Maximum number of buffered items.
	pub capacity: usize,
	/// Configured rate in requests per second.
	pub rate_per_second: u32,
	/// Whether the worker is running.
	pub worker_alive: bool,
}
impl QueueStatus {
	/// Buffered items as a percentage of capacity.
	pub fn utilization(&self) -> f64 {
		if self.capacity == 0 {
			return 0.0;
		}

		self.current_size as f64 / self.capacity as f64 * 100.0
	}
}

/// Outcome of [`RateLimitedDispatcher::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
	/// `true` when the worker exited within the grace period.
	pub graceful: bool,
	/// Items that were still queued and will not be dispatched.
	pub abandoned: Vec<QueuedRequest>,
	/// Count of undispatched items, including any that could not be drained.
	pub lost: usize,
}

/// Owns the single worker task that drains a [`DispatchQueue`] at the configured rate.
///
/// Each cycle takes one item, reads the current rate, performs the authenticated call, and then
/// sleeps for `floor(1000 / rate)` ms. Failures are logged and counted; they never stop the loop.
#[derive(Debug)]
pub struct RateLimitedDispatcher {
	queue: Arc<DispatchQueue>,
	rate: Arc<RateLimit>,
	stats: Arc<DispatchStats>,
	state: Arc<RwLock<WorkerState>>,
	worker: Mutex<Option<JoinHandle<()>>>,
}
impl RateLimitedDispatcher {
	/// How long a forcibly aborted worker is awaited before it is left behind.
	const ABORT_WAIT: std::time::Duration = std::time::Duration::from_secs(1);

	/// Starts the worker on the current tokio runtime.
	pub fn spawn(queue: Arc<DispatchQueue>, client: Arc<ApiClient>, rate: Arc<RateLimit>) -> Self {
		let stats = Arc::new(DispatchStats::default());
		let state = Arc::new(RwLock::new(WorkerState::Running));
		let worker = Worker {
			queue: queue.clone(),
			client,
			rate: rate.clone(),
			stats: stats.clone(),
			state: state.clone(),
		};
		let handle = tokio::spawn(worker.run());

		Self { queue, rate, stats, state, worker: Mutex::new(Some(handle)) }
	}

	/// Updates the rate; the change applies from the next cycle.
	pub fn set_rate(&self, rate: i64) -> Result<(), InvalidRate> {
		match self.rate.set(rate) {
			Ok(()) => {
				tracing::info!(rate, "Updated dispatch rate limit.");

				Ok(())
			},
			Err(err) => {
				tracing::warn!(rate, error = %err, "Rejected dispatch rate limit update.");

				Err(err)
			},
		}
	}

	/// Current rate in requests per second.
	pub fn rate(&self) -> u32 {
		self.rate.get()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> WorkerState {
		*self.state.read()
	}

	/// Returns `true` while the worker is running and its task has not exited.
	pub fn is_alive(&self) -> bool {
		self.state() == WorkerState::Running
			&& self.worker.lock().as_ref().is_some_and(|handle| !handle.is_finished())
	}

	/// Snapshot of queue depth, capacity, rate, and liveness.
	pub fn status(&self) -> QueueStatus {
		QueueStatus {
			current_size: self.queue.len(),
			capacity: self.queue.capacity(),
			rate_per_second: self.rate(),
			worker_alive: self.is_alive(),
		}
	}

	/// Cumulative processed/failed counters.
	pub fn counts(&self) -> DispatchCounts {
		self.stats.snapshot()
	}

	/// Signals shutdown and waits up to `grace` for the worker to finish its in-flight call.
	///
	/// Past the grace period the worker is aborted. Either way the remaining queued items are
	/// drained and reported, never dispatched. Calling this more than once is harmless.
	pub async fn shutdown(&self, grace: std::time::Duration) -> ShutdownReport {
		{
			let mut state = self.state.write();

			if *state == WorkerState::Running {
				*state = WorkerState::Stopping;
			}
		}

		tracing::info!(grace_ms = millis(grace), "Shutting down rate-limited dispatcher.");
		self.queue.close();

		let handle = self.worker.lock().take();
		let graceful = match handle {
			Some(mut handle) => match tokio::time::timeout(grace, &mut handle).await {
				Ok(_) => true,
				Err(_) => {
					tracing::warn!("Dispatcher did not stop within the grace period; aborting it.");
					handle.abort();

					if tokio::time::timeout(Self::ABORT_WAIT, handle).await.is_err() {
						tracing::error!("Dispatcher did not terminate after being aborted.");
					}

					false
				},
			},
			None => true,
		};

		*self.state.write() = WorkerState::Stopped;

		let abandoned = self.queue.drain_abandoned();
		let lost = abandoned.len() + self.queue.len();

		if lost > 0 {
			tracing::warn!(lost, "Shut down with unprocessed items in queue.");
		}

		ShutdownReport { graceful, abandoned, lost }
	}
}

struct Worker {
	queue: Arc<DispatchQueue>,
	client: Arc<ApiClient>,
	rate: Arc<RateLimit>,
	stats: Arc<DispatchStats>,
	state: Arc<RwLock<WorkerState>>,
}
impl Worker {
	async fn run(self) {
		tracing::info!(rate = self.rate.get(), "Starting rate-limited dispatcher.");

		while let Some(item) = self.queue.take().await {
			// Rate updates apply from the next cycle.
			let pause = self.rate.interval();

			self.dispatch(item).await;

			if pause.is_zero() {
				continue;
			}

			tokio::select! {
				biased;
				_ = self.queue.closed() => break,
				_ = tokio::time::sleep(pause) => {},
			}
		}

		*self.state.write() = WorkerState::Stopped;
		tracing::info!("Rate-limited dispatcher stopped.");
	}

	async fn dispatch(&self, item: QueuedRequest) {
		let QueuedRequest { id, kind, destination, method, payload, enqueued_at } = item;
		let span = RelaySpan::dispatch(&id, &kind);
		let queue_size = self.queue.len();
		let waited_ms = i64::try_from((OffsetDateTime::now_utc() - enqueued_at).whole_milliseconds())
			.unwrap_or(i64::MAX);

		obs::record_queue_depth(queue_size);

		// A spawned call turns a panic into a failed item instead of a dead worker.
		let client = self.client.clone();
		let mut call = AbortOnDrop(tokio::spawn(span.instrument(async move {
			client.call(method, &destination, Some(payload)).await
		})));

		span.instrument(async {
			tracing::info!(queue_size, waited_ms, "Processing {kind} message {id}.");

			match call.join().await {
				Ok(Ok(response)) => {
					self.stats.record_success();
					obs::record_dispatch_outcome(DispatchOutcome::Success);
					tracing::info!(status = response.status, "Processed {kind} message {id}.");
					tracing::debug!(body = %response.body, "Response body.");
				},
				Ok(Err(err)) => {
					self.stats.record_failure();
					obs::record_dispatch_outcome(DispatchOutcome::Failure);
					tracing::error!(
						error = %err,
						status = ?err.status(),
						"Failed to process {kind} message {id}."
					);
				},
				Err(err) => {
					self.stats.record_failure();
					obs::record_dispatch_outcome(DispatchOutcome::Failure);
					tracing::error!(error = %err, "Dispatch task for {kind} message {id} panicked.");
				},
			}
		})
		.await
	}
}

/// Aborts the wrapped task when dropped, so abandoning the worker also cancels its call.
struct AbortOnDrop<T>(JoinHandle<T>);
impl<T> AbortOnDrop<T> {
	async fn join(&mut self) -> Result<T, tokio::task::JoinError> {
		(&mut self.0).await
	}
}
impl<T> Drop for AbortOnDrop<T> {
	fn drop(&mut self) {
		self.0.abort();
	}
}
