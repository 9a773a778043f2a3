//! Periodic, read-only status logging for a running [`Relay`].
//!
//! The reporter never touches the queue or the credential cache beyond their snapshot reads, so
//! it adds no outbound calls and cannot disturb pacing.

// crates.io
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{Instant, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialStatus,
	config::ReporterConfig,
	dispatch::{DispatchCounts, QueueStatus},
	relay::Relay,
};

/// How loudly a snapshot should be logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
	/// Normal operation.
	Info,
	/// Needs attention.
	Warn,
}

/// Grades a queue snapshot: a dead worker or utilization above `warn_percent` warrants a warning.
pub fn assess_queue(status: &QueueStatus, warn_percent: f64) -> Severity {
	if !status.worker_alive || status.utilization() > warn_percent {
		Severity::Warn
	} else {
		Severity::Info
	}
}

/// Grades a credential snapshot: a missing credential or one expiring within `window` warrants a
/// warning.
pub fn assess_credential(status: &CredentialStatus, window: Duration) -> Severity {
	if !status.present || status.will_expire_within(window) {
		Severity::Warn
	} else {
		Severity::Info
	}
}

/// Dispatch counters accumulated over one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsWindow {
	/// Counter deltas for the window.
	pub counts: DispatchCounts,
	/// Wall time the window covered.
	pub elapsed: std::time::Duration,
}
impl StatsWindow {
	/// Items attempted per minute over the window.
	pub fn per_minute(&self) -> f64 {
		let minutes = self.elapsed.as_secs_f64() / 60.0;

		if minutes <= 0.0 {
			return 0.0;
		}

		(self.counts.processed + self.counts.failed) as f64 / minutes
	}

	/// Failure percentage over the window.
	pub fn error_rate(&self) -> f64 {
		self.counts.error_rate()
	}
}

/// Background task logging queue, credential, and throughput snapshots on fixed intervals.
#[derive(Debug)]
pub struct StatusReporter {
	stop: watch::Sender<bool>,
	handle: Mutex<Option<JoinHandle<()>>>,
}
impl StatusReporter {
	/// Starts reporting on the current tokio runtime.
	pub fn spawn(relay: Arc<Relay>, config: ReporterConfig) -> Self {
		let (stop, stopped) = watch::channel(false);
		let handle = tokio::spawn(report_loop(relay, config, stopped));

		Self { stop, handle: Mutex::new(Some(handle)) }
	}

	/// Stops the reporter and waits for its task to exit.
	pub async fn stop(&self) {
		self.stop.send_replace(true);

		let Some(handle) = self.handle.lock().take() else {
			return;
		};

		if let Err(err) = handle.await {
			tracing::warn!(error = %err, "Status reporter task ended abnormally.");
		}
	}
}

async fn report_loop(
	relay: Arc<Relay>,
	config: ReporterConfig,
	mut stopped: watch::Receiver<bool>,
) {
	let mut queue_tick = ticker(config.queue_interval());
	let mut credential_tick = ticker(config.credential_interval());
	let mut stats_tick = ticker(config.stats_interval());
	let mut window_start = (Instant::now(), relay.status().counts);

	loop {
		tokio::select! {
			biased;
			_ = stopped.wait_for(|stop| *stop) => break,
			_ = queue_tick.tick() => log_queue(&relay.queue_status(), &config),
			_ = credential_tick.tick() => log_credential(&relay.tokens().status(), &config),
			_ = stats_tick.tick() => {
				let now = (Instant::now(), relay.status().counts);

				log_stats(StatsWindow {
					counts: now.1.since(window_start.1),
					elapsed: now.0 - window_start.0,
				});

				window_start = now;
			},
		}
	}

	tracing::debug!("Status reporter stopped.");
}

fn ticker(period: std::time::Duration) -> tokio::time::Interval {
	let mut interval = tokio::time::interval_at(Instant::now() + period, period);

	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	interval
}

fn log_queue(status: &QueueStatus, config: &ReporterConfig) {
	let utilization = status.utilization();

	match assess_queue(status, config.utilization_warn_percent) {
		Severity::Info => tracing::info!(
			current_size = status.current_size,
			capacity = status.capacity,
			utilization,
			rate_per_second = status.rate_per_second,
			worker_alive = status.worker_alive,
			"Queue status."
		),
		Severity::Warn => tracing::warn!(
			current_size = status.current_size,
			capacity = status.capacity,
			utilization,
			rate_per_second = status.rate_per_second,
			worker_alive = status.worker_alive,
			"Queue needs attention."
		),
	}
}

fn log_credential(status: &CredentialStatus, config: &ReporterConfig) {
	let remaining_secs = status.time_to_expiry.whole_seconds();

	match assess_credential(status, config.expiry_warn_window()) {
		Severity::Info => tracing::info!(
			token_type = status.token_type.as_deref(),
			remaining_secs,
			"Credential status."
		),
		Severity::Warn if !status.present => {
			tracing::warn!("No credential is cached; the next dispatch will fetch one.")
		},
		Severity::Warn => tracing::warn!(remaining_secs, "Credential expires soon."),
	}
}

fn log_stats(window: StatsWindow) {
	tracing::info!(
		processed = window.counts.processed,
		failed = window.counts.failed,
		per_minute = window.per_minute(),
		error_rate = window.error_rate(),
		window_secs = window.elapsed.as_secs(),
		"Processing statistics."
	);
}
