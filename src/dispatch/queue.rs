//! Bounded FIFO buffer between producers and the dispatcher worker.

// crates.io
use tokio::sync::{mpsc, watch};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, QueueError},
	http::Method,
};

/// Work item relayed to the downstream API.
///
/// Owned by the queue until dequeued, then exclusively by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
	/// Opaque identifier assigned by the producer (e.g. a transport message id).
	pub id: String,
	/// Producer-defined category used for logging (e.g. `Incident`).
	pub kind: String,
	/// Destination appended to the API path (e.g. a table name).
	pub destination: String,
	/// HTTP method used for the call.
	pub method: Method,
	/// Opaque request body.
	pub payload: String,
	/// Instant the item was created.
	pub enqueued_at: OffsetDateTime,
}
impl QueuedRequest {
	/// Creates a `POST` item stamped with the current instant.
	pub fn new(
		id: impl Into<String>,
		kind: impl Into<String>,
		destination: impl Into<String>,
		payload: impl Into<String>,
	) -> Self {
		Self {
			id: id.into(),
			kind: kind.into(),
			destination: destination.into(),
			method: Method::Post,
			payload: payload.into(),
			enqueued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Overrides the HTTP method.
	pub fn with_method(mut self, method: Method) -> Self {
		self.method = method;

		self
	}

	/// Time spent since the item was created.
	pub fn age(&self) -> Duration {
		OffsetDateTime::now_utc() - self.enqueued_at
	}
}

/// Bounded multi-producer, single-consumer FIFO queue with timed submission.
///
/// Insertion order is preserved once an item is accepted; concurrent producers are ordered by
/// whichever of them the channel admits first. Nothing is dropped silently: items still queued
/// at shutdown are handed back through [`drain_abandoned`](Self::drain_abandoned).
#[derive(Debug)]
pub struct DispatchQueue {
	sender: mpsc::Sender<QueuedRequest>,
	receiver: AsyncMutex<mpsc::Receiver<QueuedRequest>>,
	closed: watch::Sender<bool>,
	capacity: usize,
}
impl DispatchQueue {
	/// Creates an empty queue holding at most `capacity` items.
	pub fn new(capacity: usize) -> Result<Self, ConfigError> {
		if capacity == 0 {
			return Err(ConfigError::ZeroCapacity);
		}

		let (sender, receiver) = mpsc::channel(capacity);
		let (closed, _) = watch::channel(false);

		Ok(Self { sender, receiver: AsyncMutex::new(receiver), closed, capacity })
	}

	/// Enqueues `item`, waiting up to `timeout` for free capacity.
	///
	/// A zero timeout still accepts the item when capacity is immediately available.
	pub async fn submit(
		&self,
		item: QueuedRequest,
		timeout: std::time::Duration,
	) -> Result<(), QueueError> {
		let mut closed = self.closed.subscribe();

		if *closed.borrow() {
			return Err(QueueError::Closed);
		}

		tokio::select! {
			biased;
			_ = wait_closed(&mut closed) => Err(QueueError::Closed),
			sent = self.sender.send_timeout(item, timeout) => match sent {
				Ok(()) => Ok(()),
				Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(QueueError::Full {
					capacity: self.capacity,
					waited_ms: millis(timeout),
				}),
				Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(QueueError::Closed),
			},
		}
	}

	/// Waits for the next item in FIFO order.
	///
	/// Returns `None` once the queue has been closed, even if items remain buffered.
	pub async fn take(&self) -> Option<QueuedRequest> {
		let mut receiver = self.receiver.lock().await;
		let mut closed = self.closed.subscribe();

		if *closed.borrow() {
			return None;
		}

		tokio::select! {
			biased;
			_ = wait_closed(&mut closed) => None,
			item = receiver.recv() => item,
		}
	}

	/// Stops accepting items and wakes any pending [`take`](Self::take) with the shutdown signal.
	pub fn close(&self) {
		self.closed.send_replace(true);
	}

	/// Returns `true` once [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		*self.closed.borrow()
	}

	/// Resolves once the queue has been closed.
	pub async fn closed(&self) {
		wait_closed(&mut self.closed.subscribe()).await;
	}

	/// Number of items currently buffered.
	pub fn len(&self) -> usize {
		self.sender.max_capacity() - self.sender.capacity()
	}

	/// Returns `true` when no items are buffered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Maximum number of buffered items.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Removes and returns every buffered item without dispatching it.
	///
	/// The receiving side is closed first, so producers still blocked in
	/// [`submit`](Self::submit) fail with [`QueueError::Closed`] instead of taking a freed slot.
	/// Returns an empty list while a consumer still holds the receiving side.
	pub fn drain_abandoned(&self) -> Vec<QueuedRequest> {
		let Some(mut receiver) = self.receiver.try_lock() else {
			return Vec::new();
		};

		self.closed.send_replace(true);
		receiver.close();

		let mut abandoned = Vec::with_capacity(receiver.len());

		while let Ok(item) = receiver.try_recv() {
			abandoned.push(item);
		}

		abandoned
	}
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: std::time::Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
	let _ = closed.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;

	fn item(id: &str) -> QueuedRequest {
		QueuedRequest::new(id, "incident", "incident", "{}")
	}

	#[tokio::test]
	async fn preserves_fifo_order() {
		let queue = DispatchQueue::new(8).expect("Queue should build.");

		for id in ["a", "b", "c"] {
			queue.submit(item(id), StdDuration::ZERO).await.expect("Submit should succeed.");
		}

		assert_eq!(queue.len(), 3);

		for id in ["a", "b", "c"] {
			assert_eq!(queue.take().await.expect("Item should be available.").id, id);
		}

		assert!(queue.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn full_queue_times_out() {
		let queue = DispatchQueue::new(2).expect("Queue should build.");

		queue.submit(item("1"), StdDuration::ZERO).await.expect("First submit should succeed.");
		queue.submit(item("2"), StdDuration::ZERO).await.expect("Second submit should succeed.");

		let started = tokio::time::Instant::now();
		let err = queue
			.submit(item("3"), StdDuration::from_millis(250))
			.await
			.expect_err("Submit into a full queue should time out.");

		assert_eq!(err, QueueError::Full { capacity: 2, waited_ms: 250 });
		assert!(started.elapsed() >= StdDuration::from_millis(250));
		assert_eq!(queue.len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn blocked_submit_proceeds_once_space_opens() {
		let queue = Arc::new(DispatchQueue::new(1).expect("Queue should build."));

		queue.submit(item("1"), StdDuration::ZERO).await.expect("First submit should succeed.");

		let producer = {
			let queue = queue.clone();

			tokio::spawn(async move { queue.submit(item("2"), StdDuration::from_secs(5)).await })
		};

		tokio::time::sleep(StdDuration::from_millis(100)).await;

		assert_eq!(queue.take().await.expect("First item should be available.").id, "1");

		producer.await.expect("Producer should not panic.").expect("Blocked submit should land.");

		assert_eq!(queue.take().await.expect("Second item should be available.").id, "2");
	}

	#[tokio::test]
	async fn close_wakes_take_and_rejects_submit() {
		let queue = Arc::new(DispatchQueue::new(4).expect("Queue should build."));
		let consumer = {
			let queue = queue.clone();

			tokio::spawn(async move { queue.take().await })
		};

		tokio::task::yield_now().await;
		queue.close();

		assert!(consumer.await.expect("Consumer should not panic.").is_none());
		assert!(queue.is_closed());
		assert_eq!(queue.submit(item("late"), StdDuration::ZERO).await, Err(QueueError::Closed));
	}

	#[tokio::test]
	async fn drain_returns_buffered_items_after_close() {
		let queue = DispatchQueue::new(4).expect("Queue should build.");

		queue.submit(item("x"), StdDuration::ZERO).await.expect("Submit should succeed.");
		queue.submit(item("y"), StdDuration::ZERO).await.expect("Submit should succeed.");
		queue.close();

		assert!(queue.take().await.is_none());

		let abandoned = queue.drain_abandoned();

		assert_eq!(abandoned.iter().map(|item| item.id.as_str()).collect::<Vec<_>>(), ["x", "y"]);
		assert!(queue.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn blocked_producers_are_admitted_in_arrival_order() {
		let queue = Arc::new(DispatchQueue::new(1).expect("Queue should build."));

		queue.submit(item("0"), StdDuration::ZERO).await.expect("First submit should succeed.");

		let mut producers = Vec::new();

		for id in ["1", "2", "3"] {
			let queue = queue.clone();

			producers.push(tokio::spawn(async move {
				queue.submit(item(id), StdDuration::from_secs(10)).await
			}));
			tokio::time::sleep(StdDuration::from_millis(10)).await;
		}

		for id in ["0", "1", "2", "3"] {
			assert_eq!(queue.take().await.expect("Item should be available.").id, id);
		}

		for producer in producers {
			producer.await.expect("Producer should not panic.").expect("Submit should land.");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn drain_rejects_producers_blocked_at_shutdown() {
		let queue = Arc::new(DispatchQueue::new(1).expect("Queue should build."));

		queue.submit(item("a"), StdDuration::ZERO).await.expect("First submit should succeed.");

		let producer = {
			let queue = queue.clone();

			tokio::spawn(async move { queue.submit(item("b"), StdDuration::from_secs(10)).await })
		};

		tokio::time::sleep(StdDuration::from_millis(10)).await;
		queue.close();

		let abandoned = queue.drain_abandoned();

		assert_eq!(abandoned.iter().map(|item| item.id.as_str()).collect::<Vec<_>>(), ["a"]);
		assert_eq!(
			producer.await.expect("Producer should not panic."),
			Err(QueueError::Closed)
		);
		assert!(queue.is_empty());
		assert!(queue.drain_abandoned().is_empty());
	}

	#[tokio::test]
	async fn drain_closes_the_queue() {
		let queue = DispatchQueue::new(2).expect("Queue should build.");

		queue.submit(item("x"), StdDuration::ZERO).await.expect("Submit should succeed.");

		assert_eq!(queue.drain_abandoned().len(), 1);
		assert!(queue.is_closed());
		assert_eq!(queue.submit(item("late"), StdDuration::ZERO).await, Err(QueueError::Closed));
	}

	#[test]
	fn millis_saturates() {
		assert_eq!(millis(StdDuration::from_millis(1_500)), 1_500);
		assert_eq!(millis(StdDuration::MAX), u64::MAX);
	}

	#[test]
	fn zero_capacity_is_rejected() {
		assert!(matches!(DispatchQueue::new(0), Err(ConfigError::ZeroCapacity)));
	}
}
