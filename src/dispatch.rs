//! Bounded FIFO queue and the single pacing worker that drains it.
//!
//! Producers hand [`QueuedRequest`]s to [`DispatchQueue::submit`], which applies backpressure
//! once the queue is full. Exactly one [`RateLimitedDispatcher`] worker takes items in arrival
//! order, performs the authenticated call, and then sleeps for `floor(1000 / rate)` ms. Because
//! no other task issues dispatch calls, that post-call sleep alone bounds the outbound rate.

pub mod queue;
pub mod rate;
pub mod stats;
pub mod worker;

pub use queue::*;
pub use rate::*;
pub use stats::*;
pub use worker::*;
