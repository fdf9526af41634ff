//! Cancellable repeating poller.
//!
//! A [`Poller`] turns a factory of request/consumer pairs into sessions that
//! issue a request, hand the result to the consumer, wait `delay`, and go
//! again until stopped through their [`PollHandle`].

pub mod channel;
pub mod poller;
mod session;

pub use channel::{channel, PollChannel, Publisher};
pub use poller::{Poller, Target};
pub use session::{Exit, PollHandle, Stopper};
