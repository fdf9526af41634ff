use eyre::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

use super::session::{Exit, PollHandle, SessionState};

/// The request producer and result consumer for one session.
#[derive(Debug)]
pub struct Target<Q, C> {
    pub request: Q,
    pub on_result: C,
}

impl<Q, C> Target<Q, C> {
    pub fn new(request: Q, on_result: C) -> Self {
        Self { request, on_result }
    }
}

#[derive(Debug)]
#[must_use = "`start` must be called to run the poller"]
pub struct Poller<F> {
    /// Builds the request/consumer pair for each session
    factory: F,

    /// Config
    delay: Duration,
    limit: usize,
}

impl<F> Poller<F> {
    /// Create a new poller. `delay` is the pause between one result being
    /// delivered and the next request being issued.
    pub fn new(factory: F, delay: Duration) -> Self {
        Self {
            factory,
            delay,
            limit: usize::MAX,
        }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.set_limit(limit);
        self
    }

    /// Start a new session.
    ///
    /// The factory is called once with `params` and the first request is
    /// issued before this returns, unless the limit is zero. Every call gets its own session: stopping
    /// one never affects another started from the same poller.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<P, Q, Fut, C, R>(&self, params: P) -> PollHandle
    where
        F: Fn(P) -> Target<Q, C>,
        Q: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        C: FnMut(R) + Send + 'static,
        R: Send + 'static,
    {
        let Target {
            mut request,
            on_result,
        } = (self.factory)(params);

        let state = SessionState::new();
        let first = (self.limit > 0).then(|| request());
        let span = info_span!("poll_session", session = state.id());
        debug!(parent: &span, delay = ?self.delay, "poll session started");

        let task = tokio::spawn(
            drive(
                state.clone(),
                first,
                request,
                on_result,
                self.delay,
                self.limit,
            )
            .instrument(span),
        );

        PollHandle::new(state, task)
    }
}

/// The session loop: await the request, deliver unless stopped, sleep, repeat.
///
/// At most one request is in flight. A request is always awaited to
/// completion; stopping only suppresses what would follow it.
async fn drive<Q, Fut, C, R>(
    state: Arc<SessionState>,
    first: Option<Fut>,
    mut request: Q,
    mut on_result: C,
    delay: Duration,
    limit: usize,
) -> Result<Exit>
where
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
    C: FnMut(R),
{
    let Some(mut in_flight) = first else {
        return Ok(Exit::Exhausted);
    };
    let mut issued = 1usize;

    loop {
        let result = match in_flight.await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "poll request failed, session terminated");
                return Err(err);
            }
        };

        if state.unless_stopped(|| on_result(result)).is_none() {
            return Ok(Exit::Stopped);
        }

        if issued >= limit {
            debug!(issued, "poll session reached its limit");
            return Ok(Exit::Exhausted);
        }

        tokio::select! {
            biased;
            _ = state.stopped() => return Ok(Exit::Stopped),
            _ = tokio::time::sleep(delay) => {}
        }

        in_flight = match state.unless_stopped(&mut request) {
            Some(next) => next,
            None => return Ok(Exit::Stopped),
        };
        issued += 1;
    }
}
