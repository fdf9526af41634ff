use eyre::Result;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the session whose result consumer is running on this thread.
    static DELIVERING: Cell<Option<u64>> = const { Cell::new(None) };
}

/// How a session ended when it ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// `stop` was called.
    Stopped,
    /// The poller's iteration limit was reached.
    Exhausted,
}

/// State owned by exactly one poll session.
#[derive(Debug)]
pub(crate) struct SessionState {
    id: u64,
    token: CancellationToken,
    /// Held while issuing a request or delivering a result, so that `stop`
    /// can wait out an effect already in progress on another thread.
    effects: Mutex<()>,
}

impl SessionState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            effects: Mutex::new(()),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session is stopped. Used to cut the inter-poll sleep short.
    pub(crate) async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Runs `effect` unless the session has been stopped.
    ///
    /// Returns `None` without running it if stopped.
    pub(crate) fn unless_stopped<T>(&self, effect: impl FnOnce() -> T) -> Option<T> {
        let _guard = self.lock_effects();
        if self.is_stopped() {
            return None;
        }
        let _delivering = DeliveringScope::enter(self.id);
        Some(effect())
    }

    pub(crate) fn stop(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            debug!(session = self.id, "poll session stopped");
        }

        // Called from inside some session's consumer, this one or another:
        // waiting could deadlock against a consumer stopping us back. The
        // target rechecks the token before its next effect.
        if DELIVERING.with(Cell::get).is_some() {
            return;
        }
        drop(self.lock_effects());
    }

    fn lock_effects(&self) -> MutexGuard<'_, ()> {
        // A panicking consumer poisons the lock; the session is over either way.
        self.effects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct DeliveringScope(Option<u64>);

impl DeliveringScope {
    fn enter(id: u64) -> Self {
        Self(DELIVERING.with(|d| d.replace(Some(id))))
    }
}

impl Drop for DeliveringScope {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.0));
    }
}

/// Cloneable stop function for one session.
#[derive(Debug, Clone)]
pub struct Stopper {
    state: Arc<SessionState>,
}

impl Stopper {
    /// Stop the session. Idempotent.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }
}

/// Handle to a running poll session, returned by [`Poller::start`](super::Poller::start).
///
/// Dropping the handle detaches the session; it keeps polling until the
/// request fails or the iteration limit is reached.
#[derive(Debug)]
#[must_use = "dropping the handle detaches the session, call `stop` to end it"]
pub struct PollHandle {
    state: Arc<SessionState>,
    task: Option<JoinHandle<Result<Exit>>>,
}

impl PollHandle {
    pub(crate) fn new(state: Arc<SessionState>, task: JoinHandle<Result<Exit>>) -> Self {
        Self {
            state,
            task: Some(task),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// Stop the session.
    ///
    /// Once this returns no further request is issued and no further result
    /// is delivered. A request already in flight still runs to completion,
    /// its result is discarded. Calling it more than once is a no-op.
    ///
    /// From inside a result consumer this does not wait for the target's
    /// in-progress delivery; the target still delivers nothing after it.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    /// True once the session's task has returned, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn stopper(&self) -> Stopper {
        Stopper {
            state: self.state.clone(),
        }
    }

    /// Wait for the session to end.
    ///
    /// This is where a failed request surfaces: the session ends with the
    /// request's error and nothing else reports it.
    pub async fn join(mut self) -> Result<Exit> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(Exit::Stopped),
        }
    }
}

impl Default for PollHandle {
    /// A handle with no session behind it. Stopping it does nothing.
    fn default() -> Self {
        let state = SessionState::new();
        state.token.cancel();
        Self { state, task: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_get_distinct_ids() {
        let a = SessionState::new();
        let b = SessionState::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_unless_stopped_skips_after_stop() {
        let state = SessionState::new();
        assert_eq!(state.unless_stopped(|| 1), Some(1));
        state.stop();
        assert_eq!(state.unless_stopped(|| 2), None);
    }

    #[test]
    fn test_stop_inside_effect_does_not_deadlock() {
        let state = SessionState::new();
        let inner = state.clone();
        let ran = state.unless_stopped(move || {
            inner.stop();
            inner.is_stopped()
        });
        assert_eq!(ran, Some(true));
        assert_eq!(DELIVERING.with(Cell::get), None);
    }

    #[test]
    fn test_stop_other_session_inside_effect_does_not_wait() {
        let a = SessionState::new();
        let b = SessionState::new();
        let held = b.lock_effects();
        let target = b.clone();
        assert_eq!(a.unless_stopped(move || target.stop()), Some(()));
        drop(held);
        assert!(b.is_stopped());
        assert_eq!(b.unless_stopped(|| ()), None);
    }

    #[test]
    fn test_stop_after_poisoned_effect() {
        let state = SessionState::new();
        let inner = state.clone();
        let panicked = std::thread::spawn(move || {
            inner.unless_stopped(|| {
                panic!("consumer failed");
            });
        })
        .join();
        assert!(panicked.is_err());
        assert!(state.effects.is_poisoned());

        let stopper = Stopper {
            state: state.clone(),
        };
        stopper.stop();
        assert!(stopper.is_stopped());
    }

    #[tokio::test]
    async fn test_default_handle_is_inert() {
        let handle = PollHandle::default();
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(handle.is_finished());
        assert_eq!(handle.join().await.expect("inert join"), Exit::Stopped);
    }
}
