use futures::stream::Stream;
use futures::StreamExt;
use std::ops::{Deref, DerefMut};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

/// Create a broadcast pair for fanning poll results out to any number of
/// subscribers. The [`Publisher`] is meant to live inside a result consumer.
///
/// # Panics
///
/// Panics if `channel_size` is zero.
pub fn channel<Resp: Clone>(channel_size: usize) -> (Publisher<Resp>, PollChannel<Resp>) {
    let (tx, rx) = broadcast::channel::<Resp>(channel_size);
    (Publisher { tx }, rx.into())
}

#[derive(Debug)]
pub struct Publisher<Resp> {
    tx: broadcast::Sender<Resp>,
}

impl<Resp> Clone for Publisher<Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Resp: Clone> Publisher<Resp> {
    /// Send to every current subscriber. Having none is fine, the value is dropped.
    pub fn publish(&self, resp: Resp) {
        if self.tx.send(resp).is_err() {
            trace!("no subscribers, dropping poll result");
        }
    }

    pub fn subscribe(&self) -> PollChannel<Resp> {
        self.tx.subscribe().into()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug)]
pub struct PollChannel<Resp> {
    rx: broadcast::Receiver<Resp>,
}

impl<Resp> From<broadcast::Receiver<Resp>> for PollChannel<Resp> {
    fn from(value: broadcast::Receiver<Resp>) -> Self {
        Self { rx: value }
    }
}

impl<Resp> Deref for PollChannel<Resp> {
    type Target = broadcast::Receiver<Resp>;

    fn deref(&self) -> &Self::Target {
        &self.rx
    }
}

impl<Resp> DerefMut for PollChannel<Resp> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.rx
    }
}

impl<Resp> PollChannel<Resp>
where
    Resp: Clone + Send + 'static,
{
    pub fn resubscribe(&self) -> Self {
        Self {
            rx: self.rx.resubscribe(),
        }
    }

    /// Convert the channel into a stream.
    ///
    /// Lag errors are dropped: a subscriber that falls more than the
    /// channel size behind skips the values it missed and carries on.
    /// The stream ends once every [`Publisher`] is gone.
    pub fn into_stream(self) -> impl Stream<Item = Resp> + Unpin {
        let broadcast_stream: BroadcastStream<Resp> = self.rx.into();
        broadcast_stream.filter_map(|r| futures::future::ready(r.ok()))
    }
}
