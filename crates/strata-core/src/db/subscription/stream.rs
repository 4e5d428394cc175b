use crate::db::subscription::Update;
use futures::Stream;
use serde::Serialize;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::{mpsc::UnboundedReceiver, watch};

///
/// SubscriptionState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SubscriptionState {
    /// Activation messages are still being delivered.
    Initializing,
    Active,
    Cancelled,
}

///
/// LiveUpdates
///
/// Continuous stream of one subscription. Dropping the stream cancels
/// the subscription; messages already queued are discarded with it.
///

#[derive(Debug)]
pub struct LiveUpdates {
    updates: UnboundedReceiver<Update>,
    control: Arc<watch::Sender<SubscriptionState>>,
}

impl LiveUpdates {
    pub(crate) const fn new(
        updates: UnboundedReceiver<Update>,
        control: Arc<watch::Sender<SubscriptionState>>,
    ) -> Self {
        Self { updates, control }
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.control.borrow()
    }

    /// Stop the listener. Messages it already queued can still be read.
    pub fn cancel(&self) {
        self.control.send_replace(SubscriptionState::Cancelled);
    }

    /// Next queued message without waiting.
    pub fn try_next(&mut self) -> Option<Update> {
        self.updates.try_recv().ok()
    }
}

impl Stream for LiveUpdates {
    type Item = Update;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Update>> {
        self.updates.poll_recv(cx)
    }
}

impl Drop for LiveUpdates {
    fn drop(&mut self) {
        self.cancel();
    }
}
