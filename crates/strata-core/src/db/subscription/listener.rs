//! Live subscription task: drains one commit mailbox in version order.

use crate::{
    db::{
        Inner,
        commit::CommitEvent,
        error::Error,
        subscription::{StoreRefill, SubscriptionState, Tracker, Update},
    },
    obs::MetricsEvent,
};
use std::sync::{Arc, Weak};
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, error};

///
/// Listener
///

pub(crate) struct Listener {
    /// Weak so an abandoned store can drop while subscriptions linger.
    pub(crate) store: Weak<Inner>,
    pub(crate) tracker: Tracker,
    /// Activation messages, sent before the first commit is processed.
    pub(crate) initial: Vec<Update>,
    pub(crate) mailbox: UnboundedReceiver<Arc<CommitEvent>>,
    pub(crate) out: UnboundedSender<Update>,
    pub(crate) control: Arc<watch::Sender<SubscriptionState>>,
}

impl Listener {
    pub(crate) fn spawn(self, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(self.run())
    }

    async fn run(mut self) {
        let mut cancelled = self.control.subscribe();

        let cancelled_early = *cancelled.borrow() == SubscriptionState::Cancelled;
        let initial = std::mem::take(&mut self.initial);
        if !cancelled_early && self.deliver(initial) {
            self.control.send_if_modified(|state| {
                let initializing = *state == SubscriptionState::Initializing;
                if initializing {
                    *state = SubscriptionState::Active;
                }
                initializing
            });

            loop {
                tokio::select! {
                    biased;

                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() == SubscriptionState::Cancelled {
                            break;
                        }
                    }
                    event = self.mailbox.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        match self.handle(&event) {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(err) => {
                                error!(version = %event.version, error = %err, "subscription aborted");
                                break;
                            }
                        }
                    }
                }
            }
        }

        debug!(cursor = %self.tracker.cursor, "subscription stopped");
        self.control.send_replace(SubscriptionState::Cancelled);
    }

    // Process one commit; `false` once the store or the consumer is gone.
    fn handle(&mut self, event: &CommitEvent) -> Result<bool, Error> {
        let Some(store) = self.store.upgrade() else {
            return Ok(false);
        };

        let updates = {
            let state = store.state.read();
            let refill = StoreRefill {
                state: &state,
                keep_history: store.config.keep_all_versions,
            };
            let updates = self.tracker.process(event, &refill)?;
            if !updates.is_empty() {
                store.sink.record(MetricsEvent::UpdatesEmitted {
                    model: state.model_name(),
                    count: updates.len() as u64,
                });
            }

            updates
        };

        Ok(self.deliver(updates))
    }

    fn deliver(&self, updates: Vec<Update>) -> bool {
        updates
            .into_iter()
            .all(|update| self.out.send(update).is_ok())
    }
}
