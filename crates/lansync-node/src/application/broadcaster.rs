//! State broadcaster: the push channel towards the presentation layer.
//!
//! Built on a `tokio::sync::watch` channel.  A watch channel keeps only the
//! latest value, which is exactly the semantics a UI wants: if three state
//! changes happen while the UI is busy it should render the newest snapshot
//! once, not replay all three.
//!
//! Publishing a snapshot identical to the current one is a no-op, so
//! subscribers wake only on real changes.

use tokio::sync::watch;

use lansync_core::StateSnapshot;

#[derive(Debug)]
pub struct StateBroadcaster {
    tx: watch::Sender<StateSnapshot>,
}

impl StateBroadcaster {
    pub fn new(initial: StateSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publishes `snapshot`.  Returns `true` if subscribers were notified.
    ///
    /// Works with zero subscribers; the value is retained for later ones.
    pub fn publish(&self, snapshot: StateSnapshot) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        })
    }

    /// A receiver positioned at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.tx.subscribe()
    }

    /// Clone of the most recently published snapshot.
    pub fn latest(&self) -> StateSnapshot {
        self.tx.borrow().clone()
    }
}
