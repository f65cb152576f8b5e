use log::{debug, warn};
use tokio::sync::{OwnedSemaphorePermit, watch};
use uuid::Uuid;

/// Counts the batches handed to [`Batch::fire`](super::batch::Batch::fire) that
/// have not completed their notifier yet.
#[derive(Clone, Debug)]
pub(crate) struct DispatchTracker {
    outstanding: watch::Sender<usize>,
}

impl DispatchTracker {
    pub(crate) fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self { outstanding }
    }

    /// Registers one more batch in flight and returns its notifier.
    pub(crate) fn dispatch(&self, permit: Option<OwnedSemaphorePermit>) -> Notifier {
        self.outstanding.send_modify(|count| *count += 1);
        Notifier {
            batch_id: Uuid::new_v4(),
            tracker: self.clone(),
            _permit: permit,
            completed: false,
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Waits until every dispatched batch has completed.
    pub(crate) async fn drained(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel can't close under us.
        let _ = receiver.wait_for(|count| *count == 0).await;
    }

    fn complete(&self) {
        self.outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// One-shot completion signal handed to [`Batch::fire`](super::batch::Batch::fire).
///
/// [`done`](Notifier::done) takes the notifier by value, so it can't be called
/// twice. A notifier dropped without `done` (for example because `fire` panicked)
/// still counts as completed; the engine logs a warning so the omission is visible.
#[derive(Debug)]
pub struct Notifier {
    batch_id: Uuid,
    tracker: DispatchTracker,
    /// Dispatch slot, when the engine limits concurrent batches.
    _permit: Option<OwnedSemaphorePermit>,
    completed: bool,
}

impl Notifier {
    /// Identifier of the batch this notifier belongs to.
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Tells the engine the batch has been processed.
    pub fn done(mut self) {
        self.completed = true;
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if self.completed {
            debug!("Batch {} done", self.batch_id);
        } else {
            warn!("Batch {} dropped its notifier without calling done", self.batch_id);
        }
        self.tracker.complete();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::Semaphore;

    use super::*;

    #[test]
    fn done_decrements_outstanding() {
        let tracker = DispatchTracker::new();

        let first = tracker.dispatch(None);
        let second = tracker.dispatch(None);
        assert_eq!(tracker.outstanding(), 2);
        assert_ne!(first.batch_id(), second.batch_id());

        first.done();
        assert_eq!(tracker.outstanding(), 1);

        second.done();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn dropped_notifier_counts_as_completed() {
        let tracker = DispatchTracker::new();

        let notifier = tracker.dispatch(None);
        drop(notifier);

        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn done_releases_dispatch_slot() {
        let tracker = DispatchTracker::new();
        let slots = Arc::new(Semaphore::new(1));

        let permit = slots.clone().try_acquire_owned().ok();
        let notifier = tracker.dispatch(permit);
        assert_eq!(slots.available_permits(), 0);

        notifier.done();
        assert_eq!(slots.available_permits(), 1);
    }

    #[tokio::test]
    async fn drained_returns_immediately_when_idle() {
        let tracker = DispatchTracker::new();

        tokio::time::timeout(Duration::from_millis(100), tracker.drained())
            .await
            .expect("idle tracker should be drained");
    }

    #[tokio::test]
    async fn drained_waits_for_last_notifier() {
        let tracker = DispatchTracker::new();
        let notifier = tracker.dispatch(None);

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.drained().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        notifier.done();
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("drained should resolve after done")
            .expect("waiter task panicked");
    }
}
