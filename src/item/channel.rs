//! # Channel batches
//!
//! Batches that collect their items into a `Vec` and deliver it, once fired,
//! to a Tokio channel. The receiving side decides what a delivered batch means
//! (persist it, send it over the network, ...).
//!
//! ```rust
//! use batch_muster::core::engine::EngineBuilder;
//! use batch_muster::item::channel::ChannelBatchFactory;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), batch_muster::BatchError> {
//! let (delivery, mut batches) = tokio::sync::mpsc::channel(4);
//!
//! let engine = EngineBuilder::new()
//!     .max_batch_size(10)
//!     .factory(ChannelBatchFactory::new(delivery))
//!     .build();
//!
//! engine.start()?;
//! engine.add(42u64).await?;
//! engine.stop().await?;
//!
//! assert_eq!(batches.recv().await, Some(vec![42]));
//! # Ok(())
//! # }
//! ```

use log::warn;
use tokio::sync::mpsc::Sender;

use crate::core::{
    batch::{Batch, BatchFactory},
    notifier::Notifier,
};

/// Collects items and delivers them as one `Vec` when fired.
#[derive(Debug)]
pub struct ChannelBatch<T> {
    items: Vec<T>,
    delivery: Sender<Vec<T>>,
}

impl<T> ChannelBatch<T> {
    pub fn new(delivery: Sender<Vec<T>>) -> Self {
        Self {
            items: Vec::new(),
            delivery,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T: Send + 'static> Batch for ChannelBatch<T> {
    type Item = T;

    fn add(&mut self, item: T) {
        self.items.push(item);
    }

    /// Waits for room in the delivery channel. A closed channel drops the batch.
    async fn fire(self, notifier: Notifier) {
        if let Err(error) = self.delivery.send(self.items).await {
            warn!(
                "Batch {} of {} items not delivered: {}",
                notifier.batch_id(),
                error.0.len(),
                error
            );
        }
        notifier.done();
    }
}

/// Builds [`ChannelBatch`]es delivering to the same channel.
#[derive(Debug, Clone)]
pub struct ChannelBatchFactory<T> {
    delivery: Sender<Vec<T>>,
}

impl<T> ChannelBatchFactory<T> {
    pub fn new(delivery: Sender<Vec<T>>) -> Self {
        Self { delivery }
    }
}

impl<T: Send + 'static> BatchFactory for ChannelBatchFactory<T> {
    type Batch = ChannelBatch<T>;

    fn make_batch(&self) -> ChannelBatch<T> {
        ChannelBatch::new(self.delivery.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::core::engine::EngineBuilder;

    #[test]
    fn factory_makes_independent_batches() {
        let (delivery, _batches) = mpsc::channel::<Vec<&str>>(1);
        let factory = ChannelBatchFactory::new(delivery);

        let mut first = factory.make_batch();
        first.add("a");
        let second = factory.make_batch();

        assert_eq!(first.items(), &["a"]);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn closed_delivery_still_completes_the_batch() -> anyhow::Result<()> {
        let (delivery, batches) = mpsc::channel::<Vec<u8>>(1);
        drop(batches);

        let engine = EngineBuilder::new()
            .max_batch_size(2)
            .factory(ChannelBatchFactory::new(delivery))
            .build();
        engine.start()?;
        engine.add(1).await?;
        engine.add(2).await?;

        let execution = tokio::time::timeout(Duration::from_millis(500), engine.stop()).await??;
        assert_eq!(execution.batches_fired, 1);
        assert_eq!(engine.in_flight(), 0);
        Ok(())
    }
}
