use std::fmt::Debug;

use log::info;

use crate::core::{
    batch::{Batch, BatchFactory},
    notifier::Notifier,
};

/// Logs every item of the batch when fired. Handy while wiring an engine up.
#[derive(Debug)]
pub struct LoggerBatch<T> {
    items: Vec<T>,
}

impl<T> Default for LoggerBatch<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Batch for LoggerBatch<T>
where
    T: Debug + Send + 'static,
{
    type Item = T;

    fn add(&mut self, item: T) {
        self.items.push(item);
    }

    async fn fire(self, notifier: Notifier) {
        info!(
            "Batch {}: {} records",
            notifier.batch_id(),
            self.items.len()
        );
        self.items.iter().for_each(|item| info!("Record:{:?}", item));
        notifier.done();
    }
}

/// Factory of [`LoggerBatch`]es of `T`.
pub fn factory<T: Debug + Send + 'static>() -> impl BatchFactory<Batch = LoggerBatch<T>> {
    LoggerBatch::<T>::default
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::EngineBuilder;

    #[tokio::test]
    async fn logger_batches_complete() -> anyhow::Result<()> {
        let engine = EngineBuilder::new()
            .name("logger")
            .max_batch_size(2)
            .factory(factory::<&str>())
            .build();

        engine.start()?;
        for item in ["a", "b", "c"] {
            engine.add(item).await?;
        }
        let execution = engine.stop().await?;

        assert_eq!(execution.items_added, 3);
        assert_eq!(execution.batches_fired, 2);
        assert_eq!(engine.in_flight(), 0);
        Ok(())
    }
}
