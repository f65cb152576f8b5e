use std::time::Duration;

use batch_muster::{
    BatchError,
    core::engine::{Engine, EngineBuilder},
    item::channel::ChannelBatchFactory,
};
use log::info;
use tokio::sync::mpsc::{self, Receiver};

/// Manages the shopping list and dispatches shoppers.
struct ShoppingManager {
    engine: Engine<ChannelBatchFactory<String>>,
}

impl ShoppingManager {
    /// `shopper_capacity` is how much a shopper can carry, `trip_timeout` how long
    /// we wait once we need something, `pending_capacity` how long the list can be.
    fn new(
        shopper_capacity: usize,
        trip_timeout: Duration,
        pending_capacity: usize,
    ) -> (Self, Receiver<Vec<String>>) {
        let (delivery, trips) = mpsc::channel(16);
        let engine = EngineBuilder::new()
            .name("shopping")
            .max_batch_size(shopper_capacity)
            .batch_timeout(trip_timeout)
            .pending_capacity(pending_capacity)
            .factory(ChannelBatchFactory::new(delivery))
            .build();
        (Self { engine }, trips)
    }

    fn start(&self) -> Result<(), BatchError> {
        self.engine.start()
    }

    async fn add(&self, item: &str) -> Result<(), BatchError> {
        self.engine.add(item.to_string()).await
    }

    /// Flushes the pending items and waits for shoppers still out.
    async fn stop(&self) -> Result<(), BatchError> {
        self.engine.stop().await.map(|_| ())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let (manager, mut trips) = ShoppingManager::new(3, Duration::from_millis(20), 100);
    let printer = tokio::spawn(async move {
        while let Some(trip) = trips.recv().await {
            println!("Delivery {:?}", trip);
        }
    });

    manager.start()?;

    // Capacity is 3: these end up in a batch as soon as the third one is added.
    manager.add("milk").await?;
    manager.add("yogurt").await?;
    manager.add("butter").await?;

    // Timeout is 20ms: these end up in a batch once we sleep.
    manager.add("bread").await?;
    manager.add("bagels").await?;
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Flushed by stop.
    manager.add("cheese").await?;
    manager.stop().await?;

    // Closing the last sender ends the printer.
    drop(manager);
    printer.await?;
    info!("All trips delivered");

    Ok(())
}
