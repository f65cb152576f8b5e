#![cfg_attr(docsrs, feature(doc_cfg))]
//#![warn(missing_docs)]

/*!
 # Batch Muster

 An auto-batching engine for Tokio applications. Producers submit items one at a
 time; the engine groups them into batches and hands each batch to your code as
 soon as it is **full** (`max_batch_size` items) or **old enough** (`batch_timeout`
 elapsed since its first item), whichever comes first.

 It is meant for callers who want to amortize per-operation overhead (network
 calls, disk writes, external APIs) by coalescing many small operations into
 fewer large ones, without writing the timer, size and shutdown bookkeeping
 themselves.

 ## Core Concepts

- **Batch:** the accumulator you implement. The engine calls `add` for every item
  and `fire` once, on its own task, when the batch is dispatched.
- **BatchFactory:** produces a fresh empty `Batch` each time a new batch begins.
  Any `Fn() -> B` closure is a factory.
- **Notifier:** the one-shot signal `fire` completes with `done()` once the batch
  has been processed.
- **Engine:** owns the intake queue and the current batch, applies the size and
  time triggers, and drains everything on `stop`.

 ## Lifecycle

 `NotStarted → Running → Stopping → Stopped`. An engine is started once and
 stopped once. `stop` flushes the pending batch, even an undersized one, and
 returns only when every fired batch has completed its notifier.

 ## Features

| **Feature** | **Description**                                            |
|-------------|------------------------------------------------------------|
| logger      | Enables `LoggerBatch`, a batch logging its items           |
| full        | Enables all available features                             |

 ## Getting Started

```rust
use batch_muster::{
    core::{batch::Batch, engine::EngineBuilder, notifier::Notifier},
    BatchError,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

struct Trip {
    items: Vec<String>,
    delivery: UnboundedSender<Vec<String>>,
}

impl Batch for Trip {
    type Item = String;

    fn add(&mut self, item: String) {
        self.items.push(item);
    }

    async fn fire(self, notifier: Notifier) {
        let _ = self.delivery.send(self.items);
        notifier.done();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BatchError> {
    let (delivery, mut trips) = tokio::sync::mpsc::unbounded_channel();

    let engine = EngineBuilder::new()
        .name("shopping")
        .max_batch_size(3)
        .batch_timeout(Duration::from_millis(20))
        .pending_capacity(100)
        .factory(move || Trip { items: Vec::new(), delivery: delivery.clone() })
        .build();

    engine.start()?;
    for item in ["milk", "yogurt", "butter", "bread"] {
        engine.add(item.to_string()).await?;
    }
    engine.stop().await?;

    assert_eq!(trips.recv().await.unwrap(), ["milk", "yogurt", "butter"]);
    assert_eq!(trips.recv().await.unwrap(), ["bread"]);
    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module: batch capabilities, configuration and the engine
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Ready-made batches (for example: a batch delivering to a channel)
pub mod item;
