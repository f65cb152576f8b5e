use std::future::Future;

use super::notifier::Notifier;

/// An accumulator of items that are dispatched together.
///
/// The engine owns a batch while it is being filled and gives it away, by value,
/// to [`Batch::fire`] once a trigger fires. A batch is therefore never touched by
/// two tasks at the same time.
///
/// # Example
///
/// ```rust
/// use batch_muster::core::{batch::Batch, notifier::Notifier};
///
/// #[derive(Default)]
/// struct PrintBatch {
///     lines: Vec<String>,
/// }
///
/// impl Batch for PrintBatch {
///     type Item = String;
///
///     fn add(&mut self, item: String) {
///         self.lines.push(item);
///     }
///
///     async fn fire(self, notifier: Notifier) {
///         println!("{}", self.lines.join("\n"));
///         notifier.done();
///     }
/// }
/// ```
pub trait Batch: Send + 'static {
    /// Type of the items accumulated by this batch.
    type Item: Send + 'static;

    /// Appends one item to the batch.
    fn add(&mut self, item: Self::Item);

    /// Processes the batch.
    ///
    /// Called exactly once per batch, on its own task. Implementations must
    /// complete the notifier on every path, otherwise [`Engine::stop`] waits forever.
    /// Failures are the implementation's business: the engine only observes that
    /// the notifier completed.
    ///
    /// [`Engine::stop`]: crate::core::engine::Engine::stop
    fn fire(self, notifier: Notifier) -> impl Future<Output = ()> + Send;
}

/// Produces fresh, empty batches.
///
/// Any `Fn() -> B` closure is a factory:
///
/// ```rust
/// # use batch_muster::core::batch::BatchFactory;
/// # use batch_muster::item::channel::ChannelBatch;
/// let (tx, _rx) = tokio::sync::mpsc::channel::<Vec<u32>>(8);
/// let factory = move || ChannelBatch::new(tx.clone());
/// let batch = factory.make_batch();
/// assert!(batch.is_empty());
/// ```
pub trait BatchFactory: Send + Sync + 'static {
    /// Batch produced by this factory; its `Item` is what the engine accepts.
    type Batch: Batch;

    /// Returns a new empty batch sharing no mutable state with earlier ones.
    fn make_batch(&self) -> Self::Batch;
}

impl<F, B> BatchFactory for F
where
    F: Fn() -> B + Send + Sync + 'static,
    B: Batch,
{
    type Batch = B;

    fn make_batch(&self) -> B {
        self()
    }
}

/// Item type accepted by the batches of a factory.
pub type ItemOf<F> = <<F as BatchFactory>::Batch as Batch>::Item;
