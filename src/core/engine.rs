use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use tokio::{
    runtime::Handle,
    sync::{Semaphore, mpsc, watch},
    task::JoinHandle,
    time::{self, sleep_until},
};
use uuid::Uuid;

use crate::BatchError;

use super::{
    batch::{Batch, BatchFactory, ItemOf},
    build_name,
    config::EngineConfig,
    notifier::DispatchTracker,
};

/// Lifecycle of an [`Engine`]. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Configured, not accepting items yet.
    NotStarted,
    /// Accepting items and firing batches.
    Running,
    /// `stop` was called: the last batch is flushed and in-flight batches drained.
    Stopping,
    /// Every batch has completed. The engine can't be restarted.
    Stopped,
}

/// Summary of an engine run, returned by [`Engine::stop`].
#[derive(Debug)]
pub struct EngineExecution {
    /// Identifier of the engine
    pub id: Uuid,
    /// Name of the engine
    pub name: String,
    /// The time when the engine was started
    pub start: Instant,
    /// The time when the last batch completed
    pub end: Instant,
    /// How long the engine ran
    pub duration: Duration,
    /// Number of items received from producers
    pub items_added: usize,
    /// Number of batches handed to `fire`, the final flush included
    pub batches_fired: usize,
}

/// What the accumulation task hands back when the intake closes.
#[derive(Debug, Default, Clone, Copy)]
struct AccumulationReport {
    items_added: usize,
    batches_fired: usize,
}

/// Outcome published by the shutdown task once every batch has completed.
#[derive(Debug, Clone)]
struct Shutdown {
    report: Result<AccumulationReport, BatchError>,
    end: Instant,
}

struct Lifecycle<F: BatchFactory> {
    state: EngineState,
    factory: Option<F>,
    intake: Option<mpsc::Sender<ItemOf<F>>>,
    worker: Option<JoinHandle<AccumulationReport>>,
    started_at: Option<Instant>,
    shutdown: Option<watch::Receiver<Option<Shutdown>>>,
}

fn lock_lifecycle<F: BatchFactory>(
    lifecycle: &Mutex<Lifecycle<F>>,
) -> MutexGuard<'_, Lifecycle<F>> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Groups individually submitted items into batches.
///
/// A batch is fired when it holds `max_batch_size` items or when `batch_timeout`
/// has elapsed since its first item, whichever comes first. Fired batches run on
/// their own Tokio task, so accumulation of the next batch never waits on
/// dispatch. [`stop`](Engine::stop) flushes the pending batch and waits for every
/// fired batch to complete its [`Notifier`](super::notifier::Notifier).
///
/// The engine is meant to be shared: `add` and `stop` take `&self`, so wrap it
/// in an `Arc` to submit from several tasks.
///
/// # Example
///
/// ```rust
/// use batch_muster::core::engine::EngineBuilder;
/// use batch_muster::item::channel::ChannelBatchFactory;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), batch_muster::BatchError> {
/// let (delivery, mut batches) = tokio::sync::mpsc::channel(16);
///
/// let engine = EngineBuilder::new()
///     .name("groceries")
///     .max_batch_size(2)
///     .batch_timeout(Duration::from_millis(20))
///     .factory(ChannelBatchFactory::new(delivery))
///     .build();
///
/// engine.start()?;
/// engine.add("milk").await?;
/// engine.add("eggs").await?;
/// engine.add("flour").await?;
/// let execution = engine.stop().await?;
///
/// assert_eq!(batches.recv().await, Some(vec!["milk", "eggs"]));
/// assert_eq!(batches.recv().await, Some(vec!["flour"]));
/// assert_eq!(execution.batches_fired, 2);
/// # Ok(())
/// # }
/// ```
pub struct Engine<F: BatchFactory> {
    id: Uuid,
    name: String,
    config: EngineConfig,
    tracker: DispatchTracker,
    lifecycle: Arc<Mutex<Lifecycle<F>>>,
}

impl<F: BatchFactory> Engine<F> {
    /// Unique identifier of this engine, used in its log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name given to the builder, or a random one.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    /// Number of fired batches whose notifier hasn't completed yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.outstanding()
    }

    /// Starts accepting items.
    ///
    /// Must be called from within a Tokio runtime: the accumulation task is
    /// spawned on the current one.
    ///
    /// # Errors
    /// - [`BatchError::AlreadyStarted`] if the engine left the `NotStarted` state
    /// - [`BatchError::NoTrigger`] if neither size nor timeout is configured
    /// - [`BatchError::MissingFactory`] if no batch factory was provided
    /// - [`BatchError::NoRuntime`] outside of a Tokio runtime
    pub fn start(&self) -> Result<(), BatchError> {
        let mut lifecycle = self.lock();

        if lifecycle.state != EngineState::NotStarted {
            return Err(BatchError::AlreadyStarted(self.name.clone()));
        }
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|e| BatchError::NoRuntime(e.to_string()))?;
        let factory = lifecycle.factory.take().ok_or(BatchError::MissingFactory)?;

        let (intake, receiver) = mpsc::channel(self.config.channel_capacity());
        let accumulator = Accumulator::new(
            self.name.clone(),
            factory,
            &self.config,
            self.tracker.clone(),
        );

        lifecycle.worker = Some(runtime.spawn(accumulator.run(receiver)));
        lifecycle.intake = Some(intake);
        lifecycle.started_at = Some(Instant::now());
        lifecycle.state = EngineState::Running;

        info!("Start of engine: {}, id: {}", self.name, self.id);

        Ok(())
    }

    /// Submits one item, waiting while the intake queue is full.
    ///
    /// # Errors
    /// [`BatchError::NotRunning`] before `start` or once `stop` has been called.
    pub async fn add(&self, item: ItemOf<F>) -> Result<(), BatchError> {
        let intake = self.intake()?;
        intake.send(item).await.map_err(|_| self.not_running())
    }

    /// Blocking flavour of [`add`](Engine::add) for producers running outside
    /// of async code.
    ///
    /// # Panics
    /// When called from within an asynchronous execution context.
    pub fn add_blocking(&self, item: ItemOf<F>) -> Result<(), BatchError> {
        let intake = self.intake()?;
        intake.blocking_send(item).map_err(|_| self.not_running())
    }

    /// Stops the engine.
    ///
    /// Items already queued are still batched, the last partial batch is flushed,
    /// then the call waits until every fired batch has completed its notifier.
    /// There is no timeout: a batch that never completes its notifier makes
    /// this call wait forever.
    ///
    /// The drain runs on its own task, so dropping this future (for example
    /// under `tokio::time::timeout`) doesn't interrupt it: the engine still
    /// reaches `Stopped`, and calling `stop` again while it is `Stopping`
    /// resumes the wait.
    ///
    /// # Errors
    /// - [`BatchError::NotRunning`] if the engine is neither running nor stopping
    /// - [`BatchError::Worker`] if the accumulation task panicked
    pub async fn stop(&self) -> Result<EngineExecution, BatchError> {
        let (mut shutdown, start) = {
            let mut lifecycle = self.lock();
            if lifecycle.state == EngineState::Running {
                let runtime =
                    Handle::try_current().map_err(|e| BatchError::NoRuntime(e.to_string()))?;
                lifecycle.state = EngineState::Stopping;
                // Dropping our sender closes the intake once in-flight `add` calls finish.
                lifecycle.intake = None;
                let worker = lifecycle.worker.take();
                lifecycle.shutdown = Some(self.spawn_shutdown(&runtime, worker));

                debug!("Stopping engine: {}, id: {}", self.name, self.id);
            }

            match (lifecycle.state, &lifecycle.shutdown) {
                (EngineState::Stopping, Some(shutdown)) => (
                    shutdown.clone(),
                    lifecycle.started_at.unwrap_or_else(Instant::now),
                ),
                _ => return Err(self.not_running()),
            }
        };

        let outcome = shutdown
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone())
            .ok_or_else(|| {
                BatchError::Worker(self.name.clone(), "shutdown task ended early".to_string())
            })?;
        let report = outcome.report?;

        info!(
            "End of engine: {}, id: {}, items: {}, batches: {}",
            self.name, self.id, report.items_added, report.batches_fired
        );

        Ok(EngineExecution {
            id: self.id,
            name: self.name.clone(),
            start,
            end: outcome.end,
            duration: outcome.end.saturating_duration_since(start),
            items_added: report.items_added,
            batches_fired: report.batches_fired,
        })
    }

    /// Waits for the accumulation task and the in-flight batches, then marks
    /// the engine `Stopped` and publishes the outcome.
    fn spawn_shutdown(
        &self,
        runtime: &Handle,
        worker: Option<JoinHandle<AccumulationReport>>,
    ) -> watch::Receiver<Option<Shutdown>> {
        let (publish, shutdown) = watch::channel(None);
        let lifecycle = Arc::clone(&self.lifecycle);
        let tracker = self.tracker.clone();
        let name = self.name.clone();

        runtime.spawn(async move {
            let report = match worker {
                Some(worker) => worker
                    .await
                    .map_err(|e| BatchError::Worker(name, e.to_string())),
                None => Ok(AccumulationReport::default()),
            };
            tracker.drained().await;

            lock_lifecycle(&lifecycle).state = EngineState::Stopped;
            publish.send_replace(Some(Shutdown {
                report,
                end: Instant::now(),
            }));
        });

        shutdown
    }

    fn intake(&self) -> Result<mpsc::Sender<ItemOf<F>>, BatchError> {
        let lifecycle = self.lock();
        match (&lifecycle.state, &lifecycle.intake) {
            (EngineState::Running, Some(intake)) => Ok(intake.clone()),
            _ => Err(self.not_running()),
        }
    }

    fn not_running(&self) -> BatchError {
        BatchError::NotRunning(self.name.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle<F>> {
        lock_lifecycle(&self.lifecycle)
    }
}

impl<F: BatchFactory> Drop for Engine<F> {
    fn drop(&mut self) {
        if self.lock().state == EngineState::Running {
            warn!(
                "Engine {} dropped while running: pending items are flushed but not awaited",
                self.name
            );
        }
    }
}

/// Builder for an [`Engine`].
///
/// ```rust
/// use batch_muster::core::engine::{EngineBuilder, EngineState};
/// use batch_muster::item::channel::ChannelBatchFactory;
///
/// let (delivery, _batches) = tokio::sync::mpsc::channel::<Vec<u64>>(4);
///
/// let engine = EngineBuilder::new()
///     .max_batch_size(500)
///     .pending_capacity(1_000)
///     .max_concurrent_batches(4)
///     .factory(ChannelBatchFactory::new(delivery))
///     .build();
///
/// assert_eq!(engine.state(), EngineState::NotStarted);
/// assert_eq!(engine.config().max_batch_size, 500);
/// ```
pub struct EngineBuilder<F> {
    /// Optional name for the engine (generated randomly if not specified)
    name: Option<String>,
    config: EngineConfig,
    factory: Option<F>,
}

impl<F> Default for EngineBuilder<F> {
    fn default() -> Self {
        Self {
            name: None,
            config: EngineConfig::default(),
            factory: None,
        }
    }
}

impl<F: BatchFactory> EngineBuilder<F> {
    /// Creates a builder with the default configuration and no factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name used in log lines. A random one is generated otherwise.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of items that fires a batch, `0` to disable the size trigger.
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.max_batch_size = max_batch_size;
        self
    }

    /// Age of a batch, from its first item, that fires it. `Duration::ZERO`
    /// disables the time trigger.
    pub fn batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.config.batch_timeout = batch_timeout;
        self
    }

    /// Number of items that may wait in the intake queue before `add` waits.
    pub fn pending_capacity(mut self, pending_capacity: usize) -> Self {
        self.config.pending_capacity = pending_capacity;
        self
    }

    /// Limits how many batches are fired at once. Unbounded by default.
    pub fn max_concurrent_batches(mut self, max_concurrent_batches: usize) -> Self {
        self.config.max_concurrent_batches = Some(max_concurrent_batches);
        self
    }

    /// Sets the factory producing each new batch. Required by `start`.
    pub fn factory(mut self, factory: F) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Builds the engine. The configuration is checked by [`Engine::start`].
    pub fn build(self) -> Engine<F> {
        Engine {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            config: self.config,
            tracker: DispatchTracker::new(),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: EngineState::NotStarted,
                factory: self.factory,
                intake: None,
                worker: None,
                started_at: None,
                shutdown: None,
            })),
        }
    }
}

/// Batch being filled, with the instant its time trigger fires.
struct PendingBatch<B> {
    batch: B,
    len: usize,
    deadline: Option<time::Instant>,
}

/// Sole owner of the current batch while the engine runs.
struct Accumulator<F: BatchFactory> {
    engine: String,
    factory: F,
    size_trigger: Option<usize>,
    time_trigger: Option<Duration>,
    slots: Option<Arc<Semaphore>>,
    tracker: DispatchTracker,
    current: Option<PendingBatch<F::Batch>>,
    report: AccumulationReport,
}

impl<F: BatchFactory> Accumulator<F> {
    fn new(engine: String, factory: F, config: &EngineConfig, tracker: DispatchTracker) -> Self {
        Self {
            engine,
            factory,
            size_trigger: config.size_trigger(),
            time_trigger: config.time_trigger(),
            slots: config
                .dispatch_slots()
                .map(|slots| Arc::new(Semaphore::new(slots))),
            tracker,
            current: None,
            report: AccumulationReport::default(),
        }
    }

    async fn run(mut self, mut intake: mpsc::Receiver<ItemOf<F>>) -> AccumulationReport {
        loop {
            let deadline = self.current.as_ref().and_then(|pending| pending.deadline);

            tokio::select! {
                // The timer goes first so a busy intake can't starve it.
                biased;

                _ = sleep_until(deadline.unwrap_or_else(time::Instant::now)), if deadline.is_some() => {
                    debug!("Engine {}: batch timeout elapsed", self.engine);
                    self.fire().await;
                }
                received = intake.recv() => match received {
                    Some(item) => self.accept(item).await,
                    None => {
                        debug!("Engine {}: intake closed, flushing", self.engine);
                        self.fire().await;
                        break;
                    }
                },
            }
        }

        self.report
    }

    async fn accept(&mut self, item: ItemOf<F>) {
        self.report.items_added += 1;

        let pending = self.current.get_or_insert_with(|| PendingBatch {
            batch: self.factory.make_batch(),
            len: 0,
            // A timeout beyond the clock's range never fires.
            deadline: self
                .time_trigger
                .and_then(|timeout| time::Instant::now().checked_add(timeout)),
        });
        pending.batch.add(item);
        pending.len += 1;

        let full = self.size_trigger.is_some_and(|max| pending.len >= max);
        if full {
            debug!("Engine {}: batch is full", self.engine);
            self.fire().await;
        }
    }

    /// Hands the current batch, if any, to its own dispatch task.
    ///
    /// Taking the batch out of `current` disarms its timer, so a batch can only
    /// be fired once whichever trigger gets here first.
    async fn fire(&mut self) {
        let Some(pending) = self.current.take() else {
            return;
        };

        let permit = match &self.slots {
            Some(slots) => slots.clone().acquire_owned().await.ok(),
            None => None,
        };
        let notifier = self.tracker.dispatch(permit);

        debug!(
            "Engine {}: firing batch {} with {} items",
            self.engine,
            notifier.batch_id(),
            pending.len
        );

        self.report.batches_fired += 1;
        tokio::spawn(pending.batch.fire(notifier));
    }
}
