#![allow(dead_code)]

mod mocks;

pub use mocks::MockFactory;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use batch_muster::core::{batch::Batch, notifier::Notifier};
use tokio::sync::Semaphore;

/// Batches delivered so far, in completion order.
#[derive(Clone, Default)]
pub struct Deliveries(Arc<Mutex<Vec<Vec<String>>>>);

impl Deliveries {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn items(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }

    fn push(&self, batch: Vec<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
    }
}

/// Records its items into [`Deliveries`] when fired.
pub struct RecordingBatch {
    items: Vec<String>,
    deliveries: Deliveries,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingBatch {
    pub fn new(deliveries: Deliveries) -> Self {
        Self {
            items: Vec::new(),
            deliveries,
            delay: Duration::ZERO,
            gate: None,
        }
    }

    /// Sleeps `delay` before recording.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Waits for a permit of `gate` before recording.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl Batch for RecordingBatch {
    type Item = String;

    fn add(&mut self, item: String) {
        self.items.push(item);
    }

    async fn fire(self, notifier: Notifier) {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.deliveries.push(self.items);
        notifier.done();
    }
}

pub fn recording(deliveries: &Deliveries) -> impl Fn() -> RecordingBatch + Send + Sync + 'static {
    let deliveries = deliveries.clone();
    move || RecordingBatch::new(deliveries.clone())
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
