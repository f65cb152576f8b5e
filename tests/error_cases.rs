mod common;

use std::time::Duration;

use anyhow::Result;
use batch_muster::{
    BatchError,
    core::{
        config::EngineConfig,
        engine::{EngineBuilder, EngineState},
    },
};
use common::{Deliveries, recording, strings};

#[tokio::test]
async fn config_without_trigger_is_rejected_at_start() -> Result<()> {
    let config: EngineConfig = serde_json::from_str(r#"{ "pending_capacity": 10 }"#)?;
    let engine = EngineBuilder::new()
        .config(config)
        .factory(recording(&Deliveries::default()))
        .build();

    let error = engine.start().unwrap_err();
    assert_eq!(error, BatchError::NoTrigger);
    assert_eq!(
        error.to_string(),
        "Configuration: max_batch_size and batch_timeout can't both be zero"
    );
    assert_eq!(engine.state(), EngineState::NotStarted);
    Ok(())
}

#[tokio::test]
async fn config_loaded_from_json_drives_the_engine() -> Result<()> {
    let config: EngineConfig =
        serde_json::from_str(r#"{ "max_batch_size": 2, "batch_timeout_ms": 1000 }"#)?;
    let deliveries = Deliveries::default();
    let engine = EngineBuilder::new()
        .config(config)
        .factory(recording(&deliveries))
        .build();

    engine.start()?;
    engine.add("left".to_string()).await?;
    engine.add("right".to_string()).await?;
    engine.stop().await?;

    assert_eq!(engine.config().batch_timeout, Duration::from_secs(1));
    assert_eq!(deliveries.batches(), vec![strings(&["left", "right"])]);
    Ok(())
}

#[tokio::test]
async fn submission_after_stop_fails_fast() -> Result<()> {
    let deliveries = Deliveries::default();
    let engine = EngineBuilder::new()
        .name("closed")
        .batch_timeout(Duration::from_millis(10))
        .factory(recording(&deliveries))
        .build();

    engine.start()?;
    engine.add("kept".to_string()).await?;
    engine.stop().await?;

    let error = engine.add("lost".to_string()).await.unwrap_err();
    assert_eq!(error, BatchError::NotRunning("closed".to_string()));
    assert_eq!(error.to_string(), "Lifecycle: engine closed is not running");
    assert_eq!(deliveries.items(), strings(&["kept"]));
    Ok(())
}

#[tokio::test]
async fn double_start_and_double_stop_are_rejected() -> Result<()> {
    let engine = EngineBuilder::new()
        .name("twice")
        .max_batch_size(1)
        .factory(recording(&Deliveries::default()))
        .build();

    engine.start()?;
    assert_eq!(
        engine.start(),
        Err(BatchError::AlreadyStarted("twice".to_string()))
    );

    engine.stop().await?;
    assert_eq!(
        engine.stop().await.unwrap_err(),
        BatchError::NotRunning("twice".to_string())
    );
    Ok(())
}

#[test]
fn start_outside_a_runtime_is_a_configuration_error() {
    let engine = EngineBuilder::new()
        .max_batch_size(1)
        .factory(recording(&Deliveries::default()))
        .build();

    assert!(matches!(engine.start(), Err(BatchError::NoRuntime(_))));
}
