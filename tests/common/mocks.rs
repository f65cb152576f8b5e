//! Mock version of a BatchFactory;
use mockall::mock;

use batch_muster::core::batch::BatchFactory;

use super::RecordingBatch;

mock! {
    pub Factory {}
    impl BatchFactory for Factory {
        type Batch = RecordingBatch;
        fn make_batch(&self) -> RecordingBatch;
    }
}
