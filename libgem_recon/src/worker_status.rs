/// What a worker is doing; the front end styles its progress display after it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStage {
    #[default]
    Reconstruction,
    Pedestal,
    Done,
}

/// Progress message sent from a processing thread to the front end
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub events_processed: u64,
    pub worker_id: usize,
    pub stage: RunStage,
}

impl WorkerStatus {
    pub fn new(progress: f32, events_processed: u64, worker_id: usize, stage: RunStage) -> Self {
        Self {
            progress,
            events_processed,
            worker_id,
            stage,
        }
    }
}
