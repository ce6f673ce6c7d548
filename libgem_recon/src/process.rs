use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use super::cluster::GemCluster2D;
use super::config::Config;
use super::error::ProcessorError;
use super::event::GemEvent;
use super::matcher::{CaloMatcher, MatchedHit};
use super::pedestal::PedestalTable;
use super::system::GemSystem;
use super::worker_status::{RunStage, WorkerStatus};

/// Fraction of the run between two progress messages
const PROGRESS_STEP: f32 = 0.01;

/// Reconstruction output of one event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub event_number: u64,
    /// 2-D clusters, one list per detector
    pub clusters: Vec<Vec<GemCluster2D>>,
    pub matches: Vec<MatchedHit>,
}

/// Sends a status message every time another step of the run is done
struct ProgressReporter<'a> {
    tx: &'a Sender<WorkerStatus>,
    worker_id: usize,
    stage: RunStage,
    total: usize,
    flush_val: usize,
    count: usize,
}

impl<'a> ProgressReporter<'a> {
    fn new(tx: &'a Sender<WorkerStatus>, worker_id: usize, stage: RunStage, total: usize) -> Self {
        let flush_val = ((total as f32 * PROGRESS_STEP) as usize).max(1);
        Self {
            tx,
            worker_id,
            stage,
            total,
            flush_val,
            count: 0,
        }
    }

    fn start(&self) -> Result<(), ProcessorError> {
        self.tx
            .send(WorkerStatus::new(0.0, 0, self.worker_id, self.stage))?;
        Ok(())
    }

    fn tick(&mut self) -> Result<(), ProcessorError> {
        self.count += 1;
        if self.count % self.flush_val == 0 {
            self.tx.send(WorkerStatus::new(
                self.count as f32 / self.total as f32,
                self.count as u64,
                self.worker_id,
                self.stage,
            ))?;
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), ProcessorError> {
        self.tx.send(WorkerStatus::new(
            1.0,
            self.count as u64,
            self.worker_id,
            self.stage,
        ))?;
        Ok(())
    }
}

/// Reconstruct a run of events and match each one with its calorimeter clusters.
///
/// Per-hit problems never stop the run; they are logged and counted in the system
/// statistics. A matcher invariant violation does stop it.
pub fn process_events(
    system: &mut GemSystem,
    events: &[GemEvent],
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<Vec<EventResult>, ProcessorError> {
    if system.is_pedestal_mode() {
        spdlog::warn!("Processing events with the system in pedestal mode; leaving pedestal mode");
        system.set_pedestal_mode(false);
    }
    let mut matcher = CaloMatcher::new(system.match_params(), system.detectors().len());
    let mut progress = ProgressReporter::new(tx, worker_id, RunStage::Reconstruction, events.len());
    let mut results = Vec::with_capacity(events.len());

    spdlog::info!("Reconstructing {} events...", events.len());
    progress.start()?;
    for event in events.iter() {
        system.process_event(event);
        let clusters = system.clusters_2d();
        let matches = if event.calorimeter.is_empty() {
            Vec::new()
        } else {
            matcher.match_event(&event.calorimeter, clusters.clone())?
        };
        results.push(EventResult {
            event_number: event.event_number,
            clusters,
            matches,
        });
        progress.tick()?;
    }
    progress.finish()?;
    spdlog::info!("Done reconstructing. {}", system.stats());
    Ok(results)
}

/// Accumulate the raw data of a pedestal run and fit new pedestals.
///
/// The fitted pedestals are applied to the system and returned as a table.
pub fn process_pedestal_run(
    system: &mut GemSystem,
    events: &[GemEvent],
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<PedestalTable, ProcessorError> {
    let mut progress = ProgressReporter::new(tx, worker_id, RunStage::Pedestal, events.len());
    system.set_pedestal_mode(true);

    spdlog::info!("Accumulating pedestals over {} events...", events.len());
    progress.start()?;
    for event in events.iter() {
        system.process_event(event);
        progress.tick()?;
    }
    let n_fitted = system.fit_pedestals();
    system.set_pedestal_mode(false);
    progress.finish()?;
    spdlog::info!("Fitted pedestals of {} channels.", n_fitted);
    Ok(system.pedestal_table())
}

/// The function to be called by a separate thread (typically the UI).
/// Builds the system from the config and reconstructs every event.
pub fn process(
    config: Config,
    events: Vec<GemEvent>,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<Vec<EventResult>, ProcessorError> {
    let mut system = GemSystem::new(&config)?;
    let results = process_events(&mut system, &events, &tx, worker_id)?;
    tx.send(WorkerStatus::new(
        1.0,
        events.len() as u64,
        worker_id,
        RunStage::Done,
    ))?;
    Ok(results)
}

/// Thread entry point of a pedestal run
pub fn process_pedestals(
    config: Config,
    events: Vec<GemEvent>,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<PedestalTable, ProcessorError> {
    let mut system = GemSystem::new(&config)?;
    let table = process_pedestal_run(&mut system, &events, &tx, worker_id)?;
    tx.send(WorkerStatus::new(
        1.0,
        events.len() as u64,
        worker_id,
        RunStage::Done,
    ))?;
    Ok(table)
}
