use fxhash::{FxHashMap, FxHashSet};
use rayon::prelude::*;

use super::apv::{GemApv, StripHit};
use super::cluster::{GemCluster2D, StripClusterer};
use super::config::{ApvProcessing, Config, MatchConfig};
use super::detector::GemDetector;
use super::error::{ApvError, ConfigError, LookupMiss};
use super::event::{GemEvent, RawApvData, StripHitRecord};
use super::fec::GemFec;
use super::hardware_id::{ApvAddress, PlaneHandle, PlaneKind};
use super::pedestal::PedestalTable;

/// Running counters over the events seen by a [GemSystem]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    pub events: u64,
    pub strip_hits: u64,
    pub clusters_1d: u64,
    pub clusters_2d: u64,
    pub lookup_misses: u64,
    pub buffer_overflows: u64,
}

impl std::fmt::Display for EventStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "events: {} strip hits: {} 1-D clusters: {} 2-D clusters: {} lookup misses: {} buffer overflows: {}",
            self.events,
            self.strip_hits,
            self.clusters_1d,
            self.clusters_2d,
            self.lookup_misses,
            self.buffer_overflows
        )
    }
}

/// GemSystem owns every detector and FEC of the setup and runs the reconstruction of an event.
///
/// It is built once from a [Config]. Building checks every hardware reference, so that
/// event processing never meets a configuration problem: at that point a hit with an
/// unknown address is a lookup miss, logged and dropped.
#[derive(Debug)]
pub struct GemSystem {
    processing: ApvProcessing,
    match_params: MatchConfig,
    clusterer: StripClusterer,
    detectors: Vec<GemDetector>,
    fecs: Vec<GemFec>,
    apv_lookup: FxHashMap<ApvAddress, (usize, usize)>,
    plane_lookup: FxHashMap<String, PlaneHandle>,
    projection_z: Option<f32>,
    pedestal_mode: bool,
    stats: EventStats,
}

impl GemSystem {
    /// Build the system from configuration.
    ///
    /// Fails if a name or a hardware address is defined twice, if an APV references an
    /// unknown FEC or plane, or if a detector cannot be built. APVs plugged beyond the
    /// connectors of their plane are kept but never connected.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut detectors = Vec::with_capacity(config.detectors.len());
        let mut plane_lookup: FxHashMap<String, PlaneHandle> = FxHashMap::default();
        let mut det_names: FxHashSet<String> = FxHashSet::default();
        for (id, det_config) in config.detectors.iter().enumerate() {
            if !det_names.insert(det_config.name.clone()) {
                return Err(ConfigError::DuplicateName(det_config.name.clone()));
            }
            let detector = GemDetector::new(id, det_config, config.clustering.strip_pitch)?;
            for plane in detector.planes() {
                let handle = PlaneHandle {
                    detector: id,
                    kind: plane.kind(),
                };
                if plane_lookup.insert(plane.name().to_string(), handle).is_some() {
                    return Err(ConfigError::DuplicateName(plane.name().to_string()));
                }
            }
            detectors.push(detector);
        }

        let mut fecs: Vec<GemFec> = Vec::with_capacity(config.fecs.len());
        let mut fec_lookup: FxHashMap<u32, usize> = FxHashMap::default();
        for fec_config in config.fecs.iter() {
            if fec_lookup.insert(fec_config.id, fecs.len()).is_some() {
                return Err(ConfigError::DuplicateFec(fec_config.id));
            }
            fecs.push(GemFec::new(fec_config.id, &fec_config.ip));
        }

        let mut system = Self {
            processing: config.apv.clone(),
            match_params: config.matching.clone(),
            clusterer: StripClusterer::new(&config.clustering),
            detectors,
            fecs,
            apv_lookup: FxHashMap::default(),
            plane_lookup,
            projection_z: None,
            pedestal_mode: false,
            stats: EventStats::default(),
        };
        if config.matching.project_to_second {
            system.projection_z = system.detectors.get(1).map(|d| d.z());
        }

        for apv_config in config.apvs.iter() {
            let addr = ApvAddress::new(apv_config.fec, apv_config.adc);
            let Some(fec_index) = fec_lookup.get(&apv_config.fec).copied() else {
                return Err(ConfigError::UndefinedFec(addr, apv_config.fec));
            };
            let Some(handle) = system.plane_lookup.get(&apv_config.plane).copied() else {
                return Err(ConfigError::UndefinedPlane(addr, apv_config.plane.clone()));
            };
            if system.apv_lookup.contains_key(&addr) {
                return Err(ConfigError::DuplicateApv(addr));
            }
            let apv = GemApv::new(apv_config, &system.processing);
            let apv_index = system.fecs[fec_index].add_apv(apv);
            system.apv_lookup.insert(addr, (fec_index, apv_index));
            if let Err(miss) = system.connect_apv(fec_index, apv_index, handle) {
                spdlog::warn!("{miss}");
            }
        }

        if let Some(path) = &config.pedestal_path {
            let table = PedestalTable::read(path)?;
            let misses = system.apply_pedestals(&table);
            spdlog::info!(
                "Loaded pedestals for {} APVs from {}",
                table.len() - misses,
                path.to_string_lossy()
            );
        }

        spdlog::info!(
            "GEM system built with {} detectors, {} FECs, and {} APVs",
            system.detectors.len(),
            system.fecs.len(),
            system.apv_lookup.len()
        );
        Ok(system)
    }

    fn connect_apv(
        &mut self,
        fec_index: usize,
        apv_index: usize,
        handle: PlaneHandle,
    ) -> Result<(), LookupMiss> {
        let plane = self.detectors[handle.detector].plane(handle.kind);
        let connectors = plane.connectors();
        let orientation = plane.orientation();
        let plane_name = plane.name().to_string();
        let Some(apv) = self.fecs[fec_index].apv_mut(apv_index) else {
            return Err(LookupMiss::UnknownApv(ApvAddress::default()));
        };
        if apv.plane_index() >= connectors {
            apv.disconnect();
            return Err(LookupMiss::NotEnoughConnectors {
                addr: apv.address(),
                plane: plane_name,
                index: apv.plane_index(),
                connectors,
            });
        }
        apv.connect(handle, orientation, connectors);
        Ok(())
    }

    /// Move an APV to another plane. Only the association and the strip maps change.
    pub fn reconnect_apv(&mut self, addr: ApvAddress, plane_name: &str) -> Result<(), LookupMiss> {
        let (fec_index, apv_index) = self.locate(addr)?;
        let Some(handle) = self.plane_lookup.get(plane_name).copied() else {
            return Err(LookupMiss::Unconnected(addr));
        };
        self.connect_apv(fec_index, apv_index, handle)
    }

    fn locate(&self, addr: ApvAddress) -> Result<(usize, usize), LookupMiss> {
        self.apv_lookup
            .get(&addr)
            .copied()
            .ok_or(LookupMiss::UnknownApv(addr))
    }

    pub fn get_apv(&self, addr: ApvAddress) -> Option<&GemApv> {
        let (fec_index, apv_index) = self.locate(addr).ok()?;
        self.fecs[fec_index].apv(apv_index)
    }

    pub fn get_apv_mut(&mut self, addr: ApvAddress) -> Option<&mut GemApv> {
        let (fec_index, apv_index) = self.locate(addr).ok()?;
        self.fecs[fec_index].apv_mut(apv_index)
    }

    pub fn plane_handle(&self, plane_name: &str) -> Option<PlaneHandle> {
        self.plane_lookup.get(plane_name).copied()
    }

    pub fn detectors(&self) -> &[GemDetector] {
        &self.detectors
    }

    pub fn fecs(&self) -> &[GemFec] {
        &self.fecs
    }

    pub fn n_apvs(&self) -> usize {
        self.apv_lookup.len()
    }

    pub fn match_params(&self) -> &MatchConfig {
        &self.match_params
    }

    pub fn stats(&self) -> &EventStats {
        &self.stats
    }

    /// 2-D clusters of the current event, one list per detector
    pub fn clusters_2d(&self) -> Vec<Vec<GemCluster2D>> {
        self.detectors.iter().map(|d| d.clusters().to_vec()).collect()
    }

    /// Depths of the detectors, in detector order
    pub fn detector_z(&self) -> Vec<f32> {
        self.detectors.iter().map(|d| d.z()).collect()
    }

    /// Apply a pedestal table. Returns the number of table entries naming unknown APVs.
    pub fn apply_pedestals(&mut self, table: &PedestalTable) -> usize {
        let mut misses = 0;
        for (addr, pedestals) in table.iter() {
            match self.get_apv_mut(addr) {
                Some(apv) => apv.set_pedestals(pedestals),
                None => {
                    spdlog::warn!("{}", LookupMiss::UnknownApv(addr));
                    misses += 1;
                }
            }
        }
        misses
    }

    /// Current pedestals of every APV
    pub fn pedestal_table(&self) -> PedestalTable {
        let mut table = PedestalTable::default();
        for apv in self.fecs.iter().flat_map(|f| f.apvs()) {
            table.insert(apv.address(), apv.pedestals().to_vec());
        }
        table
    }

    /// In pedestal mode events only accumulate pedestal histograms
    pub fn set_pedestal_mode(&mut self, enabled: bool) {
        if enabled == self.pedestal_mode {
            return;
        }
        self.pedestal_mode = enabled;
        for fec in self.fecs.iter_mut() {
            if enabled {
                fec.init_pedestal_histograms();
            } else {
                fec.release_pedestal_histograms();
            }
        }
    }

    pub fn is_pedestal_mode(&self) -> bool {
        self.pedestal_mode
    }

    /// Fit the accumulated pedestal histograms; returns the number of updated channels
    pub fn fit_pedestals(&mut self) -> usize {
        self.fecs.iter_mut().map(|f| f.fit_pedestals()).sum()
    }

    /// Drop the hits and clusters of the previous event
    pub fn clear_event(&mut self) {
        for detector in self.detectors.iter_mut() {
            detector.clear();
        }
        for fec in self.fecs.iter_mut() {
            fec.clear();
        }
    }

    /// Process one event: raw APV data, zero suppressed strips, clustering and 2-D combination.
    ///
    /// In pedestal mode the raw data only feeds the pedestal histograms.
    pub fn process_event(&mut self, event: &GemEvent) {
        self.clear_event();
        self.stats.events += 1;
        if self.pedestal_mode {
            self.accumulate_pedestals(&event.raw);
            return;
        }
        self.process_raw_data(&event.raw);
        self.add_strip_hits(&event.zero_suppressed);
        self.reconstruct();
    }

    /// Route raw payloads to their FEC. Unknown APVs are lookup misses.
    fn sort_raw_data<'a>(&mut self, raw: &'a [RawApvData]) -> Vec<Vec<(usize, &'a [u32])>> {
        let mut batches: Vec<Vec<(usize, &[u32])>> = vec![Vec::new(); self.fecs.len()];
        for data in raw.iter() {
            let addr = ApvAddress::new(data.fec_id, data.adc_ch);
            match self.locate(addr) {
                Ok((fec_index, apv_index)) => {
                    batches[fec_index].push((apv_index, data.words.as_slice()))
                }
                Err(miss) => self.record_miss(miss),
            }
        }
        batches
    }

    fn record_miss(&mut self, miss: LookupMiss) {
        spdlog::debug!("Dropping hit: {miss}");
        self.stats.lookup_misses += 1;
    }

    fn record_overflows(&mut self, errors: Vec<ApvError>) {
        for e in errors {
            spdlog::warn!("Dropping APV data: {e}");
            self.stats.buffer_overflows += 1;
        }
    }

    /// Correct and zero suppress the raw data of every FEC, then hand the hits to the planes.
    ///
    /// The correction pass runs per FEC, in parallel if configured. Planes are only filled
    /// once every FEC is done, since one plane can be fed by several FECs.
    pub fn process_raw_data(&mut self, raw: &[RawApvData]) {
        let batches = self.sort_raw_data(raw);
        let results: Vec<(Vec<ApvError>, Vec<(PlaneHandle, StripHit)>)> = if self.processing.parallel
        {
            self.fecs
                .par_iter_mut()
                .zip(batches.par_iter())
                .map(|(fec, batch)| {
                    let errors = fec.process_raw(batch);
                    (errors, fec.collect_hits())
                })
                .collect()
        } else {
            self.fecs
                .iter_mut()
                .zip(batches.iter())
                .map(|(fec, batch)| {
                    let errors = fec.process_raw(batch);
                    (errors, fec.collect_hits())
                })
                .collect()
        };

        for (errors, hits) in results {
            self.record_overflows(errors);
            for (handle, hit) in hits {
                if self.detectors[handle.detector]
                    .plane_mut(handle.kind)
                    .add_strip_hit(hit.strip, &hit.samples)
                {
                    self.stats.strip_hits += 1;
                }
            }
        }
    }

    /// Add hits that were zero suppressed upstream
    pub fn add_strip_hits(&mut self, records: &[StripHitRecord]) {
        for record in records.iter() {
            match self.resolve_strip(record) {
                Ok(Some((handle, strip))) => {
                    if self.detectors[handle.detector]
                        .plane_mut(handle.kind)
                        .add_strip_hit(strip, &record.samples)
                    {
                        self.stats.strip_hits += 1;
                    }
                }
                Ok(None) => (),
                Err(miss) => self.record_miss(miss),
            }
        }
    }

    /// Plane and plane strip of a record; None for masked APVs
    fn resolve_strip(
        &self,
        record: &StripHitRecord,
    ) -> Result<Option<(PlaneHandle, i32)>, LookupMiss> {
        let addr = ApvAddress::new(record.fec_id, record.adc_ch);
        let (fec_index, apv_index) = self.locate(addr)?;
        let apv = self.fecs[fec_index]
            .apv(apv_index)
            .ok_or(LookupMiss::UnknownApv(addr))?;
        if apv.is_masked() {
            return Ok(None);
        }
        let handle = apv.plane().ok_or(LookupMiss::Unconnected(addr))?;
        let strip = apv
            .plane_strip(record.channel as usize)
            .ok_or(LookupMiss::BadChannel(addr, record.channel))?;
        Ok(Some((handle, strip)))
    }

    /// Cluster every plane and combine the planes of every detector
    pub fn reconstruct(&mut self) {
        for detector in self.detectors.iter_mut() {
            detector.form_plane_clusters(&self.clusterer);
            detector.form_2d_clusters(&self.match_params, self.projection_z);
            self.stats.clusters_1d += detector
                .planes()
                .iter()
                .map(|p| p.clusters().len() as u64)
                .sum::<u64>();
            self.stats.clusters_2d += detector.clusters().len() as u64;
        }
    }

    fn accumulate_pedestals(&mut self, raw: &[RawApvData]) {
        let batches = self.sort_raw_data(raw);
        let errors: Vec<ApvError> = if self.processing.parallel {
            self.fecs
                .par_iter_mut()
                .zip(batches.par_iter())
                .flat_map(|(fec, batch)| fec.fill_pedestal(batch))
                .collect()
        } else {
            self.fecs
                .iter_mut()
                .zip(batches.iter())
                .flat_map(|(fec, batch)| fec.fill_pedestal(batch))
                .collect()
        };
        self.record_overflows(errors);
    }

    /// Names of the X and Y planes of a detector
    pub fn plane_names(&self, detector: usize) -> Option<(&str, &str)> {
        let det = self.detectors.get(detector)?;
        Some((
            det.plane(PlaneKind::X).name(),
            det.plane(PlaneKind::Y).name(),
        ))
    }
}
