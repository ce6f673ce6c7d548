use fxhash::FxHashMap;

use super::apv::{GemApv, StripHit};
use super::error::ApvError;
use super::hardware_id::PlaneHandle;

/// GemFec is a front end controller and the APVs read out through it.
///
/// FECs share nothing with each other, so a whole FEC can be handed to a worker thread
/// for the correction pass of an event.
#[derive(Debug, Clone)]
pub struct GemFec {
    id: u32,
    ip: String,
    apvs: Vec<GemApv>,
    adc_map: FxHashMap<u32, usize>,
}

impl GemFec {
    pub fn new(id: u32, ip: &str) -> Self {
        Self {
            id,
            ip: ip.to_string(),
            apvs: Vec::new(),
            adc_map: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Add an APV and return its index in this FEC. The caller guarantees the ADC channel is free.
    pub fn add_apv(&mut self, apv: GemApv) -> usize {
        let index = self.apvs.len();
        self.adc_map.insert(apv.address().adc_ch, index);
        self.apvs.push(apv);
        index
    }

    pub fn apv_index(&self, adc_ch: u32) -> Option<usize> {
        self.adc_map.get(&adc_ch).copied()
    }

    pub fn apv(&self, index: usize) -> Option<&GemApv> {
        self.apvs.get(index)
    }

    pub fn apv_mut(&mut self, index: usize) -> Option<&mut GemApv> {
        self.apvs.get_mut(index)
    }

    pub fn apvs(&self) -> &[GemApv] {
        &self.apvs
    }

    pub fn apvs_mut(&mut self) -> &mut [GemApv] {
        &mut self.apvs
    }

    pub fn clear(&mut self) {
        for apv in self.apvs.iter_mut() {
            apv.clear();
        }
    }

    /// Fill, correct, and zero suppress the APVs that have data this event.
    ///
    /// Each entry of `batch` is an APV index and its raw words. Overflowing APVs are
    /// returned as errors and left empty; the others are unaffected.
    pub fn process_raw(&mut self, batch: &[(usize, &[u32])]) -> Vec<ApvError> {
        let mut errors = Vec::new();
        for (index, words) in batch.iter() {
            if let Some(apv) = self.apvs.get_mut(*index) {
                if let Err(e) = apv.process_raw(words) {
                    errors.push(e);
                }
            }
        }
        errors
    }

    /// Hits of every APV of this FEC, tagged with the plane they belong to
    pub fn collect_hits(&self) -> Vec<(PlaneHandle, StripHit)> {
        let mut hits = Vec::new();
        for apv in self.apvs.iter() {
            let Some(handle) = apv.plane() else {
                continue;
            };
            hits.extend(apv.collect_hits().into_iter().map(|hit| (handle, hit)));
        }
        hits
    }

    pub fn init_pedestal_histograms(&mut self) {
        for apv in self.apvs.iter_mut() {
            apv.init_pedestal_histograms();
        }
    }

    pub fn release_pedestal_histograms(&mut self) {
        for apv in self.apvs.iter_mut() {
            apv.release_pedestal_histograms();
        }
    }

    /// Fill the raw data of a pedestal event and accumulate it into the histograms
    pub fn fill_pedestal(&mut self, batch: &[(usize, &[u32])]) -> Vec<ApvError> {
        let mut errors = Vec::new();
        for (index, words) in batch.iter() {
            if let Some(apv) = self.apvs.get_mut(*index) {
                match apv.fill_raw_data(words) {
                    Ok(()) => apv.fill_pedestal_histograms(),
                    Err(e) => errors.push(e),
                }
            }
        }
        errors
    }

    /// Fit the pedestals of every APV; returns the number of updated channels
    pub fn fit_pedestals(&mut self) -> usize {
        self.apvs.iter_mut().map(|apv| apv.fit_pedestals()).sum()
    }
}
