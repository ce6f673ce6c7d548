use bitvec::prelude::*;
use byteorder::{ByteOrder, LittleEndian};
use ndarray::Array2;

use super::config::{ApvConfig, ApvProcessing, Config};
use super::constants::*;
use super::error::ApvError;
use super::hardware_id::{ApvAddress, PlaneHandle, PlaneKind};
use super::pedestal::{Histogram, Pedestal};

/// A channel that passed zero suppression, already mapped onto its plane
#[derive(Debug, Clone, PartialEq)]
pub struct StripHit {
    pub strip: i32,
    pub samples: Vec<f32>,
}

/// Unshuffle one raw 32-bit word into its two 16-bit samples.
///
/// Each half word arrives byte swapped, the first sample lives in the upper half.
#[inline]
pub fn split_raw_word(word: u32) -> (u16, u16) {
    let first = ((word >> 24) & 0xff) | ((word >> 8) & 0xff00);
    let second = ((word >> 8) & 0xff) | ((word << 8) & 0xff00);
    (first as u16, second as u16)
}

/// Map an APV readout channel onto the connector strip and the plane strip.
///
/// The APV multiplexer reads channels out of physical order; the readout index is
/// de-interleaved and then folded about the connector centre. The designated last
/// connector of an X plane is only partially populated and uses a shifted centre and
/// offset. Strips are reversed when the APV is plugged against the plane orientation.
pub fn map_strip(
    channel: usize,
    kind: PlaneKind,
    plane_orientation: i32,
    apv_orientation: i32,
    plane_index: usize,
    connectors: usize,
) -> (i32, i32) {
    let ch = channel as i32;
    let mut strip = 32 * (ch % 4) + 8 * (ch / 4) - 31 * (ch / 16);

    let last_connector = kind == PlaneKind::X && plane_index + 1 == connectors;
    let center = if last_connector {
        LAST_CONNECTOR_FOLD_CENTER
    } else {
        CONNECTOR_FOLD_CENTER
    };
    if strip & 1 == 1 {
        strip = center - (strip + 1) / 2;
    } else {
        strip = center + strip / 2;
    }
    let local_strip = strip & 0x7f;

    let mut placed = local_strip;
    if apv_orientation != plane_orientation {
        placed = APV_STRIP_SIZE as i32 - 1 - placed;
    }
    let mut plane_strip = placed + (plane_index * APV_STRIP_SIZE) as i32;
    if last_connector {
        plane_strip -= LAST_CONNECTOR_SHIFT;
    }
    (local_strip, plane_strip)
}

/// GemApv is a single APV readout chip.
///
/// It owns the raw sample buffer of the chip, its pedestals, and the mask of channels
/// that fired in the current event. Each event the raw words are unshuffled, corrected
/// for pedestal and common mode, and zero suppressed. Hits are reported in plane strip
/// numbers of the plane the APV is plugged into.
#[derive(Debug, Clone)]
pub struct GemApv {
    addr: ApvAddress,
    orientation: i32,
    plane_index: usize,
    header_level: f32,
    split_readout: bool,
    masked: bool,
    time_samples: usize,
    common_mode_threshold: f32,
    zero_suppression_threshold: f32,
    raw_data: Vec<f32>,
    n_filled: usize,
    ts_index: usize,
    pedestals: Vec<Pedestal>,
    corrected: Array2<f32>,
    hit_mask: BitVec,
    plane: Option<PlaneHandle>,
    local_strip_map: Vec<i32>,
    plane_strip_map: Vec<i32>,
    offset_hists: Vec<Histogram>,
    noise_hists: Vec<Histogram>,
}

impl GemApv {
    pub fn new(apv: &ApvConfig, processing: &ApvProcessing) -> Self {
        let capacity = processing.time_samples * TIME_SAMPLE_SIZE + APV_BUFFER_SLACK;
        Self {
            addr: ApvAddress::new(apv.fec, apv.adc),
            orientation: apv.orientation,
            plane_index: apv.index,
            header_level: apv.header_level,
            split_readout: Config::is_split_readout(apv),
            masked: Config::is_masked(apv),
            time_samples: processing.time_samples,
            common_mode_threshold: processing.common_mode_threshold,
            zero_suppression_threshold: processing.zero_suppression_threshold,
            raw_data: vec![0.0; capacity],
            n_filled: 0,
            ts_index: capacity,
            pedestals: vec![Pedestal::default(); APV_STRIP_SIZE],
            corrected: Array2::zeros((APV_STRIP_SIZE, processing.time_samples)),
            hit_mask: bitvec![0; APV_STRIP_SIZE],
            plane: None,
            local_strip_map: Vec::new(),
            plane_strip_map: Vec::new(),
            offset_hists: Vec::new(),
            noise_hists: Vec::new(),
        }
    }

    pub fn address(&self) -> ApvAddress {
        self.addr
    }

    pub fn plane_index(&self) -> usize {
        self.plane_index
    }

    pub fn plane(&self) -> Option<PlaneHandle> {
        self.plane
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Capacity of the sample buffer in 16-bit samples
    pub fn buffer_size(&self) -> usize {
        self.raw_data.len()
    }

    pub fn time_sample_start(&self) -> usize {
        self.ts_index
    }

    /// Connect the APV to a plane and compute its strip maps.
    ///
    /// Reconnecting simply replaces the handle and the maps.
    pub fn connect(
        &mut self,
        handle: PlaneHandle,
        plane_orientation: i32,
        connectors: usize,
    ) {
        self.plane = Some(handle);
        let (local, plane): (Vec<i32>, Vec<i32>) = (0..APV_STRIP_SIZE)
            .map(|ch| {
                map_strip(
                    ch,
                    handle.kind,
                    plane_orientation,
                    self.orientation,
                    self.plane_index,
                    connectors,
                )
            })
            .unzip();
        self.local_strip_map = local;
        self.plane_strip_map = plane;
    }

    pub fn disconnect(&mut self) {
        self.plane = None;
        self.local_strip_map.clear();
        self.plane_strip_map.clear();
    }

    pub fn local_strip(&self, channel: usize) -> Option<i32> {
        self.local_strip_map.get(channel).copied()
    }

    pub fn plane_strip(&self, channel: usize) -> Option<i32> {
        self.plane_strip_map.get(channel).copied()
    }

    pub fn pedestals(&self) -> &[Pedestal] {
        &self.pedestals
    }

    pub fn set_pedestal(&mut self, channel: usize, pedestal: Pedestal) {
        if let Some(p) = self.pedestals.get_mut(channel) {
            *p = pedestal;
        }
    }

    pub fn set_pedestals(&mut self, pedestals: &[Pedestal]) {
        for (channel, ped) in pedestals.iter().enumerate().take(APV_STRIP_SIZE) {
            self.pedestals[channel] = *ped;
        }
    }

    /// Reset all pedestals to the uncalibrated default
    pub fn clear_pedestals(&mut self) {
        self.pedestals.fill(Pedestal::default());
    }

    /// Drop the data of the current event
    pub fn clear(&mut self) {
        self.n_filled = 0;
        self.ts_index = self.raw_data.len();
        self.hit_mask.fill(false);
    }

    /// Unshuffle the raw words into the sample buffer and locate the first time sample.
    ///
    /// A payload larger than the buffer leaves the APV empty for this event.
    pub fn fill_raw_data(&mut self, words: &[u32]) -> Result<(), ApvError> {
        self.clear();
        let n_samples = words.len() * 2;
        if n_samples > self.raw_data.len() {
            return Err(ApvError::BufferOverflow {
                addr: self.addr,
                received: n_samples,
                capacity: self.raw_data.len(),
            });
        }

        for (i, word) in words.iter().enumerate() {
            let (first, second) = split_raw_word(*word);
            self.raw_data[2 * i] = first as f32;
            self.raw_data[2 * i + 1] = second as f32;
        }
        self.n_filled = n_samples;
        self.ts_index = self.find_time_sample_start();
        Ok(())
    }

    /// Same as [GemApv::fill_raw_data] for a little-endian byte payload
    pub fn fill_raw_bytes(&mut self, bytes: &[u8]) -> Result<(), ApvError> {
        if bytes.len() % 4 != 0 {
            self.clear();
            return Err(ApvError::BadPayloadLength(self.addr));
        }
        let mut words = vec![0u32; bytes.len() / 4];
        LittleEndian::read_u32_into(bytes, &mut words);
        self.fill_raw_data(&words)
    }

    /// Three consecutive samples below the header level mark an APV header. The data
    /// starts after the header, the pipeline address, and the error bit.
    fn find_time_sample_start(&self) -> usize {
        let data = &self.raw_data[..self.n_filled];
        data.windows(APV_HEADER_WORDS)
            .position(|w| w.iter().all(|v| *v < self.header_level))
            .map(|i| i + APV_HEADER_SIZE)
            .unwrap_or(self.raw_data.len())
    }

    /// Is there a full set of time samples after the located start
    fn has_complete_frame(&self) -> bool {
        let end = self.ts_index
            + (self.time_samples - 1) * TIME_SAMPLE_SIZE
            + APV_STRIP_SIZE;
        self.ts_index < self.raw_data.len() && end <= self.n_filled
    }

    #[inline]
    fn raw_sample(&self, channel: usize, time_sample: usize) -> f32 {
        self.raw_data[self.ts_index + time_sample * TIME_SAMPLE_SIZE + channel]
    }

    /// Subtract pedestals and the common mode of every time sample.
    ///
    /// The common mode is the average over channels whose pedestal subtracted value is
    /// below `noise * threshold`, so that channels carrying signal do not bias it.
    /// Split readout APVs get one common mode per half of the channel range.
    pub fn common_mode_correction(&mut self) {
        if !self.has_complete_frame() {
            self.corrected.fill(0.0);
            return;
        }
        let mut values = [0.0f32; APV_STRIP_SIZE];
        for ts in 0..self.time_samples {
            for (ch, value) in values.iter_mut().enumerate() {
                *value = self.raw_sample(ch, ts) - self.pedestals[ch].offset;
            }
            if self.split_readout {
                let low = self.common_mode(&values, 0, APV_HALF_SIZE);
                let high = self.common_mode(&values, APV_HALF_SIZE, APV_STRIP_SIZE);
                for (ch, value) in values.iter().enumerate() {
                    let cm = if ch < APV_HALF_SIZE { low } else { high };
                    self.corrected[[ch, ts]] = value - cm;
                }
            } else {
                let cm = self.common_mode(&values, 0, APV_STRIP_SIZE);
                for (ch, value) in values.iter().enumerate() {
                    self.corrected[[ch, ts]] = value - cm;
                }
            }
        }
    }

    fn common_mode(&self, values: &[f32], begin: usize, end: usize) -> f32 {
        let mut sum = 0.0;
        let mut count = 0;
        for ch in begin..end {
            if values[ch] < self.pedestals[ch].noise * self.common_mode_threshold {
                sum += values[ch];
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Mark channels whose time averaged corrected signal exceeds `noise * threshold`
    pub fn zero_suppression(&mut self) {
        self.hit_mask.fill(false);
        if self.masked || !self.has_complete_frame() {
            return;
        }
        for (ch, row) in self.corrected.outer_iter().enumerate() {
            let average = row.sum() / self.time_samples as f32;
            if average > self.pedestals[ch].noise * self.zero_suppression_threshold {
                self.hit_mask.set(ch, true);
            }
        }
    }

    /// Fill, correct, and suppress in one go
    pub fn process_raw(&mut self, words: &[u32]) -> Result<(), ApvError> {
        self.fill_raw_data(words)?;
        self.common_mode_correction();
        self.zero_suppression();
        Ok(())
    }

    pub fn n_hits(&self) -> usize {
        self.hit_mask.count_ones()
    }

    pub fn is_hit(&self, channel: usize) -> bool {
        self.hit_mask.get(channel).map(|b| *b).unwrap_or(false)
    }

    /// Hits of the current event in plane strip numbers. Unconnected APVs report nothing.
    pub fn collect_hits(&self) -> Vec<StripHit> {
        if self.plane.is_none() {
            return Vec::new();
        }
        self.hit_mask
            .iter_ones()
            .map(|ch| StripHit {
                strip: self.plane_strip_map[ch],
                samples: self.corrected.row(ch).to_vec(),
            })
            .collect()
    }

    /// Allocate (or reset) the pedestal histograms
    pub fn init_pedestal_histograms(&mut self) {
        let (off_min, off_max) = OFFSET_HIST_RANGE;
        let (noise_min, noise_max) = NOISE_HIST_RANGE;
        self.offset_hists = vec![Histogram::new(OFFSET_HIST_BINS, off_min, off_max); APV_STRIP_SIZE];
        self.noise_hists = vec![Histogram::new(NOISE_HIST_BINS, noise_min, noise_max); APV_STRIP_SIZE];
    }

    pub fn release_pedestal_histograms(&mut self) {
        self.offset_hists = Vec::new();
        self.noise_hists = Vec::new();
    }

    /// Accumulate the current event into the pedestal histograms.
    ///
    /// The offset histogram gets the time averaged raw value. The noise histogram gets
    /// the time averaged value after subtracting the mean over all channels, which
    /// removes the common mode from the spread.
    pub fn fill_pedestal_histograms(&mut self) {
        if self.offset_hists.is_empty() || !self.has_complete_frame() {
            return;
        }
        let mut common_modes = vec![0.0f32; self.time_samples];
        for (ts, cm) in common_modes.iter_mut().enumerate() {
            let sum: f32 = (0..APV_STRIP_SIZE).map(|ch| self.raw_sample(ch, ts)).sum();
            *cm = sum / APV_STRIP_SIZE as f32;
        }
        for ch in 0..APV_STRIP_SIZE {
            let mut offset = 0.0;
            let mut noise = 0.0;
            for (ts, cm) in common_modes.iter().enumerate() {
                let raw = self.raw_sample(ch, ts);
                offset += raw;
                noise += raw - cm;
            }
            self.offset_hists[ch].fill(offset / self.time_samples as f32);
            self.noise_hists[ch].fill(noise / self.time_samples as f32);
        }
    }

    /// Fit the pedestal histograms and update the pedestals.
    ///
    /// Channels with too few entries keep their previous pedestal. Returns the number
    /// of channels that were updated.
    pub fn fit_pedestals(&mut self) -> usize {
        let mut n_fitted = 0;
        let mut n_starved = 0;
        for ch in 0..self.offset_hists.len() {
            if self.offset_hists[ch].entries() < MIN_PEDESTAL_ENTRIES {
                n_starved += 1;
                continue;
            }
            let offset = self.offset_hists[ch].fit_gaussian();
            let noise = self.noise_hists[ch].fit_gaussian();
            // noise must stay positive for zero suppression
            if let (Some((offset, _)), Some((_, noise))) = (offset, noise) {
                if noise <= 0.0 {
                    continue;
                }
                self.pedestals[ch] = Pedestal::new(offset, noise);
                n_fitted += 1;
            }
        }
        if n_starved > 0 {
            spdlog::warn!(
                "APV at {} has {} channels with fewer than {} pedestal entries; their pedestals were not fitted",
                self.addr,
                n_starved,
                MIN_PEDESTAL_ENTRIES
            );
        }
        n_fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PEDESTAL: f32 = 400.0;

    pub(crate) fn shuffle(first: u16, second: u16) -> u32 {
        let swap = |v: u16| v.swap_bytes() as u32;
        (swap(first) << 16) | swap(second)
    }

    fn apv_config(flags: Vec<crate::config::ApvFlag>) -> ApvConfig {
        ApvConfig {
            fec: 1,
            adc: 3,
            plane: String::from("GEM1X"),
            orientation: 0,
            index: 0,
            header_level: DEFAULT_HEADER_LEVEL,
            flags,
        }
    }

    /// Build a raw payload: some leading baseline, then one frame per time sample
    fn build_words(signal: &dyn Fn(usize, usize) -> f32, time_samples: usize) -> Vec<u32> {
        let mut samples: Vec<u16> = vec![2000; 10];
        for ts in 0..time_samples {
            samples.extend([1000u16; APV_HEADER_WORDS]);
            samples.extend([2000u16; APV_ADDRESS_WORDS + APV_ERROR_WORDS]);
            for ch in 0..APV_STRIP_SIZE {
                samples.push((PEDESTAL + signal(ch, ts)) as u16);
            }
        }
        if samples.len() % 2 == 1 {
            samples.push(2000);
        }
        samples
            .chunks(2)
            .map(|pair| shuffle(pair[0], pair[1]))
            .collect()
    }

    fn calibrated_apv(flags: Vec<crate::config::ApvFlag>) -> GemApv {
        let mut apv = GemApv::new(&apv_config(flags), &ApvProcessing::default());
        apv.set_pedestals(&vec![Pedestal::new(PEDESTAL, 5.0); APV_STRIP_SIZE]);
        apv
    }

    #[test]
    fn test_split_raw_word() {
        assert_eq!(split_raw_word(0x1234_5678), (0x3412, 0x7856));
        assert_eq!(split_raw_word(shuffle(0xabcd, 0x0102)), (0xabcd, 0x0102));
    }

    #[test]
    fn test_map_strip_is_permutation() {
        for (kind, index, connectors) in [
            (PlaneKind::X, 0, 12),
            (PlaneKind::X, 11, 12),
            (PlaneKind::Y, 5, 24),
        ] {
            for apv_orientation in [0, 1] {
                let mut strips: Vec<i32> = (0..APV_STRIP_SIZE)
                    .map(|ch| map_strip(ch, kind, 0, apv_orientation, index, connectors).1)
                    .collect();
                let again: Vec<i32> = (0..APV_STRIP_SIZE)
                    .map(|ch| map_strip(ch, kind, 0, apv_orientation, index, connectors).1)
                    .collect();
                assert_eq!(strips, again);
                strips.sort();
                let mut base = (index * APV_STRIP_SIZE) as i32;
                if kind == PlaneKind::X && index + 1 == connectors {
                    base -= LAST_CONNECTOR_SHIFT;
                }
                let expected: Vec<i32> = (base..base + APV_STRIP_SIZE as i32).collect();
                assert_eq!(strips, expected);
            }
        }
    }

    #[test]
    fn test_map_strip_values() {
        // channel 0 de-interleaves to 0 and folds onto the connector centre
        assert_eq!(map_strip(0, PlaneKind::Y, 0, 0, 0, 24), (32, 32));
        // channel 1 de-interleaves to 32, two channels further along
        assert_eq!(map_strip(1, PlaneKind::Y, 0, 0, 2, 24), (48, 48 + 256));
        // reversed orientation
        assert_eq!(map_strip(0, PlaneKind::Y, 1, 0, 0, 24), (32, 95));
        // last X connector
        assert_eq!(map_strip(0, PlaneKind::X, 0, 0, 11, 12), (48, 48 + 11 * 128 - 16));
    }

    #[test]
    fn test_overflow_drops_fill() {
        let mut apv = calibrated_apv(vec![]);
        let words = vec![0u32; apv.buffer_size() / 2 + 1];
        let result = apv.fill_raw_data(&words);
        assert!(matches!(result, Err(ApvError::BufferOverflow { .. })));
        assert_eq!(apv.time_sample_start(), apv.buffer_size());
        apv.common_mode_correction();
        apv.zero_suppression();
        assert_eq!(apv.n_hits(), 0);
    }

    #[test]
    fn test_no_header_yields_no_hits() {
        let mut apv = calibrated_apv(vec![]);
        let words = vec![shuffle(3000, 3000); 100];
        apv.process_raw(&words).unwrap();
        assert_eq!(apv.time_sample_start(), apv.buffer_size());
        assert_eq!(apv.n_hits(), 0);
    }

    #[test]
    fn test_header_search() {
        let mut apv = calibrated_apv(vec![]);
        let words = build_words(&|_, _| 0.0, 3);
        apv.fill_raw_data(&words).unwrap();
        assert_eq!(apv.time_sample_start(), 10 + APV_HEADER_SIZE);
    }

    #[test]
    fn test_common_mode_and_zero_suppression() {
        let mut apv = calibrated_apv(vec![]);
        // Baseline drift of 30 on every channel, real signal on channels 40 and 41
        let signal = |ch: usize, _ts: usize| match ch {
            40 => 230.0,
            41 => 130.0,
            _ => 30.0,
        };
        apv.process_raw(&build_words(&signal, 3)).unwrap();
        assert_eq!(apv.n_hits(), 2);
        assert!(apv.is_hit(40));
        assert!(apv.is_hit(41));
        assert!(!apv.is_hit(39));
        assert_relative_eq!(apv.corrected[[40, 0]], 200.0, epsilon = 1e-3);
        assert_relative_eq!(apv.corrected[[10, 2]], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_split_common_mode() {
        let mut apv = calibrated_apv(vec![crate::config::ApvFlag::SplitReadout]);
        let signal = |ch: usize, _ts: usize| if ch < APV_HALF_SIZE { 20.0 } else { 60.0 };
        apv.process_raw(&build_words(&signal, 3)).unwrap();
        assert_eq!(apv.n_hits(), 0);
        assert_relative_eq!(apv.corrected[[10, 0]], 0.0, epsilon = 1e-3);
        assert_relative_eq!(apv.corrected[[100, 0]], 0.0, epsilon = 1e-3);

        let mut whole = calibrated_apv(vec![]);
        whole.process_raw(&build_words(&signal, 3)).unwrap();
        assert_relative_eq!(whole.corrected[[100, 0]], 20.0, epsilon = 1e-3);
    }

    #[test]
    fn test_uncalibrated_never_fires() {
        let mut apv = GemApv::new(&apv_config(vec![]), &ApvProcessing::default());
        let signal = |ch: usize, ts: usize| ((ch * 37 + ts * 11) % 3000) as f32;
        apv.process_raw(&build_words(&signal, 3)).unwrap();
        assert_eq!(apv.n_hits(), 0);
    }

    #[test]
    fn test_masked_never_fires() {
        let mut apv = calibrated_apv(vec![crate::config::ApvFlag::Masked]);
        let signal = |ch: usize, _ts: usize| if ch == 5 { 500.0 } else { 0.0 };
        apv.process_raw(&build_words(&signal, 3)).unwrap();
        assert_eq!(apv.n_hits(), 0);
    }

    #[test]
    fn test_collect_hits() {
        let mut apv = calibrated_apv(vec![]);
        let handle = PlaneHandle {
            detector: 0,
            kind: PlaneKind::Y,
        };
        let signal = |ch: usize, ts: usize| if ch == 0 { 100.0 + ts as f32 * 50.0 } else { 0.0 };
        apv.process_raw(&build_words(&signal, 3)).unwrap();
        assert!(apv.collect_hits().is_empty());

        apv.connect(handle, 0, 24);
        let hits = apv.collect_hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].strip, 32);
        assert_eq!(hits[0].samples.len(), 3);
        assert_relative_eq!(hits[0].samples[2], 200.0, epsilon = 1e-3);
    }

    #[test]
    fn test_byte_payload() {
        let mut apv = calibrated_apv(vec![]);
        let words = build_words(&|_, _| 0.0, 3);
        let mut bytes = vec![0u8; words.len() * 4];
        LittleEndian::write_u32_into(&words, &mut bytes);
        apv.fill_raw_bytes(&bytes).unwrap();
        assert_eq!(apv.time_sample_start(), 10 + APV_HEADER_SIZE);
        assert!(matches!(
            apv.fill_raw_bytes(&bytes[..5]),
            Err(ApvError::BadPayloadLength(_))
        ));
    }

    #[test]
    fn test_pedestal_fit_needs_statistics() {
        let mut apv = GemApv::new(&apv_config(vec![]), &ApvProcessing::default());
        apv.init_pedestal_histograms();
        let words = build_words(&|_, _| 0.0, 3);
        for _ in 0..10 {
            apv.fill_raw_data(&words).unwrap();
            apv.fill_pedestal_histograms();
        }
        assert_eq!(apv.fit_pedestals(), 0);
        assert_eq!(apv.pedestals()[0], Pedestal::default());
    }

    #[test]
    fn test_pedestal_fit() {
        let mut apv = GemApv::new(&apv_config(vec![]), &ApvProcessing::default());
        apv.init_pedestal_histograms();
        for event in 0..(MIN_PEDESTAL_ENTRIES as usize + 200) {
            // Deterministic spread of +-8 around the pedestal, different per channel
            let signal = move |ch: usize, ts: usize| {
                (((event * 7 + ch * 13 + ts * 5) % 17) as f32) - 8.0
            };
            apv.fill_raw_data(&build_words(&signal, 3)).unwrap();
            apv.fill_pedestal_histograms();
        }
        assert_eq!(apv.fit_pedestals(), APV_STRIP_SIZE);
        for ped in apv.pedestals() {
            assert!((ped.offset - PEDESTAL).abs() < 6.0, "offset {}", ped.offset);
            assert!(ped.noise > 0.0 && ped.noise < 10.0, "noise {}", ped.noise);
        }
    }
}
