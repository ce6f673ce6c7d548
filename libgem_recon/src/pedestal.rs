// Pedestal tables and the histograms used to fit them.
//
// Table format is a CSV file with a single header line and one row per channel:
// fec,adc,channel,offset,noise
// Every APV in the table gets a full channel range; channels not listed keep the
// uncalibrated default so that they never fire.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use super::constants::*;
use super::error::PedestalError;
use super::hardware_id::ApvAddress;

const ENTRIES_PER_LINE: usize = 5;
const TABLE_HEADER: &str = "fec,adc,channel,offset,noise";

/// Offset and noise of a single channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pedestal {
    pub offset: f32,
    pub noise: f32,
}

impl Default for Pedestal {
    fn default() -> Self {
        Self {
            offset: 0.0,
            noise: UNCALIBRATED_NOISE,
        }
    }
}

impl Pedestal {
    pub fn new(offset: f32, noise: f32) -> Self {
        Self { offset, noise }
    }
}

/// Fixed binning 1-D histogram with enough bookkeeping for a gaussian fit
#[derive(Debug, Clone)]
pub struct Histogram {
    min: f32,
    max: f32,
    counts: Vec<u32>,
    entries: u64,
    sum: f64,
    sum_sq: f64,
}

impl Histogram {
    pub fn new(n_bins: usize, min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            counts: vec![0; n_bins],
            entries: 0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    fn bin_width(&self) -> f32 {
        (self.max - self.min) / self.counts.len() as f32
    }

    fn bin_center(&self, bin: usize) -> f64 {
        (self.min + (bin as f32 + 0.5) * self.bin_width()) as f64
    }

    /// Values outside the range are dropped
    pub fn fill(&mut self, value: f32) {
        if !(value >= self.min && value < self.max) {
            return;
        }
        let bin = ((value - self.min) / self.bin_width()) as usize;
        let bin = bin.min(self.counts.len() - 1);
        self.counts[bin] += 1;
        self.entries += 1;
        self.sum += value as f64;
        self.sum_sq += (value as f64) * (value as f64);
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.entries = 0;
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.entries == 0 {
            return None;
        }
        Some(self.sum / self.entries as f64)
    }

    pub fn rms(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self.sum_sq / self.entries as f64 - mean * mean;
        Some(var.max(0.0).sqrt())
    }

    /// Fit a gaussian to the histogram and return (mean, sigma).
    ///
    /// Uses a weighted least squares parabola on the log of the bin contents inside
    /// three standard deviations of the sample mean. If the parabola is not concave the
    /// sample moments are returned instead.
    pub fn fit_gaussian(&self) -> Option<(f32, f32)> {
        let mean = self.mean()?;
        let rms = self.rms()?;
        let half_width = (3.0 * rms).max(self.bin_width() as f64);

        // Normal equations of ln(y) = a + b*u + c*u^2 with u = x - mean, weights y
        let mut s = [0.0f64; 5];
        let mut t = [0.0f64; 3];
        for (bin, count) in self.counts.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            let u = self.bin_center(bin) - mean;
            if u.abs() > half_width {
                continue;
            }
            let w = *count as f64;
            let ln_y = w.ln();
            let mut u_pow = 1.0;
            for item in s.iter_mut() {
                *item += w * u_pow;
                u_pow *= u;
            }
            t[0] += w * ln_y;
            t[1] += w * u * ln_y;
            t[2] += w * u * u * ln_y;
        }

        let moments = Some((mean as f32, rms as f32));
        let matrix = [[s[0], s[1], s[2]], [s[1], s[2], s[3]], [s[2], s[3], s[4]]];
        let Some([_, b, c]) = solve_3x3(matrix, t) else {
            return moments;
        };
        if c >= 0.0 {
            return moments;
        }
        let sigma = (-0.5 / c).sqrt();
        let center = mean - b / (2.0 * c);
        if !sigma.is_finite() || !center.is_finite() {
            return moments;
        }
        Some((center as f32, sigma as f32))
    }
}

/// Cramer's rule; None for a singular system
fn solve_3x3(m: [[f64; 3]; 3], v: [f64; 3]) -> Option<[f64; 3]> {
    let det = |m: &[[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let d = det(&m);
    if d.abs() < f64::EPSILON {
        return None;
    }
    let mut result = [0.0; 3];
    for (col, item) in result.iter_mut().enumerate() {
        let mut replaced = m;
        for row in 0..3 {
            replaced[row][col] = v[row];
        }
        *item = det(&replaced) / d;
    }
    Some(result)
}

/// Pedestals for a set of APVs, keyed by (FEC, ADC)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PedestalTable {
    apvs: BTreeMap<(u32, u32), Vec<Pedestal>>,
}

impl PedestalTable {
    /// Read a pedestal table from a CSV file
    pub fn read(path: &Path) -> Result<Self, PedestalError> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, PedestalError> {
        let mut table = Self::default();
        let mut lines = contents.lines().enumerate();
        lines.next(); // Skip the header
        for (line_number, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let entries: Vec<&str> = line.split_terminator(',').map(|e| e.trim()).collect();
            if entries.len() != ENTRIES_PER_LINE {
                return Err(PedestalError::BadFileFormat(line_number + 1));
            }
            let fec: u32 = entries[0].parse()?;
            let adc: u32 = entries[1].parse()?;
            let channel: usize = entries[2].parse()?;
            let offset: f32 = entries[3].parse()?;
            let noise: f32 = entries[4].parse()?;
            if channel >= APV_STRIP_SIZE {
                return Err(PedestalError::BadChannel(channel));
            }
            table.apv_entry(fec, adc)[channel] = Pedestal::new(offset, noise);
        }
        Ok(table)
    }

    /// Write the table in the same format read by [PedestalTable::read]
    pub fn write(&self, path: &Path) -> Result<(), PedestalError> {
        let mut file = File::create(path)?;
        file.write_all(self.to_csv().as_bytes())?;
        Ok(())
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from(TABLE_HEADER);
        out.push('\n');
        for ((fec, adc), peds) in self.apvs.iter() {
            for (channel, ped) in peds.iter().enumerate() {
                out.push_str(&format!(
                    "{fec},{adc},{channel},{},{}\n",
                    ped.offset, ped.noise
                ));
            }
        }
        out
    }

    fn apv_entry(&mut self, fec: u32, adc: u32) -> &mut Vec<Pedestal> {
        self.apvs
            .entry((fec, adc))
            .or_insert_with(|| vec![Pedestal::default(); APV_STRIP_SIZE])
    }

    pub fn insert(&mut self, addr: ApvAddress, pedestals: Vec<Pedestal>) {
        self.apvs.insert((addr.fec_id, addr.adc_ch), pedestals);
    }

    pub fn get(&self, addr: &ApvAddress) -> Option<&[Pedestal]> {
        self.apvs
            .get(&(addr.fec_id, addr.adc_ch))
            .map(|p| p.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ApvAddress, &[Pedestal])> {
        self.apvs
            .iter()
            .map(|((fec, adc), peds)| (ApvAddress::new(*fec, *adc), peds.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.apvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apvs.is_empty()
    }
}
