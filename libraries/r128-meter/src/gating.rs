//! Gating of block loudness (ITU-R BS.1770-4, EBU Tech 3342)
//!
//! Integrated loudness:
//! 1. Drop 400 ms blocks below -70 LUFS (absolute gate)
//! 2. Mean energy of the survivors gives the ungated loudness
//! 3. Drop blocks more than 10 LU below it (relative gate)
//! 4. Mean energy of what is left, in LUFS
//!
//! Loudness range uses 3 s blocks, a 20 LU relative gate and reports the
//! spread between the 10th and 95th percentile of the surviving loudness
//! values.

use crate::config::HistoryMode;
use crate::error::{MeterError, Result};

/// Blocks quieter than this never count
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Relative gate for integrated loudness, in LU below the ungated loudness
pub const INTEGRATED_RELATIVE_GATE_LU: f64 = 10.0;

/// Relative gate for loudness range, in LU below the ungated loudness
pub const RANGE_RELATIVE_GATE_LU: f64 = 20.0;

pub const RANGE_LOW_PERCENTILE: f64 = 0.10;
pub const RANGE_HIGH_PERCENTILE: f64 = 0.95;

const LOUDNESS_OFFSET: f64 = -0.691;

const HISTOGRAM_BINS: usize = 1000;
const HISTOGRAM_BIN_LU: f64 = 0.1;

/// Mean square energy to LUFS. Zero energy maps to negative infinity.
#[inline]
pub fn energy_to_loudness(energy: f64) -> f64 {
    LOUDNESS_OFFSET + 10.0 * energy.log10()
}

/// LUFS to mean square energy
#[inline]
pub fn loudness_to_energy(lufs: f64) -> f64 {
    10.0_f64.powf((lufs - LOUDNESS_OFFSET) / 10.0)
}

/// Value at quantile `p` of an ascending slice, interpolating linearly
/// between the neighbouring ranks.
pub fn interpolated_percentile(sorted: &[f64], p: f64) -> Option<f64> {
    percentile_by_rank(sorted.len(), p, |rank| sorted[rank])
}

fn percentile_by_rank(len: usize, p: f64, value_at: impl Fn(usize) -> f64) -> Option<f64> {
    if len == 0 {
        return None;
    }

    let position = (len - 1) as f64 * p.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let low_value = value_at(lower);
    if upper == lower {
        return Some(low_value);
    }

    let fraction = position - lower as f64;
    Some(low_value + (value_at(upper) - low_value) * fraction)
}

/// Loudness histogram with 0.1 LU bins from -70 LUFS upwards
#[derive(Debug, Clone)]
struct Histogram {
    counts: Vec<u64>,
    below_gate: u64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            counts: vec![0; HISTOGRAM_BINS],
            below_gate: 0,
        }
    }

    fn bin_loudness(index: usize) -> f64 {
        ABSOLUTE_GATE_LUFS + (index as f64 + 0.5) * HISTOGRAM_BIN_LU
    }

    fn add(&mut self, energy: f64) {
        let lufs = energy_to_loudness(energy);
        if lufs.is_nan() || lufs < ABSOLUTE_GATE_LUFS {
            self.below_gate += 1;
            return;
        }

        let index = ((lufs - ABSOLUTE_GATE_LUFS) / HISTOGRAM_BIN_LU) as usize;
        self.counts[index.min(HISTOGRAM_BINS - 1)] += 1;
    }

    fn first_bin_from(min_lufs: f64) -> usize {
        (0..HISTOGRAM_BINS)
            .find(|&i| Self::bin_loudness(i) >= min_lufs)
            .unwrap_or(HISTOGRAM_BINS)
    }

    fn gated_energy(&self, min_lufs: f64) -> Option<f64> {
        let start = Self::first_bin_from(min_lufs);
        let (count, sum) = self.counts[start..]
            .iter()
            .enumerate()
            .fold((0_u64, 0.0_f64), |(count, sum), (offset, &n)| {
                let energy = loudness_to_energy(Self::bin_loudness(start + offset));
                (count + n, sum + n as f64 * energy)
            });

        (count > 0).then_some(sum / count as f64)
    }

    fn loudness_at_rank(&self, start: usize, rank: u64) -> f64 {
        let mut seen = 0;
        for (offset, &n) in self.counts[start..].iter().enumerate() {
            seen += n;
            if rank < seen {
                return Self::bin_loudness(start + offset);
            }
        }
        Self::bin_loudness(HISTOGRAM_BINS - 1)
    }

    fn percentiles(&self, min_lufs: f64, low: f64, high: f64) -> Option<(f64, f64)> {
        let start = Self::first_bin_from(min_lufs);
        let total: u64 = self.counts[start..].iter().sum();
        let len = usize::try_from(total).ok()?;
        let value_at = |rank: usize| self.loudness_at_rank(start, rank as u64);

        Some((
            percentile_by_rank(len, low, value_at)?,
            percentile_by_rank(len, high, value_at)?,
        ))
    }

    fn len(&self) -> u64 {
        self.below_gate + self.counts.iter().sum::<u64>()
    }
}

#[derive(Debug, Clone)]
enum Store {
    /// Combined mean square of every gating block, in arrival order
    Full(Vec<f64>),
    Histogram(Histogram),
}

/// Ordered record of gating block energies for one block duration.
///
/// Grows by one entry per hop and is never pruned; gates are applied when a
/// measurement is queried, so queries do not change the history.
#[derive(Debug, Clone)]
pub struct GatingHistory {
    store: Store,
}

impl GatingHistory {
    pub fn new(mode: HistoryMode) -> Self {
        let store = match mode {
            HistoryMode::Full => Store::Full(Vec::new()),
            HistoryMode::Histogram => Store::Histogram(Histogram::new()),
        };
        Self { store }
    }

    /// Record the combined mean square of one gating block
    pub fn push(&mut self, energy: f64) {
        match &mut self.store {
            Store::Full(energies) => energies.push(energy),
            Store::Histogram(histogram) => histogram.add(energy),
        }
    }

    /// Number of gating blocks recorded, gated or not
    pub fn len(&self) -> u64 {
        match &self.store {
            Store::Full(energies) => energies.len() as u64,
            Store::Histogram(histogram) => histogram.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match &mut self.store {
            Store::Full(energies) => energies.clear(),
            Store::Histogram(histogram) => *histogram = Histogram::new(),
        }
    }

    /// Mean energy of blocks whose loudness is at least `min_lufs`
    fn gated_energy(&self, min_lufs: f64) -> Option<f64> {
        let min_lufs = min_lufs.max(ABSOLUTE_GATE_LUFS);
        match &self.store {
            Store::Full(energies) => {
                let (count, sum) = energies
                    .iter()
                    .filter(|&&e| energy_to_loudness(e) >= min_lufs)
                    .fold((0_usize, 0.0_f64), |(count, sum), &e| (count + 1, sum + e));
                (count > 0).then_some(sum / count as f64)
            }
            Store::Histogram(histogram) => histogram.gated_energy(min_lufs),
        }
    }

    /// Relative gate in LUFS: ungated loudness minus `gate_lu`
    pub fn relative_threshold(&self, gate_lu: f64) -> Result<f64> {
        let ungated = self
            .gated_energy(ABSOLUTE_GATE_LUFS)
            .ok_or(MeterError::InsufficientData)?;
        Ok(energy_to_loudness(ungated) - gate_lu)
    }

    /// Two-pass gated loudness in LUFS
    pub fn integrated_loudness(&self) -> Result<f64> {
        let threshold = self.relative_threshold(INTEGRATED_RELATIVE_GATE_LU)?;
        let gated = self
            .gated_energy(threshold)
            .ok_or(MeterError::InsufficientData)?;
        Ok(energy_to_loudness(gated))
    }

    /// Loudness range in LU
    pub fn loudness_range(&self) -> Result<f64> {
        let threshold = self
            .relative_threshold(RANGE_RELATIVE_GATE_LU)?
            .max(ABSOLUTE_GATE_LUFS);

        let (low, high) = match &self.store {
            Store::Full(energies) => {
                let mut loudness: Vec<f64> = energies
                    .iter()
                    .map(|&e| energy_to_loudness(e))
                    .filter(|&l| l >= threshold)
                    .collect();
                loudness.sort_by(f64::total_cmp);

                (
                    interpolated_percentile(&loudness, RANGE_LOW_PERCENTILE),
                    interpolated_percentile(&loudness, RANGE_HIGH_PERCENTILE),
                )
            }
            Store::Histogram(histogram) => histogram
                .percentiles(threshold, RANGE_LOW_PERCENTILE, RANGE_HIGH_PERCENTILE)
                .unzip(),
        };

        match (low, high) {
            (Some(low), Some(high)) => Ok(high - low),
            _ => Err(MeterError::InsufficientData),
        }
    }
}
