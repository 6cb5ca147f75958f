//! 100 ms energy blocks
//!
//! Filtered samples are squared and summed per channel until a full hop
//! (`sample_rate / 10` samples) is collected. The open hop survives between
//! ingestion calls, so input chunks never have to line up with blocks.
//!
//! Gating blocks are built from the trailing completed hops: 4 hops give a
//! 400 ms block, 30 hops a 3 s block, both advancing once per hop.

use std::collections::VecDeque;

/// Gating block length for integrated loudness, in hops
pub const INTEGRATED_BLOCK_HOPS: usize = 4;

/// Gating block length for loudness range, in hops
pub const RANGE_BLOCK_HOPS: usize = 30;

/// Running sum of squares for the currently open hop of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialBlock {
    pub sum_of_squares: f64,
    pub samples: usize,
}

/// One completed 100 ms hop
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyBlock {
    /// Mean square per channel
    pub channel_energy: Vec<f64>,
    /// Σ weight × mean square over channels
    pub weighted_energy: f64,
}

/// Turns filtered samples into a stream of [`EnergyBlock`]s
#[derive(Debug, Clone)]
pub struct BlockAccumulator {
    hop_len: usize,
    weights: Vec<f64>,
    partial: Vec<PartialBlock>,
    /// Mean squares of channels that already closed the current hop
    closing: Vec<f64>,
    closed_channels: usize,
    /// Trailing completed hops, oldest first
    blocks: VecDeque<EnergyBlock>,
    retain: usize,
    completed: u64,
}

impl BlockAccumulator {
    /// # Arguments
    /// * `hop_len` - Samples per channel in one hop (at least 1)
    /// * `weights` - Loudness weight of each channel
    /// * `retain` - Number of trailing hops kept for gating block assembly
    pub fn new(hop_len: usize, weights: Vec<f64>, retain: usize) -> Self {
        let channels = weights.len();
        Self {
            hop_len: hop_len.max(1),
            weights,
            partial: vec![PartialBlock::default(); channels],
            closing: vec![0.0; channels],
            closed_channels: 0,
            blocks: VecDeque::with_capacity(retain),
            retain: retain.max(1),
            completed: 0,
        }
    }

    /// Add one filtered sample of `channel`.
    ///
    /// Returns `true` when this sample completed a hop on every channel, i.e.
    /// a new [`EnergyBlock`] was appended.
    #[inline]
    pub fn ingest(&mut self, channel: usize, sample: f64) -> bool {
        let partial = &mut self.partial[channel];
        partial.sum_of_squares += sample * sample;
        partial.samples += 1;

        if partial.samples < self.hop_len {
            return false;
        }

        self.closing[channel] = partial.sum_of_squares / partial.samples as f64;
        *partial = PartialBlock::default();
        self.closed_channels += 1;

        if self.closed_channels < self.partial.len() {
            return false;
        }
        self.closed_channels = 0;

        let weighted_energy = self
            .closing
            .iter()
            .zip(&self.weights)
            .map(|(energy, weight)| energy * weight)
            .sum();

        if self.blocks.len() == self.retain {
            self.blocks.pop_front();
        }
        self.blocks.push_back(EnergyBlock {
            channel_energy: self.closing.clone(),
            weighted_energy,
        });
        self.completed += 1;

        true
    }

    /// Combined mean square of the gating block made of the last `hops` hops.
    ///
    /// `None` until that many hops have completed.
    pub fn gating_energy(&self, hops: usize) -> Option<f64> {
        if hops == 0 || self.blocks.len() < hops {
            return None;
        }

        let sum: f64 = self
            .blocks
            .iter()
            .skip(self.blocks.len() - hops)
            .map(|block| block.weighted_energy)
            .sum();
        Some(sum / hops as f64)
    }

    /// Most recently completed hop
    pub fn last_block(&self) -> Option<&EnergyBlock> {
        self.blocks.back()
    }

    /// Open hop of `channel`
    pub fn partial(&self, channel: usize) -> Option<&PartialBlock> {
        self.partial.get(channel)
    }

    /// Total number of hops completed since creation or reset
    pub fn completed_blocks(&self) -> u64 {
        self.completed
    }

    pub fn hop_len(&self) -> usize {
        self.hop_len
    }

    pub fn reset(&mut self) {
        self.partial.fill(PartialBlock::default());
        self.closing.fill(0.0);
        self.closed_channels = 0;
        self.blocks.clear();
        self.completed = 0;
    }
}
