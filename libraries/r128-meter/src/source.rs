//! Streaming measurement driver
//!
//! A [`FrameSource`] yields interleaved audio in chunks, the way a streaming
//! decoder does. [`measure`] pulls chunks from it into a fresh [`Meter`] and
//! returns the final [`LoudnessSummary`].

use crate::config::{MeterConfig, Mode};
use crate::error::{MeterError, Result};
use crate::meter::{LoudnessSummary, Meter, Sample};
use tracing::{debug, trace};

/// Default number of frames requested per chunk
pub const DEFAULT_BLOCK_FRAMES: usize = 4096;

/// Source of interleaved audio frames
pub trait FrameSource {
    /// Sample type delivered by this source
    type Sample: Sample;

    /// Number of interleaved channels
    fn channels(&self) -> u32;

    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Read the next chunk of interleaved samples
    ///
    /// Returns `None` at end of stream. A chunk may hold fewer than
    /// `max_frames` frames.
    ///
    /// # Errors
    /// Implementations report read failures as [`MeterError::Source`]
    fn next_chunk(&mut self, max_frames: usize) -> Result<Option<Vec<Self::Sample>>>;
}

/// Frame source over an in-memory interleaved buffer
#[derive(Debug, Clone)]
pub struct InterleavedSource<T> {
    samples: Vec<T>,
    channels: u32,
    sample_rate: u32,
    position: usize,
}

impl<T: Sample> InterleavedSource<T> {
    pub fn new(samples: Vec<T>, channels: u32, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
            position: 0,
        }
    }

    /// Samples not yet handed out
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl<T: Sample> FrameSource for InterleavedSource<T> {
    type Sample = T;

    fn channels(&self) -> u32 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_chunk(&mut self, max_frames: usize) -> Result<Option<Vec<T>>> {
        if self.remaining() == 0 {
            return Ok(None);
        }

        let channels = (self.channels as usize).max(1);
        let wanted = max_frames.max(1) * channels;
        let end = (self.position + wanted).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(Some(chunk))
    }
}

/// Measure a whole source with both integrated loudness and loudness range
///
/// # Arguments
/// * `source` - Audio to measure; read until it returns `None`
/// * `block_frames` - Frames requested per chunk (0 uses [`DEFAULT_BLOCK_FRAMES`])
///
/// # Errors
/// Returns an error if the source format is invalid, a chunk does not hold
/// whole frames, or the source fails
pub fn measure<S: FrameSource>(source: &mut S, block_frames: usize) -> Result<LoudnessSummary> {
    let config = MeterConfig::new(source.channels(), source.sample_rate()).with_mode(Mode::Both);
    measure_with(source, block_frames, config)
}

/// Like [`measure`], with an explicit meter configuration
///
/// The configuration's channel count and sample rate must match the source.
pub fn measure_with<S: FrameSource>(
    source: &mut S,
    block_frames: usize,
    config: MeterConfig,
) -> Result<LoudnessSummary> {
    if config.channels != source.channels() || config.sample_rate != source.sample_rate() {
        return Err(MeterError::InvalidConfig(format!(
            "source is {} ch @ {} Hz but meter expects {} ch @ {} Hz",
            source.channels(),
            source.sample_rate(),
            config.channels,
            config.sample_rate
        )));
    }

    let block_frames = if block_frames == 0 {
        DEFAULT_BLOCK_FRAMES
    } else {
        block_frames
    };

    let mut meter = Meter::new(config)?;
    let mut chunks = 0usize;

    while let Some(chunk) = source.next_chunk(block_frames)? {
        trace!("Measuring chunk {} ({} samples)", chunks, chunk.len());
        meter.add_frames(&chunk)?;
        chunks += 1;
    }

    let summary = meter.summary()?;
    debug!("Measured {} chunks: {}", chunks, summary);
    Ok(summary)
}
