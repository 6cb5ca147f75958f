//! Streaming EBU R128 loudness meter
//!
//! [`Meter`] ties the stages together:
//!
//! ```text
//! frames ─► FilterBank ─► BlockAccumulator ─► GatingHistory (400 ms) ─► integrated LUFS
//!          (K-weighting)  (100 ms hops)    └► GatingHistory (3 s)    ─► loudness range
//! ```
//!
//! Frames may arrive in batches of any length. Queries can be made at any time
//! and reflect every frame fed so far.
//!
//! A meter is not internally synchronized. Feed each instance from one place
//! at a time (wrap it in a `Mutex` or use one meter per source otherwise).

use crate::block::{BlockAccumulator, INTEGRATED_BLOCK_HOPS, RANGE_BLOCK_HOPS};
use crate::config::{MeterConfig, Mode};
use crate::error::{MeterError, Result};
use crate::filter::FilterBank;
use crate::gating::{GatingHistory, INTEGRATED_RELATIVE_GATE_LU};
use std::fmt;
use tracing::debug;

/// Audio sample formats accepted by the meter
pub trait Sample: Copy {
    /// Sample value scaled to roughly [-1.0, 1.0]
    fn to_f64(self) -> f64;
}

impl Sample for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Sample for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Sample for i16 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self) / 32768.0
    }
}

impl Sample for i32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self) / 2_147_483_648.0
    }
}

/// Snapshot of the measurements of a meter
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessSummary {
    /// Integrated loudness in LUFS, if enabled and available
    pub integrated_lufs: Option<f64>,

    /// Loudness range in LU, if enabled and available
    pub loudness_range_lu: Option<f64>,

    /// Duration of the analyzed audio in seconds
    pub duration_seconds: f64,

    pub sample_rate: u32,

    pub channels: u32,
}

impl fmt::Display for LoudnessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.integrated_lufs {
            Some(lufs) => write!(f, "Loudness: {:.1} LUFS", lufs)?,
            None => write!(f, "Loudness: n/a")?,
        }
        match self.loudness_range_lu {
            Some(lra) => write!(f, ", Range: {:.1} LU", lra)?,
            None => write!(f, ", Range: n/a")?,
        }
        write!(
            f,
            " ({:.1} s, {} ch @ {} Hz)",
            self.duration_seconds, self.channels, self.sample_rate
        )
    }
}

/// Everything a live meter owns
#[derive(Debug, Clone)]
struct MeterState {
    filters: FilterBank,
    blocks: BlockAccumulator,
    integrated: Option<GatingHistory>,
    range: Option<GatingHistory>,
    frames_processed: u64,
}

impl MeterState {
    fn new(config: &MeterConfig) -> Self {
        let channels = config.channels as usize;
        let weights = config.resolved_layout().weights();
        let retain = if config.mode.range() {
            RANGE_BLOCK_HOPS
        } else {
            INTEGRATED_BLOCK_HOPS
        };

        Self {
            filters: FilterBank::new(channels, config.sample_rate),
            blocks: BlockAccumulator::new(config.hop_frames(), weights, retain),
            integrated: config
                .mode
                .integrated()
                .then(|| GatingHistory::new(config.history)),
            range: config
                .mode
                .range()
                .then(|| GatingHistory::new(config.history)),
            frames_processed: 0,
        }
    }

    /// Filter and accumulate one sample; record gating blocks when a hop closes
    #[inline]
    fn push_sample(&mut self, channel: usize, sample: f64) {
        let filtered = self.filters.process(channel, sample);
        if !self.blocks.ingest(channel, filtered) {
            return;
        }

        if let Some(history) = &mut self.integrated {
            if let Some(energy) = self.blocks.gating_energy(INTEGRATED_BLOCK_HOPS) {
                history.push(energy);
            }
        }
        if let Some(history) = &mut self.range {
            if let Some(energy) = self.blocks.gating_energy(RANGE_BLOCK_HOPS) {
                history.push(energy);
            }
        }
    }
}

/// EBU R128 / ITU-R BS.1770-4 loudness meter
///
/// # Example
///
/// ```
/// use r128_meter::{Meter, MeterConfig};
///
/// let mut meter = Meter::new(MeterConfig::new(2, 48000))?;
///
/// // One second of a quiet stereo tone, interleaved
/// let frames: Vec<f32> = (0..48000)
///     .flat_map(|i| {
///         let s = 0.1 * (2.0 * std::f32::consts::PI * 997.0 * i as f32 / 48000.0).sin();
///         [s, s]
///     })
///     .collect();
/// meter.add_frames(&frames)?;
///
/// let lufs = meter.integrated_loudness()?;
/// assert!((lufs - (-20.0)).abs() < 0.5);
/// # Ok::<(), r128_meter::MeterError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Meter {
    config: MeterConfig,
    /// `None` once destroyed
    state: Option<MeterState>,
}

impl Meter {
    /// Create a meter
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the channel count, sample rate or layout is invalid
    pub fn new(config: MeterConfig) -> Result<Self> {
        config.validate()?;

        let state = MeterState::new(&config);
        debug!(
            "Created loudness meter: {} channels @ {} Hz, mode {}, {:?} history",
            config.channels,
            config.sample_rate,
            config.mode.as_str(),
            config.history
        );

        Ok(Self {
            config,
            state: Some(state),
        })
    }

    /// Create a meter from its three basic parameters
    pub fn create(channels: u32, sample_rate: u32, mode: Mode) -> Result<Self> {
        Self::new(MeterConfig::new(channels, sample_rate).with_mode(mode))
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    fn state(&self) -> Result<&MeterState> {
        self.state.as_ref().ok_or(MeterError::UseAfterDestroy)
    }

    fn state_mut(&mut self) -> Result<&mut MeterState> {
        self.state.as_mut().ok_or(MeterError::UseAfterDestroy)
    }

    /// Add interleaved frames (L R L R ... for stereo)
    ///
    /// # Errors
    /// `ChannelCountMismatch` if the sample count is not a multiple of the
    /// channel count. Nothing is consumed in that case.
    pub fn add_frames<T: Sample>(&mut self, samples: &[T]) -> Result<()> {
        let channels = self.config.channels as usize;
        let state = self.state_mut()?;

        if samples.is_empty() {
            return Ok(());
        }

        if samples.len() % channels != 0 {
            return Err(MeterError::ChannelCountMismatch(format!(
                "sample count {} is not divisible by channel count {}",
                samples.len(),
                channels
            )));
        }

        for frame in samples.chunks_exact(channels) {
            for (channel, &sample) in frame.iter().enumerate() {
                state.push_sample(channel, sample.to_f64());
            }
        }
        state.frames_processed += (samples.len() / channels) as u64;

        Ok(())
    }

    /// Add planar frames: one slice per channel, all of equal length
    ///
    /// # Errors
    /// `ChannelCountMismatch` if the number of planes differs from the channel
    /// count or the planes differ in length. Nothing is consumed in that case.
    pub fn add_frames_planar<T: Sample>(&mut self, planes: &[&[T]]) -> Result<()> {
        let channels = self.config.channels as usize;
        let state = self.state_mut()?;

        if planes.len() != channels {
            return Err(MeterError::ChannelCountMismatch(format!(
                "got {} planes for {} channels",
                planes.len(),
                channels
            )));
        }

        let frames = planes[0].len();
        if let Some(plane) = planes.iter().find(|p| p.len() != frames) {
            return Err(MeterError::ChannelCountMismatch(format!(
                "planes differ in length ({} vs {} frames)",
                frames,
                plane.len()
            )));
        }

        for i in 0..frames {
            for (channel, plane) in planes.iter().enumerate() {
                state.push_sample(channel, plane[i].to_f64());
            }
        }
        state.frames_processed += frames as u64;

        Ok(())
    }

    /// Gated integrated loudness in LUFS over everything fed so far
    ///
    /// # Errors
    /// `InsufficientData` before the first 400 ms block or when every block is
    /// below the absolute gate; `ModeNotEnabled` if created without
    /// integrated loudness.
    pub fn integrated_loudness(&self) -> Result<f64> {
        self.integrated_history()?.integrated_loudness()
    }

    /// Loudness range in LU over everything fed so far
    ///
    /// # Errors
    /// `InsufficientData` before the first 3 s block or when every block is
    /// gated out; `ModeNotEnabled` if created without loudness range.
    pub fn loudness_range(&self) -> Result<f64> {
        let history = self
            .state()?
            .range
            .as_ref()
            .ok_or(MeterError::ModeNotEnabled("loudness range"))?;
        history.loudness_range()
    }

    /// Relative gate currently applied to integrated loudness, in LUFS
    pub fn relative_threshold(&self) -> Result<f64> {
        self.integrated_history()?
            .relative_threshold(INTEGRATED_RELATIVE_GATE_LU)
    }

    fn integrated_history(&self) -> Result<&GatingHistory> {
        self.state()?
            .integrated
            .as_ref()
            .ok_or(MeterError::ModeNotEnabled("integrated loudness"))
    }

    /// Number of frames fed since creation or the last reset
    pub fn frames_processed(&self) -> Result<u64> {
        Ok(self.state()?.frames_processed)
    }

    pub fn duration_seconds(&self) -> Result<f64> {
        Ok(self.frames_processed()? as f64 / f64::from(self.config.sample_rate))
    }

    /// Current measurements. Unavailable values are `None`.
    pub fn summary(&self) -> Result<LoudnessSummary> {
        Ok(LoudnessSummary {
            integrated_lufs: self.integrated_loudness().ok(),
            loudness_range_lu: self.loudness_range().ok(),
            duration_seconds: self.duration_seconds()?,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        })
    }

    /// Discard all audio seen so far, keeping the configuration
    pub fn reset(&mut self) -> Result<()> {
        self.state_mut()?;
        self.state = Some(MeterState::new(&self.config));
        debug!("Reset loudness meter");
        Ok(())
    }

    /// Release all measurement state. Every later call fails with
    /// `UseAfterDestroy`. Dropping the meter releases the same state.
    pub fn destroy(&mut self) {
        if self.state.take().is_some() {
            debug!("Destroyed loudness meter");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Channel, HistoryMode};

    fn sine(
        sample_rate: u32,
        channels: usize,
        frequency: f64,
        amplitude: f64,
        frames: usize,
    ) -> Vec<f32> {
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = i as f64 / f64::from(sample_rate);
            let s = (amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32;
            samples.extend(std::iter::repeat(s).take(channels));
        }
        samples
    }

    #[test]
    fn test_meter_creation() {
        assert!(Meter::new(MeterConfig::new(2, 44100)).is_ok());
        assert!(Meter::new(MeterConfig::new(1, 48000)).is_ok());
        assert!(Meter::create(6, 96000, Mode::Integrated).is_ok());

        assert!(matches!(
            Meter::new(MeterConfig::new(0, 48000)),
            Err(MeterError::InvalidConfig(_))
        ));
        assert!(matches!(
            Meter::new(MeterConfig::new(2, 0)),
            Err(MeterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_needs_400ms_for_integrated() {
        let mut meter = Meter::new(MeterConfig::new(1, 48000)).unwrap();
        meter.add_frames(&sine(48000, 1, 997.0, 0.5, 18720)).unwrap();
        assert_eq!(meter.integrated_loudness(), Err(MeterError::InsufficientData));

        meter.add_frames(&sine(48000, 1, 997.0, 0.5, 960)).unwrap();
        assert!(meter.integrated_loudness().is_ok());
    }

    #[test]
    fn test_needs_3s_for_range() {
        let mut meter = Meter::new(MeterConfig::new(1, 48000)).unwrap();
        meter.add_frames(&sine(48000, 1, 997.0, 0.5, 139200)).unwrap();
        assert!(meter.integrated_loudness().is_ok());
        assert_eq!(meter.loudness_range(), Err(MeterError::InsufficientData));

        meter.add_frames(&sine(48000, 1, 997.0, 0.5, 4800)).unwrap();
        assert!(meter.loudness_range().is_ok());
    }

    #[test]
    fn test_silence_is_insufficient_data() {
        let mut meter = Meter::new(MeterConfig::new(2, 44100)).unwrap();
        meter.add_frames(&vec![0.0_f32; 44100 * 2]).unwrap();
        assert_eq!(meter.integrated_loudness(), Err(MeterError::InsufficientData));
    }

    #[test]
    fn test_invalid_sample_count_leaves_state_untouched() {
        let mut meter = Meter::new(MeterConfig::new(2, 48000)).unwrap();
        meter.add_frames(&sine(48000, 2, 997.0, 0.5, 48000)).unwrap();
        let before = meter.integrated_loudness().unwrap();

        assert!(matches!(
            meter.add_frames(&[0.9_f32; 5]),
            Err(MeterError::ChannelCountMismatch(_))
        ));
        assert_eq!(meter.frames_processed().unwrap(), 48000);
        assert_eq!(meter.integrated_loudness().unwrap(), before);
    }

    #[test]
    fn test_planar_matches_interleaved() {
        let interleaved = sine(48000, 2, 440.0, 0.3, 72000);
        let left: Vec<f32> = interleaved.iter().step_by(2).copied().collect();
        let right = left.clone();

        let mut a = Meter::new(MeterConfig::new(2, 48000)).unwrap();
        a.add_frames(&interleaved).unwrap();
        let mut b = Meter::new(MeterConfig::new(2, 48000)).unwrap();
        b.add_frames_planar(&[left.as_slice(), right.as_slice()])
            .unwrap();

        assert_eq!(a.integrated_loudness(), b.integrated_loudness());
        assert_eq!(a.frames_processed(), b.frames_processed());
    }

    #[test]
    fn test_planar_mismatch() {
        let mut meter = Meter::new(MeterConfig::new(2, 48000)).unwrap();
        let plane = vec![0.0_f32; 100];
        let short = vec![0.0_f32; 99];

        assert!(matches!(
            meter.add_frames_planar(&[plane.as_slice()]),
            Err(MeterError::ChannelCountMismatch(_))
        ));
        assert!(matches!(
            meter.add_frames_planar(&[plane.as_slice(), short.as_slice()]),
            Err(MeterError::ChannelCountMismatch(_))
        ));
        assert_eq!(meter.frames_processed().unwrap(), 0);
    }

    #[test]
    fn test_integer_samples() {
        let float = sine(48000, 1, 997.0, 0.25, 48000);
        let ints: Vec<i16> = float.iter().map(|&s| (s * 32768.0) as i16).collect();

        let mut a = Meter::new(MeterConfig::new(1, 48000)).unwrap();
        a.add_frames(&float).unwrap();
        let mut b = Meter::new(MeterConfig::new(1, 48000)).unwrap();
        b.add_frames(&ints).unwrap();

        let diff = a.integrated_loudness().unwrap() - b.integrated_loudness().unwrap();
        assert!(diff.abs() < 0.01, "diff {diff}");
    }

    #[test]
    fn test_mode_not_enabled() {
        let mut meter = Meter::create(1, 48000, Mode::Integrated).unwrap();
        meter.add_frames(&sine(48000, 1, 997.0, 0.5, 192000)).unwrap();
        assert!(meter.integrated_loudness().is_ok());
        assert_eq!(
            meter.loudness_range(),
            Err(MeterError::ModeNotEnabled("loudness range"))
        );

        let meter = Meter::create(1, 48000, Mode::Range).unwrap();
        assert!(matches!(
            meter.integrated_loudness(),
            Err(MeterError::ModeNotEnabled(_))
        ));
    }

    #[test]
    fn test_lfe_channel_is_ignored() {
        let config = MeterConfig::new(2, 48000).with_layout(vec![Channel::Left, Channel::Lfe]);
        let mut with_lfe = Meter::new(config).unwrap();
        let mut mono = Meter::new(MeterConfig::new(1, 48000)).unwrap();

        let tone = sine(48000, 1, 997.0, 0.5, 96000);
        let loud_lfe: Vec<f32> = tone.iter().flat_map(|&s| [s, 0.9]).collect();
        with_lfe.add_frames(&loud_lfe).unwrap();
        mono.add_frames(&tone).unwrap();

        let diff = with_lfe.integrated_loudness().unwrap() - mono.integrated_loudness().unwrap();
        assert!(diff.abs() < 1e-9, "diff {diff}");
    }

    #[test]
    fn test_histogram_history_close_to_full() {
        let tone = sine(44100, 2, 997.0, 0.2, 220500);
        let mut full = Meter::new(MeterConfig::new(2, 44100)).unwrap();
        let mut hist =
            Meter::new(MeterConfig::new(2, 44100).with_history(HistoryMode::Histogram)).unwrap();
        full.add_frames(&tone).unwrap();
        hist.add_frames(&tone).unwrap();

        let diff = full.integrated_loudness().unwrap() - hist.integrated_loudness().unwrap();
        assert!(diff.abs() < 0.1, "diff {diff}");
    }

    #[test]
    fn test_reset() {
        let mut meter = Meter::new(MeterConfig::new(2, 48000)).unwrap();
        meter.add_frames(&sine(48000, 2, 997.0, 0.5, 48000)).unwrap();
        meter.reset().unwrap();

        assert_eq!(meter.frames_processed().unwrap(), 0);
        assert_eq!(meter.integrated_loudness(), Err(MeterError::InsufficientData));
    }

    #[test]
    fn test_destroy() {
        let mut meter = Meter::new(MeterConfig::new(2, 48000)).unwrap();
        meter.add_frames(&sine(48000, 2, 997.0, 0.5, 48000)).unwrap();
        meter.destroy();

        assert!(meter.is_destroyed());
        assert_eq!(meter.add_frames(&[0.0_f32; 2]), Err(MeterError::UseAfterDestroy));
        assert_eq!(meter.integrated_loudness(), Err(MeterError::UseAfterDestroy));
        assert_eq!(meter.loudness_range(), Err(MeterError::UseAfterDestroy));
        assert_eq!(meter.reset(), Err(MeterError::UseAfterDestroy));
        assert!(meter.summary().is_err());

        // Destroying twice is harmless
        meter.destroy();
    }

    #[test]
    fn test_summary_display() {
        let summary = LoudnessSummary {
            integrated_lufs: Some(-23.04),
            loudness_range_lu: None,
            duration_seconds: 12.0,
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(
            summary.to_string(),
            "Loudness: -23.0 LUFS, Range: n/a (12.0 s, 2 ch @ 48000 Hz)"
        );
    }
}
