//! Meter configuration
//!
//! A [`MeterConfig`] is fixed for the lifetime of a meter. It can be built in
//! code or loaded from a file plus `R128_METER_*` environment overrides:
//!
//! ```toml
//! channels = 2
//! sample_rate = 48000
//! mode = "both"          # integrated | range | both
//! history = "full"       # full | histogram
//! layout = ["left", "right"]
//! ```

use crate::channel::{Channel, ChannelLayout};
use crate::error::{MeterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "R128_METER";

/// Lowest sample rate that still yields one sample per 100 ms hop
pub const MIN_SAMPLE_RATE: u32 = 10;

/// Which measurements a meter maintains history for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Integrated loudness only (400 ms gating blocks)
    Integrated,
    /// Loudness range only (3 s gating blocks)
    Range,
    /// Both measurements
    #[default]
    Both,
}

impl Mode {
    pub fn integrated(self) -> bool {
        matches!(self, Self::Integrated | Self::Both)
    }

    pub fn range(self) -> bool {
        matches!(self, Self::Range | Self::Both)
    }

    /// Parse from string (for settings persistence)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "integrated" | "i" => Some(Self::Integrated),
            "range" | "lra" => Some(Self::Range),
            "both" | "all" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integrated => "integrated",
            Self::Range => "range",
            Self::Both => "both",
        }
    }
}

/// How gating blocks are retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Every gating block is kept exactly. Memory grows with stream duration.
    #[default]
    Full,
    /// Gating blocks are counted in 0.1 LU bins. Memory is constant, results
    /// are quantised to the bin width.
    Histogram,
}

/// Immutable configuration of a loudness meter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Number of interleaved/planar channels
    pub channels: u32,

    /// Sample rate in Hz
    pub sample_rate: u32,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub history: HistoryMode,

    /// Explicit channel roles. `None` uses the positional default.
    #[serde(default)]
    pub layout: Option<ChannelLayout>,
}

impl MeterConfig {
    /// Configuration measuring both integrated loudness and loudness range
    pub fn new(channels: u32, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            mode: Mode::default(),
            history: HistoryMode::default(),
            layout: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn with_layout(mut self, layout: impl Into<ChannelLayout>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    /// Load configuration from a file, then apply environment overrides
    /// (`R128_METER_CHANNELS`, `R128_METER_SAMPLE_RATE`, ...).
    ///
    /// The file format is picked from the extension (toml, json, yaml).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading meter configuration from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(MeterError::InvalidConfig(
                "channel count must be at least 1".to_string(),
            ));
        }

        if self.sample_rate == 0 {
            return Err(MeterError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }

        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(MeterError::InvalidConfig(format!(
                "sample rate {} Hz is too low for 100 ms blocks (minimum {} Hz)",
                self.sample_rate, MIN_SAMPLE_RATE
            )));
        }

        if let Some(layout) = &self.layout {
            if layout.len() != self.channels as usize {
                return Err(MeterError::InvalidConfig(format!(
                    "layout has {} channels but the meter has {}",
                    layout.len(),
                    self.channels
                )));
            }
        }

        Ok(())
    }

    /// Channel layout in effect (explicit or positional default)
    pub fn resolved_layout(&self) -> ChannelLayout {
        self.layout
            .clone()
            .unwrap_or_else(|| ChannelLayout::default_for(self.channels as usize))
    }

    /// Samples per channel in one 100 ms hop (truncated)
    pub fn hop_frames(&self) -> usize {
        self.sample_rate as usize / 10
    }

    /// Role of a channel under the resolved layout
    pub fn channel(&self, index: usize) -> Option<Channel> {
        self.resolved_layout().get(index)
    }
}
