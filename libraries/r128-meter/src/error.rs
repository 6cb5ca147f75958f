//! Error types for loudness metering

use thiserror::Error;

/// Result type for metering operations
pub type Result<T> = std::result::Result<T, MeterError>;

/// Errors that can occur while configuring, feeding or querying a meter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeterError {
    /// Bad channel count, sample rate or channel layout
    #[error("Invalid meter configuration: {0}")]
    InvalidConfig(String),

    /// Frame buffer does not match the configured channel count.
    /// The meter state is left untouched.
    #[error("Channel count mismatch: {0}")]
    ChannelCountMismatch(String),

    /// Not enough gating blocks survived to produce a value.
    /// Feeding more audio may make the measurement available.
    #[error("Not enough audio data for a loudness measurement")]
    InsufficientData,

    /// The requested measurement was not enabled when the meter was created
    #[error("Measurement mode not enabled: {0}")]
    ModeNotEnabled(&'static str),

    /// The meter was destroyed and holds no state anymore
    #[error("Meter used after it was destroyed")]
    UseAfterDestroy,

    /// A frame source failed to deliver audio
    #[error("Frame source error: {0}")]
    Source(String),
}

impl From<config::ConfigError> for MeterError {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
