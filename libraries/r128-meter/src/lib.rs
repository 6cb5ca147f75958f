//! Streaming loudness metering per ITU-R BS.1770-4 and EBU R128
//!
//! This crate provides:
//! - K-weighted, channel-weighted energy measurement in 100 ms steps
//! - Gated integrated loudness (LUFS)
//! - Loudness range (LRA, in LU) per EBU Tech 3342
//! - Exact or constant-memory (histogram) gating history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Audio Data  │ ──► │  FilterBank  │ ──► │ BlockAccumulator │
//! └─────────────┘     │ (K-weighting)│     │  (100 ms hops)   │
//!                     └──────────────┘     └──────────────────┘
//!                                                   │
//!                            ┌──────────────────────┴───────┐
//!                            ▼                              ▼
//!                   ┌─────────────────┐           ┌─────────────────┐
//!                   │ 400 ms blocks   │           │ 3 s blocks      │
//!                   │ GatingHistory   │           │ GatingHistory   │
//!                   └─────────────────┘           └─────────────────┘
//!                            │                              │
//!                            ▼                              ▼
//!                    Integrated LUFS                 Loudness Range
//! ```
//!
//! # Example
//!
//! ```ignore
//! use r128_meter::{Meter, Mode};
//!
//! let mut meter = Meter::create(2, 48000, Mode::Both)?;
//! meter.add_frames(&interleaved_samples)?;
//!
//! println!("Integrated loudness: {:.1} LUFS", meter.integrated_loudness()?);
//! println!("Loudness range: {:.1} LU", meter.loudness_range()?);
//! ```

#![deny(unsafe_code)]

pub mod block;
pub mod channel;
pub mod config;
mod error;
pub mod filter;
pub mod gating;
mod meter;
mod source;

pub use crate::channel::{Channel, ChannelLayout};
pub use crate::config::{HistoryMode, MeterConfig, Mode};
pub use error::{MeterError, Result};
pub use meter::{LoudnessSummary, Meter, Sample};
pub use source::{measure, measure_with, FrameSource, InterleavedSource, DEFAULT_BLOCK_FRAMES};

/// EBU R128 broadcast reference level (-23 LUFS)
pub const EBU_R128_BROADCAST_LUFS: f64 = -23.0;

/// Maximum permitted deviation from the broadcast target, in LU
pub const EBU_R128_TOLERANCE_LU: f64 = 1.0;
