//! Channel roles and their BS.1770 loudness weights
//!
//! Each input channel is assigned a role. The role decides how much the
//! channel's energy contributes to the combined loudness:
//!
//! | Role                               | Weight          |
//! |------------------------------------|-----------------|
//! | Left, Right, Center                | 1.0             |
//! | Left/Right surround, ±90° sides    | 1.41 (+1.5 dB)  |
//! | Dual mono                          | 2.0             |
//! | LFE, unused                        | 0.0 (excluded)  |

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Position of an input channel (ITU-R BS.1770-4 naming)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Left, or ITU M+030
    Left,
    /// Right, or ITU M-030
    Right,
    /// Center, or ITU M+000
    Center,
    /// Left surround, or ITU M+110
    LeftSurround,
    /// Right surround, or ITU M-110
    RightSurround,
    /// ITU M+090
    LeftSide,
    /// ITU M-090
    RightSide,
    /// Mono content that is reproduced on two loudspeakers
    DualMono,
    /// Low-frequency effects, never part of the loudness sum
    Lfe,
    /// Channel carried in the stream but ignored for loudness
    Unused,
}

impl Channel {
    /// Loudness weighting coefficient for this channel
    pub fn weight(self) -> f64 {
        match self {
            Self::Left | Self::Right | Self::Center => 1.0,
            Self::LeftSurround | Self::RightSurround | Self::LeftSide | Self::RightSide => 1.41,
            Self::DualMono => 2.0,
            Self::Lfe | Self::Unused => 0.0,
        }
    }
}

/// Positional default order: L, R, C, LFE, Ls, Rs
const DEFAULT_ORDER: [Channel; 6] = [
    Channel::Left,
    Channel::Right,
    Channel::Center,
    Channel::Lfe,
    Channel::LeftSurround,
    Channel::RightSurround,
];

/// Ordered channel roles of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelLayout(Vec<Channel>);

impl ChannelLayout {
    /// Build a layout from explicit roles
    pub fn new(channels: Vec<Channel>) -> Self {
        Self(channels)
    }

    /// Default layout for `channels` inputs.
    ///
    /// Roles are assigned by position only. Channels past the sixth have no
    /// standard position and are marked [`Channel::Unused`].
    pub fn default_for(channels: usize) -> Self {
        if channels > DEFAULT_ORDER.len() {
            warn!(
                "No default role for channels {}..{}, treating them as unused",
                DEFAULT_ORDER.len(),
                channels
            );
        }

        let roles = (0..channels)
            .map(|i| DEFAULT_ORDER.get(i).copied().unwrap_or(Channel::Unused))
            .collect();
        Self(roles)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.0
    }

    /// Role of one channel, if the index is in range
    pub fn get(&self, index: usize) -> Option<Channel> {
        self.0.get(index).copied()
    }

    /// Per-channel weights in channel order
    pub fn weights(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.weight()).collect()
    }
}

impl From<Vec<Channel>> for ChannelLayout {
    fn from(channels: Vec<Channel>) -> Self {
        Self::new(channels)
    }
}

/// Weight of `channel_index` within `layout`.
///
/// Indices outside the layout carry no weight.
pub fn weight(channel_index: usize, layout: &ChannelLayout) -> f64 {
    layout.get(channel_index).map_or(0.0, Channel::weight)
}
