use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VphyError;

pub const MAX_LANES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Tx, Direction::Rx];

    pub const fn index(self) -> usize {
        match self {
            Direction::Tx => 0,
            Direction::Rx => 1,
        }
    }
}

/// Transceiver channel: the four per-lane channels and the two quad-common PLL channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
    Cmn0,
    Cmn1,
}

impl ChannelId {
    pub const ALL: [ChannelId; 6] = [
        ChannelId::Ch1,
        ChannelId::Ch2,
        ChannelId::Ch3,
        ChannelId::Ch4,
        ChannelId::Cmn0,
        ChannelId::Cmn1,
    ];

    pub const fn index(self) -> usize {
        match self {
            ChannelId::Ch1 => 0,
            ChannelId::Ch2 => 1,
            ChannelId::Ch3 => 2,
            ChannelId::Ch4 => 3,
            ChannelId::Cmn0 => 4,
            ChannelId::Cmn1 => 5,
        }
    }

    pub const fn is_common(self) -> bool {
        matches!(self, ChannelId::Cmn0 | ChannelId::Cmn1)
    }

    /// Per-lane channel `n` (0-based).
    pub const fn lane(n: usize) -> Option<ChannelId> {
        match n {
            0 => Some(ChannelId::Ch1),
            1 => Some(ChannelId::Ch2),
            2 => Some(ChannelId::Ch3),
            3 => Some(ChannelId::Ch4),
            _ => None,
        }
    }

    /// The channel whose line rate reflects `pll`.
    pub const fn for_pll(pll: PllType) -> ChannelId {
        match pll {
            PllType::Cpll => ChannelId::Ch1,
            PllType::Qpll | PllType::Qpll0 => ChannelId::Cmn0,
            PllType::Qpll1 => ChannelId::Cmn1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PllType {
    Cpll,
    Qpll,
    Qpll0,
    Qpll1,
}

impl PllType {
    /// Whether a lock of `locked` satisfies a direction configured for `self`.
    pub fn is_served_by(self, locked: PllType) -> bool {
        match self {
            PllType::Qpll | PllType::Qpll0 => matches!(locked, PllType::Qpll | PllType::Qpll0),
            other => other == locked,
        }
    }
}

/// Bits per colour component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ColorDepth {
    Bpc6,
    #[default]
    Bpc8,
    Bpc10,
    Bpc12,
    Bpc16,
}

impl ColorDepth {
    pub const fn bits(self) -> u8 {
        match self {
            ColorDepth::Bpc6 => 6,
            ColorDepth::Bpc8 => 8,
            ColorDepth::Bpc10 => 10,
            ColorDepth::Bpc12 => 12,
            ColorDepth::Bpc16 => 16,
        }
    }
}

impl TryFrom<u8> for ColorDepth {
    type Error = VphyError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Ok(match bits {
            6 => ColorDepth::Bpc6,
            8 => ColorDepth::Bpc8,
            10 => ColorDepth::Bpc10,
            12 => ColorDepth::Bpc12,
            16 => ColorDepth::Bpc16,
            other => return Err(VphyError::InvalidColorDepth(other)),
        })
    }
}

impl From<ColorDepth> for u8 {
    fn from(depth: ColorDepth) -> u8 {
        depth.bits()
    }
}

impl fmt::Display for ColorDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PixelsPerClock {
    One,
    #[default]
    Two,
    Four,
}

impl PixelsPerClock {
    pub const fn count(self) -> u8 {
        match self {
            PixelsPerClock::One => 1,
            PixelsPerClock::Two => 2,
            PixelsPerClock::Four => 4,
        }
    }
}

impl TryFrom<u8> for PixelsPerClock {
    type Error = VphyError;

    fn try_from(count: u8) -> Result<Self, Self::Error> {
        Ok(match count {
            1 => PixelsPerClock::One,
            2 => PixelsPerClock::Two,
            4 => PixelsPerClock::Four,
            other => return Err(VphyError::InvalidPixelsPerClock(other)),
        })
    }
}

impl From<PixelsPerClock> for u8 {
    fn from(ppc: PixelsPerClock) -> u8 {
        ppc.count()
    }
}

impl fmt::Display for PixelsPerClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count())
    }
}
