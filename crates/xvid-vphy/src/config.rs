use serde::{Deserialize, Serialize};

use crate::error::VphyError;
use crate::mmcm::VcoRange;
use crate::types::{Direction, PixelsPerClock, PllType, MAX_LANES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverType {
    Gtxe2,
    Gtpe2,
    Gthe2,
    Gthe3,
    Gthe4,
    Gtye4,
}

impl TransceiverType {
    /// VCO range of the MMCM sitting next to this transceiver family.
    pub const fn mmcm_vco_range(self) -> VcoRange {
        match self {
            TransceiverType::Gtxe2 | TransceiverType::Gtpe2 | TransceiverType::Gthe2 => VcoRange {
                min_hz: 600_000_000,
                max_hz: 1_200_000_000,
            },
            TransceiverType::Gthe3 | TransceiverType::Gthe4 | TransceiverType::Gtye4 => VcoRange {
                min_hz: 800_000_000,
                max_hz: 1_600_000_000,
            },
        }
    }
}

fn default_lanes() -> u8 {
    MAX_LANES as u8
}

fn default_channels() -> u8 {
    3
}

/// PHY instance configuration, keyed like the device-tree node it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VphyConfig {
    pub transceiver_type: TransceiverType,
    pub input_pixels_per_clock: PixelsPerClock,
    #[serde(default = "default_channels")]
    pub rx_no_of_channels: u8,
    #[serde(default = "default_channels")]
    pub tx_no_of_channels: u8,
    pub rx_pll_selection: PllType,
    pub tx_pll_selection: PllType,
    /// TX readiness is signalled by alignment-done instead of reset-done.
    #[serde(default)]
    pub tx_buffer_bypass: bool,
    #[serde(default = "default_lanes")]
    pub lanes: u8,
}

impl Default for VphyConfig {
    fn default() -> Self {
        Self {
            transceiver_type: TransceiverType::Gthe4,
            input_pixels_per_clock: PixelsPerClock::Two,
            rx_no_of_channels: default_channels(),
            tx_no_of_channels: default_channels(),
            rx_pll_selection: PllType::Cpll,
            tx_pll_selection: PllType::Qpll0,
            tx_buffer_bypass: false,
            lanes: default_lanes(),
        }
    }
}

impl VphyConfig {
    pub fn validate(&self) -> Result<(), VphyError> {
        if self.lanes == 0 || usize::from(self.lanes) > MAX_LANES {
            return Err(VphyError::InvalidConfig("lanes must be between 1 and 4"));
        }
        for channels in [self.rx_no_of_channels, self.tx_no_of_channels] {
            if channels == 0 || usize::from(channels) > MAX_LANES {
                return Err(VphyError::InvalidConfig(
                    "channel count must be between 1 and 4",
                ));
            }
        }
        Ok(())
    }

    pub fn channels(&self, direction: Direction) -> u8 {
        match direction {
            Direction::Tx => self.tx_no_of_channels,
            Direction::Rx => self.rx_no_of_channels,
        }
    }

    pub fn pll_selection(&self, direction: Direction) -> PllType {
        match direction {
            Direction::Tx => self.tx_pll_selection,
            Direction::Rx => self.rx_pll_selection,
        }
    }
}
