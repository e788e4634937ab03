use std::time::Duration;

use serde::{Deserialize, Serialize};
use xvid_vphy::{ColorDepth, PixelsPerClock};

use crate::edid::{EDID_BLOCKS_MAX, EDID_BLOCK_SIZE};
use crate::error::HdmiRxError;

fn default_max_bits_per_component() -> ColorDepth {
    ColorDepth::Bpc8
}

fn default_edid_ram_size() -> u32 {
    2 * EDID_BLOCK_SIZE as u32
}

fn default_hotplug_delay_ms() -> u64 {
    100
}

/// HDMI RX subsystem configuration, keyed like the device-tree node it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HdmiRxConfig {
    #[serde(default)]
    pub input_pixels_per_clock: PixelsPerClock,
    #[serde(default = "default_max_bits_per_component")]
    pub max_bits_per_component: ColorDepth,
    /// Offset of the RX core inside the subsystem register window.
    pub hdmi_rx_offset: u32,
    /// EDID RAM size in bytes.
    #[serde(default = "default_edid_ram_size")]
    pub edid_ram_size: u32,
    #[serde(default = "default_hotplug_delay_ms")]
    pub hotplug_delay_ms: u64,
}

impl Default for HdmiRxConfig {
    fn default() -> Self {
        Self {
            input_pixels_per_clock: PixelsPerClock::default(),
            max_bits_per_component: default_max_bits_per_component(),
            hdmi_rx_offset: 0,
            edid_ram_size: default_edid_ram_size(),
            hotplug_delay_ms: default_hotplug_delay_ms(),
        }
    }
}

impl HdmiRxConfig {
    pub fn validate(&self) -> Result<(), HdmiRxError> {
        if self.hdmi_rx_offset % 4 != 0 {
            return Err(HdmiRxError::InvalidConfig("hdmi-rx-offset must be 4-byte aligned"));
        }
        if self.edid_ram_size % EDID_BLOCK_SIZE as u32 != 0 {
            return Err(HdmiRxError::InvalidConfig(
                "edid-ram-size must be a multiple of 128",
            ));
        }
        if !(1..=EDID_BLOCKS_MAX).contains(&self.edid_blocks_max()) {
            return Err(HdmiRxError::InvalidConfig(
                "edid-ram-size must hold between 1 and 10 blocks",
            ));
        }
        if self.max_bits_per_component == ColorDepth::Bpc6 {
            return Err(HdmiRxError::InvalidConfig(
                "max-bits-per-component must be 8, 10, 12 or 16",
            ));
        }
        Ok(())
    }

    pub fn edid_blocks_max(&self) -> u32 {
        self.edid_ram_size / EDID_BLOCK_SIZE as u32
    }

    pub fn hotplug_delay(&self) -> Duration {
        Duration::from_millis(self.hotplug_delay_ms)
    }
}
