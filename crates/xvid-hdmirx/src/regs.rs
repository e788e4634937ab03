//! RX core register map.
//!
//! Every interrupt source is a block with the same layout: `CTRL` (with set/clear aliases) and a
//! write-one-to-clear `STA` whose bit 0 summarises the block's pending events.

use xvid_platform::{RegisterBus, RegisterWindow};

use crate::irq::IrqSource;

pub const PIO: u32 = 0x100;
pub const TMR: u32 = 0x200;
pub const VTD: u32 = 0x300;
pub const DDC: u32 = 0x400;
pub const AUX: u32 = 0x500;
pub const AUD: u32 = 0x600;
pub const LNKSTA: u32 = 0x700;

pub const CTRL: u32 = 0x00;
pub const CTRL_SET: u32 = 0x04;
pub const CTRL_CLR: u32 = 0x08;
pub const STA: u32 = 0x0c;

pub const CTRL_RUN: u32 = 1 << 0;
pub const CTRL_IE: u32 = 1 << 1;

pub const STA_IRQ: u32 = 1 << 0;

pub const PIO_OUT: u32 = PIO + 0x10;
pub const PIO_OUT_SET: u32 = PIO + 0x14;
pub const PIO_OUT_CLR: u32 = PIO + 0x18;
pub const PIO_OUT_RESET: u32 = 1 << 0;
pub const PIO_OUT_LNK_EN: u32 = 1 << 1;
pub const PIO_OUT_VID_EN: u32 = 1 << 2;
pub const PIO_OUT_HPD: u32 = 1 << 3;

pub const PIO_IN: u32 = PIO + 0x20;
pub const PIO_IN_EVT: u32 = PIO + 0x24;
pub const PIO_IN_DET: u32 = 1 << 0;
pub const PIO_IN_LNK_RDY: u32 = 1 << 1;
pub const PIO_IN_VID_RDY: u32 = 1 << 2;
pub const PIO_IN_MODE: u32 = 1 << 3;
pub const PIO_IN_TMDS_CLOCK_RATIO: u32 = 1 << 4;

pub const TMR_CNT: u32 = TMR + 0x10;
pub const STA_TMR_EVT: u32 = 1 << 1;

pub const VTD_H_ACTIVE: u32 = VTD + 0x10;
pub const VTD_H_FRONT_PORCH: u32 = VTD + 0x14;
pub const VTD_H_SYNC_WIDTH: u32 = VTD + 0x18;
pub const VTD_H_BACK_PORCH: u32 = VTD + 0x1c;
pub const VTD_H_TOTAL: u32 = VTD + 0x20;
pub const VTD_V_ACTIVE: u32 = VTD + 0x24;
pub const VTD_F0_V_FRONT_PORCH: u32 = VTD + 0x28;
pub const VTD_F0_V_SYNC_WIDTH: u32 = VTD + 0x2c;
pub const VTD_F0_V_BACK_PORCH: u32 = VTD + 0x30;
pub const VTD_F0_V_TOTAL: u32 = VTD + 0x34;
pub const VTD_F1_V_FRONT_PORCH: u32 = VTD + 0x38;
pub const VTD_F1_V_SYNC_WIDTH: u32 = VTD + 0x3c;
pub const VTD_F1_V_BACK_PORCH: u32 = VTD + 0x40;
pub const VTD_F1_V_TOTAL: u32 = VTD + 0x44;
pub const VTD_SIG: u32 = VTD + 0x48;
pub const VTD_SIG_HSYNC_POS: u32 = 1 << 0;
pub const VTD_SIG_VSYNC_POS: u32 = 1 << 1;
pub const VTD_SIG_INTERLACED: u32 = 1 << 2;
pub const VTD_FRAME_RATE: u32 = VTD + 0x4c;
/// Colour format in bits 1:0, colour depth code in bits 4:2.
pub const VTD_VID_PROPS: u32 = VTD + 0x50;
/// Pixel clock as estimated by the core. Only used for diagnostics.
pub const VTD_PIXCLK: u32 = VTD + 0x54;
pub const STA_VTD_TIMEBASE_EVT: u32 = 1 << 1;

pub const STA_DDC_EDID_EVT: u32 = 1 << 1;
pub const STA_DDC_SCDC_EVT: u32 = 1 << 2;
pub const STA_DDC_HDCP_EVT: u32 = 1 << 3;

pub const AUX_DATA: u32 = AUX + 0x10;
pub const AUX_DATA_WORDS: u32 = 9;
pub const STA_AUX_NEW_EVT: u32 = 1 << 1;

pub const AUD_STATUS: u32 = AUD + 0x10;
pub const AUD_STATUS_ACTIVE: u32 = 1 << 0;
pub const AUD_CHANNELS: u32 = AUD + 0x14;
pub const STA_AUD_EVT: u32 = 1 << 1;

pub const LNKSTA_ERR_CNT: [u32; 3] = [LNKSTA + 0x10, LNKSTA + 0x14, LNKSTA + 0x18];
pub const STA_LNKSTA_ERR_EVT: u32 = 1 << 1;

pub const EDID_RAM: u32 = 0x800;

pub const WINDOW_BYTES: u32 = 0x1000;

/// Typed accessors over the RX core window.
#[derive(Debug, Clone)]
pub(crate) struct RxRegs {
    window: RegisterWindow,
    edid_ram_bytes: u32,
}

impl RxRegs {
    pub(crate) fn new(window: RegisterWindow, edid_ram_bytes: u32) -> Self {
        Self {
            window,
            edid_ram_bytes,
        }
    }

    pub(crate) fn read(&self, offset: u32) -> u32 {
        self.window.read(offset)
    }

    pub(crate) fn write(&self, offset: u32, value: u32) {
        self.window.write(offset, value)
    }

    pub(crate) fn intr_enable_all(&self) {
        for source in IrqSource::ALL {
            self.write(source.block() + CTRL_SET, CTRL_IE);
        }
    }

    pub(crate) fn intr_disable_all(&self) {
        for source in IrqSource::ALL {
            self.write(source.block() + CTRL_CLR, CTRL_IE);
        }
    }

    pub(crate) fn source_asserted(&self, source: IrqSource) -> bool {
        self.read(source.block() + CTRL) & CTRL_IE != 0
            && self.read(source.block() + STA) & STA_IRQ != 0
    }

    pub(crate) fn set_running(&self, source: IrqSource, run: bool) {
        let reg = if run { CTRL_SET } else { CTRL_CLR };
        self.write(source.block() + reg, CTRL_RUN);
    }

    pub(crate) fn set_out(&self, bits: u32, on: bool) {
        self.write(if on { PIO_OUT_SET } else { PIO_OUT_CLR }, bits);
    }

    pub(crate) fn set_hpd(&self, asserted: bool) {
        self.set_out(PIO_OUT_HPD, asserted);
    }

    /// Copies `data` into the EDID RAM, truncated to the RAM size and zero padded to a word.
    pub(crate) fn load_edid(&self, data: &[u8]) {
        let len = data.len().min(self.edid_ram_bytes as usize);
        if len < data.len() {
            tracing::warn!(
                len = data.len(),
                ram = self.edid_ram_bytes,
                "edid larger than the edid ram, truncating"
            );
        }
        for (index, chunk) in data[..len].chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.write(EDID_RAM + 4 * index as u32, u32::from_le_bytes(word));
        }
    }
}
