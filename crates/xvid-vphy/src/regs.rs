//! PHY register map.

use bitflags::bitflags;

use crate::types::Direction;

pub const VERSION: u32 = 0x000;

pub const IBUFDS_CTRL: u32 = 0x02c;
pub const IBUFDS_TX_CE: u32 = 1 << 0;
pub const IBUFDS_RX_CE: u32 = 1 << 1;

pub const INTR_EN: u32 = 0x110;
pub const INTR_DIS: u32 = 0x114;
pub const INTR_MASK: u32 = 0x118;
pub const INTR_STS: u32 = 0x11c;

pub const MMCM_TX: u32 = 0x120;
pub const MMCM_RX: u32 = 0x140;
pub const MMCM_CTRL: u32 = 0x0;
pub const MMCM_CTRL_START: u32 = 1 << 0;
pub const MMCM_MULT: u32 = 0x4;
pub const MMCM_DIV: u32 = 0x8;
pub const MMCM_CLKOUT0_DIV: u32 = 0xc;

pub const CLKDET_FREQ_TX: u32 = 0x218;
pub const CLKDET_FREQ_RX: u32 = 0x21c;

pub const WINDOW_BYTES: u32 = 0x400;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhyIntr: u32 {
        const TXRESET_DONE = 1 << 0;
        const RXRESET_DONE = 1 << 1;
        const CPLL_LOCK = 1 << 2;
        const QPLL0_LOCK = 1 << 3;
        const TXALIGN_DONE = 1 << 4;
        const QPLL1_LOCK = 1 << 5;
        const TX_CLKDET_FREQ_CHANGE = 1 << 6;
        const RX_CLKDET_FREQ_CHANGE = 1 << 7;
        const TX_TMR_TIMEOUT = 1 << 8;
        const RX_TMR_TIMEOUT = 1 << 9;
    }
}

pub const fn mmcm_base(direction: Direction) -> u32 {
    match direction {
        Direction::Tx => MMCM_TX,
        Direction::Rx => MMCM_RX,
    }
}

pub const fn clkdet_freq(direction: Direction) -> u32 {
    match direction {
        Direction::Tx => CLKDET_FREQ_TX,
        Direction::Rx => CLKDET_FREQ_RX,
    }
}

pub const fn ibufds_ce(direction: Direction) -> u32 {
    match direction {
        Direction::Tx => IBUFDS_TX_CE,
        Direction::Rx => IBUFDS_RX_CE,
    }
}
