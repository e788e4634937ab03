use thiserror::Error;
use xvid_platform::{IrqError, ResourceError};

use crate::types::{ChannelId, Direction};

#[derive(Debug, Error)]
pub enum VphyError {
    #[error("invalid phy configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Irq(#[from] IrqError),

    #[error("lane {0} does not exist")]
    NoSuchLane(u32),

    #[error("lane lookup expects 4 arguments, got {0}")]
    XlateArgs(usize),

    #[error("unknown controller type {0}")]
    UnknownController(u32),

    #[error("channel {channel:?} is not usable for {direction:?}")]
    InvalidChannel {
        direction: Direction,
        channel: ChannelId,
    },

    #[error("no {0:?} reference clock detected")]
    NoReferenceClock(Direction),

    #[error("no mmcm parameters for a {clkin_hz} Hz input at {ppc} ppc and {bpc} bpc")]
    MmcmParams { clkin_hz: u64, ppc: u8, bpc: u8 },

    #[error("{0:?} mmcm has not been configured")]
    MmcmNotConfigured(Direction),

    #[error("unsupported color depth {0}")]
    InvalidColorDepth(u8),

    #[error("unsupported pixels per clock {0}")]
    InvalidPixelsPerClock(u8),

    #[error("the phy has been removed")]
    Gone,
}

impl VphyError {
    pub fn is_probe_deferred(&self) -> bool {
        matches!(self, VphyError::Resource(err) if err.is_deferred())
    }
}
