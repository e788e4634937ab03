use thiserror::Error;
use xvid_platform::{IrqError, ResourceError, WorkError};
use xvid_vphy::VphyError;

#[derive(Debug, Error)]
pub enum HdmiRxError {
    #[error("invalid hdmi rx configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("hdmi rx core at offset {offset:#x} lies outside the {size:#x} byte subsystem window")]
    AddressOutOfRange { offset: u32, size: u64 },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Irq(#[from] IrqError),

    #[error(transparent)]
    Work(#[from] WorkError),

    #[error(transparent)]
    Phy(#[from] VphyError),

    #[error("lane {0} has no phy behind it")]
    PhyUnavailable(u8),

    #[error("pad {0} does not exist")]
    InvalidPad(u32),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no link")]
    NoLink,

    #[error("too many edid blocks, at most {max} are supported")]
    TooManyBlocks { max: u32 },

    #[error("edid firmware rejected: {0}")]
    InvalidEdid(&'static str),

    #[error("interrupt bottom half ran without a latched cause snapshot")]
    MissingCauseSnapshot,
}

impl HdmiRxError {
    /// A dependency is not ready yet; the bind may succeed when retried.
    pub fn is_probe_deferred(&self) -> bool {
        match self {
            HdmiRxError::Resource(err) => err.is_deferred(),
            HdmiRxError::Phy(err) => err.is_probe_deferred(),
            _ => false,
        }
    }
}
