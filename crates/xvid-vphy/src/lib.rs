//! Video PHY coordinator.
//!
//! One [`Vphy`] owns the transceiver quad shared by an HDMI receiver and transmitter. All shared
//! transceiver state sits behind a single mutex; [`Vphy::acquire`] hands out a [`VphyGuard`]
//! through which every lane/clock operation goes.
//!
//! Upper-layer drivers register a [`PhyLinkHandler`] per direction. The PHY's interrupt thread
//! invokes it with only the PHY mutex held; a handler that also needs its own device mutex must
//! release the guard, take its own mutex, and reacquire the PHY (see [`VphyGuard::release`]).

#![forbid(unsafe_code)]

mod config;
mod coordinator;
mod error;
mod lane;
pub mod mmcm;
mod model;
pub mod regs;
mod types;

pub use config::{TransceiverType, VphyConfig};
pub use coordinator::{
    ConfigStep, PhyLinkHandler, Vphy, VphyGuard, VphyStats, VphyVersion, VPHY_LOCK,
};
pub use error::VphyError;
pub use lane::{
    ControllerType, LaneHandle, LaneState, PhyProvider, PhyRegistry, NO_LANECLK_SHARE,
};
pub use mmcm::{MmcmParams, VcoRange};
pub use model::PhyHardware;
pub use types::{ChannelId, ColorDepth, Direction, PixelsPerClock, PllType, MAX_LANES};
