//! HDMI receiver subsystem driver.
//!
//! [`HdmiRx`] binds to an HDMI RX subsystem and the three RX lanes of a [`xvid_vphy::Vphy`].
//! It runs the receiver's link state machine from the core's interrupt sources, programs the
//! PHY's RX video clock for each detected stream, and serves the EDID to the source with
//! deferred hotplug.
//!
//! Two mutexes are involved: the device mutex ([`HDMIRX_LOCK`]) and the PHY mutex. The device
//! mutex is always taken first. PHY callbacks arrive with the PHY mutex held and hand it off
//! before taking the device mutex.
//!
//! [`RxHardware`] is a register-level model of the subsystem for driving the receiver without
//! hardware.

#![forbid(unsafe_code)]

mod config;
mod core;
mod device;
mod edid;
mod error;
mod irq;
mod link;
mod model;
pub mod regs;
mod timing;

pub use crate::config::HdmiRxConfig;
pub use crate::core::CorePhase;
pub use crate::device::{HdmiRx, RxStats, RxStatus, HDMIRX_LOCK};
pub use crate::edid::{
    EdidData, EdidSource, EdidStore, DEFAULT_EDID, EDID_BLOCKS_MAX, EDID_BLOCK_SIZE, EDID_FIRMWARE,
};
pub use crate::error::HdmiRxError;
pub use crate::irq::{CauseSnapshot, IrqSource};
pub use crate::link::{
    AudioStatus, AuxPacket, LinkState, LinkStateMachine, LinkStats, RxEvents, SideChannel,
};
pub use crate::model::RxHardware;
pub use crate::timing::{
    ColorFormat, Colorspace, DvCapabilities, DvFlags, DvTimings, DvTimingsCap, Field,
    FrameSizeRange, MbusCode, MbusFormat, Polarities, Standards, VideoMode, VideoStream,
    VideoTiming,
};
