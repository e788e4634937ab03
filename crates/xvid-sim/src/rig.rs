//! A PHY and an HDMI receiver wired together over simulated hardware.

use std::sync::Arc;

use xvid_hdmirx::{HdmiRx, HdmiRxConfig, RxHardware, VideoStream};
use xvid_platform::{Clock, LockOrderMonitor, PlatformDevice};
use xvid_vphy::{Direction, PhyHardware, PhyRegistry, Vphy, VphyConfig, NO_LANECLK_SHARE};

use crate::ScenarioError;

pub const PHY_NAME: &str = "vphy@a0000000";
pub const RX_NAME: &str = "hdmi-rx-ss@a0100000";

const PHY_BASE: u64 = 0xa000_0000;
const PHY_WINDOW_BYTES: u64 = 0x1_0000;
const PHY_IRQ: u32 = 89;
const RX_BASE: u64 = 0xa010_0000;
const RX_IRQ: u32 = 90;

/// Bytes of the RX subsystem window; the RX core sits at `hdmi-rx-offset` inside it.
pub const RX_SUBSYSTEM_BYTES: u32 = 0x2_0000;

pub struct Rig {
    pub phy_hw: PhyHardware,
    pub phy: Arc<Vphy>,
    pub monitor: Arc<LockOrderMonitor>,
    pub registry: PhyRegistry,
    pub hw: RxHardware,
    pub rx: HdmiRx,
}

impl Rig {
    pub fn new(vphy: VphyConfig, hdmirx: HdmiRxConfig) -> Result<Self, ScenarioError> {
        Self::with_firmware(vphy, hdmirx, None)
    }

    /// Builds the rig, optionally handing `edid` to the receiver as its firmware EDID.
    pub fn with_firmware(
        vphy: VphyConfig,
        hdmirx: HdmiRxConfig,
        edid: Option<Vec<u8>>,
    ) -> Result<Self, ScenarioError> {
        let monitor = LockOrderMonitor::new();
        let phy_hw = PhyHardware::new();
        let phy_platform = PlatformDevice::new(PHY_NAME)
            .with_mmio(PHY_BASE, PHY_WINDOW_BYTES, phy_hw.registers())
            .with_irq(PHY_IRQ)
            .with_clock(Clock::new("axi-lite", 100_000_000));
        let phy = Vphy::probe(vphy, &phy_platform, Arc::clone(&monitor))?;
        if let Some(trigger) = phy.irq_trigger() {
            phy_hw.attach(trigger);
        }

        let registry = PhyRegistry::new();
        for lane in 0..3u8 {
            let share = if lane == 0 { NO_LANECLK_SHARE } else { 0 };
            registry.register(RX_NAME, &format!("hdmi-phy{lane}"), &phy, lane, &[0, 0, share, 0]);
        }

        let hw = RxHardware::new(RX_SUBSYSTEM_BYTES, hdmirx.hdmi_rx_offset);
        let mut rx_platform = PlatformDevice::new(RX_NAME)
            .with_mmio(RX_BASE, u64::from(RX_SUBSYSTEM_BYTES), hw.registers())
            .with_irq(RX_IRQ)
            .with_clock(Clock::new("video", 297_000_000))
            .with_clock(Clock::new("axi-lite", 100_000_000))
            .with_clock(Clock::new("dru-clk", 156_250_000));
        if let Some(edid) = edid {
            rx_platform = rx_platform.with_firmware(xvid_hdmirx::EDID_FIRMWARE, edid);
        }
        let rx = HdmiRx::bind(hdmirx, &rx_platform, &registry)?;
        if let Some(trigger) = rx.irq_trigger() {
            hw.attach(trigger);
        }
        tracing::debug!(phy = PHY_NAME, rx = RX_NAME, "rig ready");

        Ok(Self {
            phy_hw,
            phy,
            monitor,
            registry,
            hw,
            rx,
        })
    }

    /// Waits until neither interrupt thread has work queued. A PHY callback can queue RX work and
    /// the other way around, so the receiver is drained on both sides of the PHY.
    pub fn settle(&self) {
        self.rx.synchronize_irq();
        self.phy.synchronize_irq();
        self.rx.synchronize_irq();
    }

    /// Cable in, reference clock detected and RX transceivers out of reset.
    pub fn connect(&self, ref_clk_hz: u32) {
        self.hw.plug();
        self.settle();
        self.phy_hw.detect_clock(Direction::Rx, ref_clk_hz);
        self.settle();
        self.phy_hw.reset_done(Direction::Rx);
        self.settle();
    }

    /// Drives a connected receiver until `stream` is up.
    pub fn bring_up(&self, stream: &VideoStream) {
        self.hw.set_link_ready(true);
        self.settle();
        self.hw.timer_expired();
        self.settle();
        self.hw.lock_timing(stream);
        self.settle();
        self.hw.set_video_ready(true);
        self.settle();
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.rx.remove();
        self.phy.remove();
    }
}
