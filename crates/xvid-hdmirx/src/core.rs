//! Baseline handlers of the RX core.
//!
//! These run from the interrupt bottom half with the device mutex held. They service one source
//! each, acknowledge its status, advance the core's bring-up phase and report the resulting link
//! events to an [`RxEvents`] implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use xvid_vphy::{ColorDepth, PixelsPerClock};

use crate::irq::IrqSource;
use crate::link::{AudioStatus, AuxPacket, RxEvents};
use crate::regs::{self, RxRegs, STA};
use crate::timing::{self, ColorFormat, VideoStream, VideoTiming};

/// Ticks of the link stabilisation timer, in core clock cycles.
const LINK_STABLE_TICKS: u32 = 10_000_000;

/// Bring-up phase of the RX core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorePhase {
    /// No cable, or cable without a locked link.
    Idle,
    AwaitLinkStable,
    AwaitTiming,
    /// Timing decoded and reported; waiting for video ready.
    Initialized,
    Up,
}

#[derive(Debug)]
pub(crate) struct RxCore {
    regs: RxRegs,
    pixels_per_clock: PixelsPerClock,
    max_bpc: ColorDepth,
    phase: CorePhase,
    connected: bool,
    stream: Option<VideoStream>,
    tmds_clock_ratio: u8,
    hdmi_mode: bool,
    ref_clk_hz: u64,
    line_rate_mbps: u64,
    /// Set while a new EDID is being committed; a connect must not raise hotplug then.
    hpd_hold: Arc<AtomicBool>,
}

impl RxCore {
    pub(crate) fn new(
        regs: RxRegs,
        pixels_per_clock: PixelsPerClock,
        max_bpc: ColorDepth,
        hpd_hold: Arc<AtomicBool>,
    ) -> Self {
        Self {
            regs,
            pixels_per_clock,
            max_bpc,
            phase: CorePhase::Idle,
            connected: false,
            stream: None,
            tmds_clock_ratio: 0,
            hdmi_mode: false,
            ref_clk_hz: 0,
            line_rate_mbps: 0,
            hpd_hold,
        }
    }

    pub(crate) fn phase(&self) -> CorePhase {
        self.phase
    }

    pub(crate) fn tmds_clock_ratio(&self) -> u8 {
        self.tmds_clock_ratio
    }

    pub(crate) fn is_hdmi_mode(&self) -> bool {
        self.hdmi_mode
    }

    /// Resets the core and starts the sources that run regardless of the link.
    pub(crate) fn cfg_initialize(&mut self) {
        self.regs.set_out(regs::PIO_OUT_RESET, true);
        self.regs.set_out(
            regs::PIO_OUT_RESET | regs::PIO_OUT_LNK_EN | regs::PIO_OUT_VID_EN | regs::PIO_OUT_HPD,
            false,
        );
        for source in [IrqSource::Pio, IrqSource::Ddc, IrqSource::Aux, IrqSource::Aud, IrqSource::LinkStatus] {
            self.regs.set_running(source, true);
        }
        self.phase = CorePhase::Idle;
        self.connected = false;
        self.stream = None;
    }

    pub(crate) fn service(&mut self, source: IrqSource, events: &mut dyn RxEvents) {
        let status = self.ack(source);
        match source {
            IrqSource::Pio => self.pio(events),
            IrqSource::Tmr => self.tmr(status),
            IrqSource::Vtd => self.vtd(status, events),
            IrqSource::Ddc => self.ddc(status),
            IrqSource::Aux => self.aux(status, events),
            IrqSource::Aud => self.aud(status, events),
            IrqSource::LinkStatus => self.link_status(status, events),
        }
    }

    fn ack(&self, source: IrqSource) -> u32 {
        let status = self.regs.read(source.block() + STA);
        self.regs.write(source.block() + STA, status);
        status
    }

    fn pio(&mut self, events: &mut dyn RxEvents) {
        let changed = self.regs.read(regs::PIO_IN_EVT);
        self.regs.write(regs::PIO_IN_EVT, changed);
        let input = self.regs.read(regs::PIO_IN);

        if changed & regs::PIO_IN_TMDS_CLOCK_RATIO != 0 {
            self.tmds_clock_ratio = u8::from(input & regs::PIO_IN_TMDS_CLOCK_RATIO != 0);
        }
        if changed & regs::PIO_IN_MODE != 0 {
            self.hdmi_mode = input & regs::PIO_IN_MODE != 0;
            tracing::debug!(hdmi = self.hdmi_mode, "rx mode changed");
        }
        if changed & regs::PIO_IN_DET != 0 {
            if input & regs::PIO_IN_DET != 0 {
                self.connect(events);
            } else {
                self.disconnect(events);
            }
        }
        if changed & regs::PIO_IN_LNK_RDY != 0 {
            if input & regs::PIO_IN_LNK_RDY != 0 {
                self.link_up();
            } else {
                self.link_down(events);
            }
        }
        if changed & regs::PIO_IN_VID_RDY != 0 {
            if input & regs::PIO_IN_VID_RDY != 0 {
                self.video_ready(events);
            } else if self.phase == CorePhase::Up {
                tracing::debug!("video lost");
                self.phase = CorePhase::AwaitTiming;
                events.on_stream_down();
            }
        }
    }

    fn connect(&mut self, events: &mut dyn RxEvents) {
        self.connected = true;
        self.tmds_clock_ratio = u8::from(self.regs.read(regs::PIO_IN) & regs::PIO_IN_TMDS_CLOCK_RATIO != 0);
        events.on_connect(true);
        if !self.hpd_hold.load(Ordering::Acquire) {
            self.regs.set_hpd(true);
        }
    }

    fn disconnect(&mut self, events: &mut dyn RxEvents) {
        self.connected = false;
        self.regs.set_hpd(false);
        self.stop_link();
        if self.phase >= CorePhase::Initialized {
            events.on_stream_down();
        }
        self.phase = CorePhase::Idle;
        self.stream = None;
        events.on_connect(false);
    }

    fn stop_link(&mut self) {
        self.regs.set_out(regs::PIO_OUT_LNK_EN | regs::PIO_OUT_VID_EN, false);
        self.regs.set_running(IrqSource::Tmr, false);
        self.regs.set_running(IrqSource::Vtd, false);
    }

    fn link_up(&mut self) {
        if !self.connected {
            tracing::debug!("link ready without a cable, ignoring");
            return;
        }
        self.phase = CorePhase::AwaitLinkStable;
        self.regs.write(regs::TMR_CNT, LINK_STABLE_TICKS);
        self.regs.set_running(IrqSource::Tmr, true);
    }

    fn link_down(&mut self, events: &mut dyn RxEvents) {
        tracing::debug!(phase = ?self.phase, "link lost");
        self.regs.set_out(regs::PIO_OUT_VID_EN, false);
        self.regs.set_running(IrqSource::Tmr, false);
        self.regs.set_running(IrqSource::Vtd, false);
        if self.phase >= CorePhase::Initialized {
            events.on_stream_down();
        }
        self.phase = CorePhase::Idle;
    }

    fn tmr(&mut self, status: u32) {
        if status & regs::STA_TMR_EVT == 0 {
            return;
        }
        self.regs.set_running(IrqSource::Tmr, false);
        if self.phase != CorePhase::AwaitLinkStable {
            tracing::debug!(phase = ?self.phase, "stale link timer");
            return;
        }
        self.phase = CorePhase::AwaitTiming;
        self.regs.set_running(IrqSource::Vtd, true);
    }

    fn vtd(&mut self, status: u32, events: &mut dyn RxEvents) {
        if status & regs::STA_VTD_TIMEBASE_EVT == 0 {
            return;
        }
        if self.phase < CorePhase::AwaitTiming {
            tracing::debug!(phase = ?self.phase, "timebase change before link is stable");
            return;
        }
        if self.phase == CorePhase::Up {
            events.on_stream_down();
        }
        self.regs.set_out(regs::PIO_OUT_VID_EN, false);
        let Some(stream) = self.read_stream() else {
            tracing::warn!("timing detector reported an incomplete timing, waiting for the next timebase");
            self.phase = CorePhase::AwaitTiming;
            return;
        };
        self.stream = Some(stream);
        self.phase = CorePhase::Initialized;
        if !events.on_stream_init(&stream) {
            self.phase = CorePhase::AwaitTiming;
            return;
        }
        self.regs.set_out(regs::PIO_OUT_VID_EN, true);
    }

    fn video_ready(&mut self, events: &mut dyn RxEvents) {
        match (self.phase, self.stream) {
            (CorePhase::Initialized, Some(stream)) => {
                self.phase = CorePhase::Up;
                let estimate = self.regs.read(regs::VTD_PIXCLK);
                tracing::debug!(
                    derived = stream.pixel_clock_hz(),
                    estimate,
                    "pixel clock"
                );
                events.on_stream_up(&stream);
            }
            (phase, _) => tracing::debug!(?phase, "video ready outside stream init"),
        }
    }

    fn ddc(&mut self, status: u32) {
        if status & regs::STA_DDC_SCDC_EVT != 0 {
            self.tmds_clock_ratio =
                u8::from(self.regs.read(regs::PIO_IN) & regs::PIO_IN_TMDS_CLOCK_RATIO != 0);
            tracing::debug!(ratio = self.tmds_clock_ratio, "scdc update");
        }
        if status & regs::STA_DDC_EDID_EVT != 0 {
            tracing::debug!("edid read by source");
        }
        if status & regs::STA_DDC_HDCP_EVT != 0 {
            tracing::debug!("hdcp ddc access");
        }
    }

    fn aux(&mut self, status: u32, events: &mut dyn RxEvents) {
        if status & regs::STA_AUX_NEW_EVT == 0 {
            return;
        }
        let header = self.regs.read(regs::AUX_DATA);
        let mut data = [0u32; (regs::AUX_DATA_WORDS - 1) as usize];
        for (index, word) in data.iter_mut().enumerate() {
            *word = self.regs.read(regs::AUX_DATA + 4 * (index as u32 + 1));
        }
        events.on_auxiliary_packet(&AuxPacket { header, data });
    }

    fn aud(&mut self, status: u32, events: &mut dyn RxEvents) {
        if status & regs::STA_AUD_EVT == 0 {
            return;
        }
        events.on_audio_event(AudioStatus {
            active: self.regs.read(regs::AUD_STATUS) & regs::AUD_STATUS_ACTIVE != 0,
            channels: self.regs.read(regs::AUD_CHANNELS),
        });
    }

    fn link_status(&mut self, status: u32, events: &mut dyn RxEvents) {
        if status & regs::STA_LNKSTA_ERR_EVT == 0 {
            return;
        }
        let errors = regs::LNKSTA_ERR_CNT.map(|offset| self.regs.read(offset));
        events.on_link_status_change(errors);
    }

    /// Decodes the timing detector. Returns `None` while the totals or the frame rate are zero.
    fn read_stream(&self) -> Option<VideoStream> {
        let r = |offset| self.regs.read(offset);
        let sig = r(regs::VTD_SIG);
        let timing = VideoTiming {
            h_active: r(regs::VTD_H_ACTIVE),
            h_front_porch: r(regs::VTD_H_FRONT_PORCH),
            h_sync_width: r(regs::VTD_H_SYNC_WIDTH),
            h_back_porch: r(regs::VTD_H_BACK_PORCH),
            h_total: r(regs::VTD_H_TOTAL),
            h_sync_positive: sig & regs::VTD_SIG_HSYNC_POS != 0,
            v_active: r(regs::VTD_V_ACTIVE),
            f0_pv_front_porch: r(regs::VTD_F0_V_FRONT_PORCH),
            f0_pv_sync_width: r(regs::VTD_F0_V_SYNC_WIDTH),
            f0_pv_back_porch: r(regs::VTD_F0_V_BACK_PORCH),
            f0_pv_total: r(regs::VTD_F0_V_TOTAL),
            f1_v_front_porch: r(regs::VTD_F1_V_FRONT_PORCH),
            f1_v_sync_width: r(regs::VTD_F1_V_SYNC_WIDTH),
            f1_v_back_porch: r(regs::VTD_F1_V_BACK_PORCH),
            f1_v_total: r(regs::VTD_F1_V_TOTAL),
            v_sync_positive: sig & regs::VTD_SIG_VSYNC_POS != 0,
        };
        let frame_rate = r(regs::VTD_FRAME_RATE);
        if timing.h_total == 0 || timing.f0_pv_total == 0 || frame_rate == 0 {
            return None;
        }
        let props = r(regs::VTD_VID_PROPS);
        let reported = timing::depth_from_code((props >> 2) & 0x7).unwrap_or_else(|| {
            tracing::warn!(props, "unknown colour depth code, assuming 8 bits");
            ColorDepth::Bpc8
        });
        let color_depth = if reported.bits() > self.max_bpc.bits() {
            tracing::warn!(%reported, max = %self.max_bpc, "colour depth above the synthesized maximum");
            self.max_bpc
        } else {
            reported
        };
        Some(VideoStream {
            timing,
            color_format: ColorFormat::from_code(props),
            color_depth,
            pixels_per_clock: self.pixels_per_clock,
            frame_rate,
            interlaced: sig & regs::VTD_SIG_INTERLACED != 0,
        })
    }

    /// The reference clock is about to change: drop the link and capture the TMDS clock ratio
    /// the source signalled. Returns that ratio.
    pub(crate) fn ref_clock_change_init(&mut self, events: &mut dyn RxEvents) -> u8 {
        self.tmds_clock_ratio =
            u8::from(self.regs.read(regs::PIO_IN) & regs::PIO_IN_TMDS_CLOCK_RATIO != 0);
        self.stop_link();
        if self.phase >= CorePhase::Initialized {
            events.on_stream_down();
        }
        self.phase = CorePhase::Idle;
        self.tmds_clock_ratio
    }

    /// Programs the stream parameters once the PHY reports the RX transceivers ready.
    pub(crate) fn set_stream(&mut self, ref_clk_hz: u64, line_rate_mbps: u64) {
        self.ref_clk_hz = ref_clk_hz;
        self.line_rate_mbps = line_rate_mbps;
        tracing::debug!(ref_clk_hz, line_rate_mbps, "rx stream configured");
        self.regs.set_out(regs::PIO_OUT_LNK_EN, true);
    }

    pub(crate) fn ref_clk_hz(&self) -> u64 {
        self.ref_clk_hz
    }

    pub(crate) fn line_rate_mbps(&self) -> u64 {
        self.line_rate_mbps
    }
}
