//! HDMI link state machine.
//!
//! The RX core reports link events through [`RxEvents`]; [`LinkStateMachine`] turns them into
//! link state, drives the PHY for the receive direction, and caches what was detected for the
//! client API. All methods run with the device mutex held. The PHY mutex is only ever taken
//! inside them, after the device mutex.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xvid_vphy::{ChannelId, Direction, Vphy};

use crate::timing::{DvTimings, MbusFormat, VideoStream};

/// One method per event the RX core reports.
pub trait RxEvents {
    fn on_connect(&mut self, connected: bool);

    /// A stable timing was decoded; video clocking must be set up for it. Returns `false` when
    /// the bring-up was abandoned and no stream will follow from this timing.
    fn on_stream_init(&mut self, stream: &VideoStream) -> bool;

    fn on_stream_up(&mut self, stream: &VideoStream);

    fn on_stream_down(&mut self);

    /// Character error counters of the three TMDS channels changed.
    fn on_link_status_change(&mut self, errors: [u32; 3]);

    fn on_auxiliary_packet(&mut self, packet: &AuxPacket);

    fn on_audio_event(&mut self, status: AudioStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuxPacket {
    pub header: u32,
    pub data: [u32; 8],
}

impl AuxPacket {
    /// InfoFrame / data island packet type.
    pub fn packet_type(&self) -> u8 {
        self.header as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioStatus {
    pub active: bool,
    pub channels: u32,
}

/// Metadata captured from the informational events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SideChannel {
    pub last_aux: Option<AuxPacket>,
    pub audio: AudioStatus,
    pub link_errors: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    Disconnected,
    Connected,
    StreamInitializing,
    StreamUp,
    StreamDown,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connected => "connected",
            LinkState::StreamInitializing => "stream-initializing",
            LinkState::StreamUp => "stream-up",
            LinkState::StreamDown => "stream-down",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStats {
    pub connects: u64,
    pub disconnects: u64,
    pub stream_inits: u64,
    /// Stream inits abandoned because the PHY could not clock the stream.
    pub init_failures: u64,
    pub stream_ups: u64,
    pub stream_downs: u64,
    pub rejected_transitions: u64,
    pub aux_packets: u64,
    pub audio_events: u64,
    pub link_status_changes: u64,
}

pub struct LinkStateMachine {
    device: String,
    phy: Arc<Vphy>,
    state: LinkState,
    stream_up: bool,
    detected_format: MbusFormat,
    detected_timings: Option<DvTimings>,
    detected_stream: Option<VideoStream>,
    side: SideChannel,
    stats: LinkStats,
}

impl fmt::Debug for LinkStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkStateMachine")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("stream_up", &self.stream_up)
            .finish_non_exhaustive()
    }
}

impl LinkStateMachine {
    pub fn new(device: impl Into<String>, phy: Arc<Vphy>) -> Self {
        Self {
            device: device.into(),
            phy,
            state: LinkState::Disconnected,
            stream_up: false,
            detected_format: MbusFormat::default(),
            detected_timings: None,
            detected_stream: None,
            side: SideChannel::default(),
            stats: LinkStats::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_stream_up(&self) -> bool {
        self.stream_up
    }

    pub fn is_connected(&self) -> bool {
        self.state != LinkState::Disconnected
    }

    /// The last detected format. Only meaningful while the stream is up.
    pub fn detected_format(&self) -> MbusFormat {
        self.detected_format
    }

    /// Detected timings, or `None` while the stream is down.
    pub fn detected_timings(&self) -> Option<DvTimings> {
        self.detected_timings.filter(|_| self.stream_up)
    }

    pub fn detected_stream(&self) -> Option<VideoStream> {
        self.detected_stream.filter(|_| self.stream_up)
    }

    pub fn side_channel(&self) -> SideChannel {
        self.side
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn transition(&mut self, to: LinkState) {
        tracing::debug!(device = %self.device, from = %self.state, %to, "link state");
        self.state = to;
    }

    fn reject(&mut self, event: &'static str) {
        self.stats.rejected_transitions += 1;
        tracing::warn!(device = %self.device, state = %self.state, event, "ignoring event in this link state");
    }

    fn stream_down(&mut self) {
        self.stream_up = false;
        self.stats.stream_downs += 1;
        self.transition(LinkState::StreamDown);
        self.transition(LinkState::Connected);
    }

    /// Programs the RX video clock for `stream`.
    fn configure_video_clock(&self, stream: &VideoStream) -> Result<(), xvid_vphy::VphyError> {
        let mut phy = self.phy.acquire();
        phy.configure_clock_params(
            Direction::Rx,
            ChannelId::Ch1,
            stream.pixels_per_clock,
            stream.clock_color_depth(),
        )?;
        phy.start_clock(Direction::Rx)
    }
}

impl RxEvents for LinkStateMachine {
    fn on_connect(&mut self, connected: bool) {
        let mut phy = self.phy.acquire();
        if connected {
            phy.ibufds_enable(Direction::Rx, true);
            drop(phy);
            if self.state != LinkState::Disconnected {
                tracing::debug!(device = %self.device, state = %self.state, "already connected");
                return;
            }
            self.stats.connects += 1;
            tracing::info!(device = %self.device, "cable connected");
            self.transition(LinkState::Connected);
        } else {
            phy.set_rx_tmds_clock_ratio(0);
            phy.ibufds_enable(Direction::Rx, false);
            drop(phy);
            if self.state == LinkState::Disconnected {
                return;
            }
            if self.stream_up {
                self.stream_up = false;
                self.stats.stream_downs += 1;
            }
            self.stats.disconnects += 1;
            tracing::info!(device = %self.device, "cable disconnected");
            self.transition(LinkState::Disconnected);
        }
    }

    fn on_stream_init(&mut self, stream: &VideoStream) -> bool {
        match self.state {
            LinkState::Connected | LinkState::StreamDown | LinkState::StreamInitializing => {}
            LinkState::StreamUp => {
                tracing::debug!(device = %self.device, "stream renegotiated");
                self.stream_down();
            }
            LinkState::Disconnected => {
                self.reject("stream-init");
                return false;
            }
        }
        self.stats.stream_inits += 1;
        if let Err(err) = self.configure_video_clock(stream) {
            self.stats.init_failures += 1;
            tracing::warn!(
                device = %self.device,
                %err,
                format = ?stream.color_format,
                depth = %stream.color_depth,
                "cannot clock the stream, abandoning bring-up"
            );
            // The previous init's clock no longer matches the decoded timing.
            if self.state == LinkState::StreamInitializing {
                self.transition(LinkState::Connected);
            }
            return false;
        }
        self.transition(LinkState::StreamInitializing);
        true
    }

    fn on_stream_up(&mut self, stream: &VideoStream) {
        if self.state != LinkState::StreamInitializing {
            return self.reject("stream-up");
        }
        self.detected_format = stream.mbus_format();
        let timings = stream.dv_timings();
        self.detected_timings = Some(timings);
        self.detected_stream = Some(*stream);
        self.stream_up = true;
        self.stats.stream_ups += 1;
        self.transition(LinkState::StreamUp);
        tracing::info!(
            device = %self.device,
            width = timings.width,
            height = timings.height,
            interlaced = timings.interlaced,
            pixelclock = timings.pixelclock,
            frame_rate = stream.frame_rate,
            code = ?self.detected_format.code,
            "stream up"
        );
    }

    fn on_stream_down(&mut self) {
        match self.state {
            LinkState::StreamUp | LinkState::StreamInitializing => {
                tracing::info!(device = %self.device, "stream down");
                self.stream_down();
            }
            // A bring-up that was abandoned never left Connected.
            LinkState::Connected | LinkState::StreamDown => {
                tracing::debug!(device = %self.device, "stream down without a stream")
            }
            LinkState::Disconnected => self.reject("stream-down"),
        }
    }

    fn on_link_status_change(&mut self, errors: [u32; 3]) {
        self.stats.link_status_changes += 1;
        self.side.link_errors = errors;
        tracing::debug!(device = %self.device, ?errors, "link error counters");
    }

    fn on_auxiliary_packet(&mut self, packet: &AuxPacket) {
        self.stats.aux_packets += 1;
        self.side.last_aux = Some(*packet);
        tracing::trace!(device = %self.device, packet_type = packet.packet_type(), "aux packet");
    }

    fn on_audio_event(&mut self, status: AudioStatus) {
        self.stats.audio_events += 1;
        self.side.audio = status;
        tracing::debug!(device = %self.device, active = status.active, channels = status.channels, "audio");
    }
}
