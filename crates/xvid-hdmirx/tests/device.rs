use std::sync::Arc;

use xvid_hdmirx::{
    AudioStatus, AuxPacket, ColorFormat, EdidSource, HdmiRx, HdmiRxConfig, HdmiRxError,
    IrqSource, LinkState, MbusCode, MbusFormat, RxHardware, VideoMode, VideoStream,
    DEFAULT_EDID, EDID_BLOCK_SIZE, EDID_FIRMWARE, HDMIRX_LOCK,
};
use xvid_platform::{Clock, IrqReturn, LockOrderMonitor, PlatformDevice};
use xvid_vphy::{
    ColorDepth, Direction, PhyHardware, PhyRegistry, Vphy, VphyConfig, NO_LANECLK_SHARE,
};

const SUBSYSTEM_BYTES: u32 = 0x2_0000;
const RX_OFFSET: u32 = 0x1_0000;
const TMDS_CLOCK_HZ: u32 = 148_500_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Rig {
    phy_hw: PhyHardware,
    phy: Arc<Vphy>,
    monitor: Arc<LockOrderMonitor>,
    registry: PhyRegistry,
    hw: RxHardware,
}

impl Rig {
    fn new() -> Self {
        init_tracing();
        let phy_hw = PhyHardware::new();
        let monitor = LockOrderMonitor::new();
        let platform = PlatformDevice::new("vphy@a0000000")
            .with_mmio(0xa000_0000, 0x1_0000, phy_hw.registers())
            .with_irq(31)
            .with_clock(Clock::new("axi-lite", 100_000_000));
        let phy = Vphy::probe(VphyConfig::default(), &platform, Arc::clone(&monitor)).unwrap();
        phy_hw.attach(phy.irq_trigger().unwrap());

        let registry = PhyRegistry::new();
        for lane in 0..3u8 {
            let cells: &[u32] = if lane == 0 {
                &[0, 0, NO_LANECLK_SHARE, 0]
            } else {
                &[0, 0, 0, 0]
            };
            registry.register("hdmi-rx@a0020000", &format!("hdmi-phy{lane}"), &phy, lane, cells);
        }
        Rig {
            phy_hw,
            phy,
            monitor,
            registry,
            hw: RxHardware::new(SUBSYSTEM_BYTES, RX_OFFSET),
        }
    }

    fn platform(&self) -> PlatformDevice {
        PlatformDevice::new("hdmi-rx@a0020000")
            .with_mmio(0xa002_0000, u64::from(SUBSYSTEM_BYTES), self.hw.registers())
            .with_irq(90)
            .with_clock(Clock::new("video", 297_000_000))
            .with_clock(Clock::new("axi-lite", 100_000_000))
    }

    fn config() -> HdmiRxConfig {
        HdmiRxConfig {
            hdmi_rx_offset: RX_OFFSET,
            ..HdmiRxConfig::default()
        }
    }

    fn bind_with(&self, config: HdmiRxConfig, platform: &PlatformDevice) -> Result<HdmiRx, HdmiRxError> {
        let rx = HdmiRx::bind(config, platform, &self.registry)?;
        self.hw.attach(rx.irq_trigger().unwrap());
        Ok(rx)
    }

    fn bind(&self) -> HdmiRx {
        self.bind_with(Self::config(), &self.platform()).unwrap()
    }

    fn settle(&self, rx: &HdmiRx) {
        rx.synchronize_irq();
        self.phy.synchronize_irq();
        rx.synchronize_irq();
    }

    fn connect(&self, rx: &HdmiRx) {
        assert!(self.hw.plug());
        self.settle(rx);
        self.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ);
        self.settle(rx);
        self.phy_hw.reset_done(Direction::Rx);
        self.settle(rx);
    }

    /// Cable in, link trained, timing locked and video ready.
    fn bring_up(&self, rx: &HdmiRx, stream: &VideoStream) {
        self.connect(rx);
        assert!(self.hw.set_link_ready(true));
        self.settle(rx);
        assert!(self.hw.timer_expired());
        self.settle(rx);
        assert!(self.hw.lock_timing(stream));
        self.settle(rx);
        assert!(self.hw.set_video_ready(true));
        self.settle(rx);
    }
}

fn edid_blocks(blocks: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![fill; blocks * EDID_BLOCK_SIZE];
    data[0] = 0x00;
    data[1] = 0xff;
    data
}

#[test]
fn bind_loads_builtin_edid_and_enables_every_source() {
    let rig = Rig::new();
    let rx = rig.bind();

    assert_eq!(rig.hw.edid_ram(DEFAULT_EDID.len()), DEFAULT_EDID.to_vec());
    assert_eq!(rig.hw.interrupts_enabled(), IrqSource::ALL.to_vec());
    assert!(!rig.hw.hpd());
    assert!(!rig.hw.link_enabled());

    let status = rx.status();
    assert_eq!(status.link_state, LinkState::Disconnected);
    assert_eq!(status.edid_source, EdidSource::BuiltIn);
    assert_eq!(status.edid_blocks, 2);
    assert!(!status.stream_up);
}

#[test]
fn plug_connects_and_raises_hotplug() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);

    assert_eq!(rx.link_state(), LinkState::Connected);
    assert!(rig.hw.hpd());
    assert_eq!(rig.hw.hpd_assertions(), 1);
    assert!(rig.phy_hw.ibufds_enabled(Direction::Rx));
    assert!(rig.hw.link_enabled());

    let status = rx.status();
    assert_eq!(status.ref_clk_hz, u64::from(TMDS_CLOCK_HZ));
    assert!(status.line_rate_mbps > 0);
    assert_eq!(rx.stats().link.connects, 1);
}

#[test]
fn stream_comes_up_with_the_detected_timing() {
    let rig = Rig::new();
    let rx = rig.bind();
    let stream = VideoMode::Fhd1080p60.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    rig.bring_up(&rx, &stream);

    assert_eq!(rx.link_state(), LinkState::StreamUp);
    assert!(rig.hw.video_enabled());
    let timings = rx.query_dv_timings().unwrap();
    assert_eq!((timings.width, timings.height), (1920, 1080));
    assert_eq!(timings.pixelclock, 148_500_000);
    assert!(!timings.interlaced);

    let format = rx.get_format(0).unwrap();
    assert_eq!((format.width, format.height), (1920, 1080));
    assert_eq!(format.code, MbusCode::Rbg888_1x24);
    assert_eq!(rx.set_format(0, &MbusFormat::default()).unwrap(), format);

    let mmcm = rig.phy.acquire().mmcm(Direction::Rx).unwrap();
    assert_eq!(mmcm.video_clk_hz(), 74_250_000);
    assert!(rig.phy.acquire().mmcm_running(Direction::Rx));

    let stats = rx.stats();
    assert_eq!(stats.link.stream_inits, 1);
    assert_eq!(stats.link.stream_ups, 1);
    assert!(stats.bottom_halves >= 5);
    assert_eq!(stats.missing_snapshots, 0);
}

#[test]
fn deep_colour_422_is_clocked_as_8_bit() {
    let rig = Rig::new();
    let rx = rig
        .bind_with(
            HdmiRxConfig {
                max_bits_per_component: ColorDepth::Bpc12,
                ..Rig::config()
            },
            &rig.platform(),
        )
        .unwrap();
    let stream = VideoMode::Fhd1080p60.stream(ColorFormat::Ycrcb422, ColorDepth::Bpc12);
    rig.bring_up(&rx, &stream);

    assert_eq!(rx.link_state(), LinkState::StreamUp);
    assert_eq!(rx.detected_stream().unwrap().color_depth, ColorDepth::Bpc12);
    assert_eq!(rx.get_format(0).unwrap().code, MbusCode::Uyvy8_1x16);
    let mmcm = rig.phy.acquire().mmcm(Direction::Rx).unwrap();
    assert_eq!(mmcm.video_clk_hz(), 74_250_000);
}

#[test]
fn depth_above_the_maximum_is_clamped() {
    let rig = Rig::new();
    let rx = rig.bind();
    let stream = VideoMode::Hd720p60.stream(ColorFormat::Ycrcb444, ColorDepth::Bpc10);
    rig.bring_up(&rx, &stream);

    let detected = rx.detected_stream().unwrap();
    assert_eq!(detected.color_depth, ColorDepth::Bpc8);
    assert_eq!(detected.color_format, ColorFormat::Ycrcb444);
    assert_eq!(rx.get_format(0).unwrap().code, MbusCode::Vuy8_1x24);
}

#[test]
fn video_loss_reports_no_link() {
    let rig = Rig::new();
    let rx = rig.bind();
    let stream = VideoMode::Fhd1080p60.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    rig.bring_up(&rx, &stream);

    assert!(rig.hw.set_video_ready(false));
    rig.settle(&rx);

    assert_eq!(rx.link_state(), LinkState::Connected);
    assert!(!rx.status().stream_up);
    assert!(matches!(rx.query_dv_timings(), Err(HdmiRxError::NoLink)));
    assert!(matches!(rx.get_format(0), Err(HdmiRxError::NoLink)));
    assert!(rx.detected_stream().is_none());
    assert_eq!(rx.stats().link.stream_downs, 1);
}

#[test]
fn failed_reinit_does_not_bring_a_stream_up() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);
    assert!(rig.hw.set_link_ready(true));
    rig.settle(&rx);
    assert!(rig.hw.timer_expired());
    rig.settle(&rx);
    let good = VideoMode::Fhd1080p60.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    assert!(rig.hw.lock_timing(&good));
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::StreamInitializing);

    // A second timebase before video ready that the MMCM cannot clock.
    let unclockable = VideoMode::Fhd1080p60.stream(ColorFormat::Rgb, ColorDepth::Bpc6);
    assert!(rig.hw.lock_timing(&unclockable));
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::Connected);
    assert_eq!(rx.stats().link.init_failures, 1);
    assert!(!rig.hw.video_enabled());

    assert!(rig.hw.set_video_ready(true));
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::Connected);
    assert!(rx.detected_stream().is_none());
    assert!(matches!(rx.query_dv_timings(), Err(HdmiRxError::NoLink)));
    assert_eq!(rx.stats().link.stream_ups, 0);

    // The next clockable timing brings the stream up as usual.
    assert!(rig.hw.lock_timing(&good));
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::StreamInitializing);
    assert!(rig.hw.set_video_ready(false));
    rig.settle(&rx);
    assert!(rig.hw.set_video_ready(true));
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::StreamUp);
    assert_eq!(rx.detected_stream().unwrap().color_depth, ColorDepth::Bpc8);
}

#[test]
fn unplug_drops_the_stream_and_hotplug() {
    let rig = Rig::new();
    let rx = rig.bind();
    let stream = VideoMode::Fhd1080i60.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    rig.bring_up(&rx, &stream);
    assert!(rx.query_dv_timings().unwrap().interlaced);

    assert!(rig.hw.unplug());
    rig.settle(&rx);

    assert_eq!(rx.link_state(), LinkState::Disconnected);
    assert!(!rig.hw.hpd());
    assert!(!rig.hw.link_enabled());
    assert!(!rig.phy_hw.ibufds_enabled(Direction::Rx));
    assert_eq!(rig.phy.acquire().rx_tmds_clock_ratio(), 0);
    let stats = rx.stats();
    assert_eq!(stats.link.disconnects, 1);
    assert_eq!(stats.link.stream_downs, 1);
    assert_eq!(stats.link.rejected_transitions, 0);
}

#[test]
fn reference_clock_change_restarts_the_link() {
    let rig = Rig::new();
    let rx = rig.bind();
    let stream = VideoMode::Fhd1080p60.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    rig.bring_up(&rx, &stream);

    assert!(rig.hw.scdc_update(1));
    rig.settle(&rx);
    rig.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ / 4);
    rig.settle(&rx);

    assert_eq!(rx.link_state(), LinkState::Connected);
    assert!(!rig.hw.link_enabled());
    assert_eq!(rig.phy.acquire().rx_tmds_clock_ratio(), 1);
    assert_eq!(rx.status().tmds_clock_ratio, 1);
}

#[test]
fn side_channel_events_are_recorded() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);

    let packet = AuxPacket {
        header: 0x0d_0282,
        data: [1, 2, 3, 4, 5, 6, 7, 8],
    };
    assert!(rig.hw.aux_packet(&packet));
    rig.settle(&rx);
    assert!(rig.hw.audio(AudioStatus {
        active: true,
        channels: 2,
    }));
    rig.settle(&rx);
    assert!(rig.hw.link_errors([0, 3, 1]));
    rig.settle(&rx);

    let side = rx.side_channel();
    assert_eq!(side.last_aux, Some(packet));
    assert_eq!(side.last_aux.unwrap().packet_type(), 0x82);
    assert!(side.audio.active);
    assert_eq!(side.audio.channels, 2);
    assert_eq!(side.link_errors, [0, 3, 1]);

    let stats = rx.stats();
    assert_eq!(stats.link.aux_packets, 1);
    assert_eq!(stats.link.audio_events, 1);
    assert_eq!(stats.link.link_status_changes, 1);
    assert_eq!(stats.irq_causes[IrqSource::Aux.index()], 1);
}

#[test]
fn events_of_stopped_sources_are_dropped() {
    let rig = Rig::new();
    let rx = rig.bind();
    assert!(!rig.hw.timer_expired());
    let stream = VideoMode::Fhd1080p60.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    assert!(!rig.hw.lock_timing(&stream));
    rig.settle(&rx);
    assert_eq!(rx.stats().link.stream_inits, 0);
}

#[test]
fn edid_commit_supersedes_a_pending_one() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);
    assert_eq!(rig.hw.hpd_assertions(), 1);

    let first = edid_blocks(2, 0x11);
    let second = edid_blocks(1, 0x22);
    rx.set_edid(0, 0, &first).unwrap();
    assert!(!rig.hw.hpd());
    rx.set_edid(0, 0, &second).unwrap();
    assert!(!rig.hw.hpd());
    assert!(rx.hotplug_pending());

    assert!(rx.flush_hotplug());
    assert!(rig.hw.hpd());
    assert_eq!(rig.hw.hpd_assertions(), 2);
    assert_eq!(rx.stats().hotplug_assertions, 1);
    assert_eq!(rig.hw.edid_ram(EDID_BLOCK_SIZE), second);

    let edid = rx.get_edid(0, 0, 10).unwrap();
    assert_eq!(edid.blocks, 1);
    assert_eq!(edid.data, second);
    assert_eq!(rx.status().edid_source, EdidSource::User);
}

#[test]
fn connect_during_an_edid_commit_keeps_hotplug_low() {
    let rig = Rig::new();
    let rx = rig.bind();
    rx.set_edid(0, 0, &edid_blocks(1, 0x33)).unwrap();

    assert!(rig.hw.plug());
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::Connected);
    assert!(!rig.hw.hpd());

    assert!(rx.flush_hotplug());
    assert!(rig.hw.hpd());
}

#[test]
fn hotplug_fires_after_the_delay() {
    let rig = Rig::new();
    let rx = rig
        .bind_with(
            HdmiRxConfig {
                hotplug_delay_ms: 5,
                ..Rig::config()
            },
            &rig.platform(),
        )
        .unwrap();
    rx.set_edid(0, 0, &edid_blocks(1, 0x44)).unwrap();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !rig.hw.hpd() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(rig.hw.hpd());
    assert!(!rx.hotplug_pending());
}

#[test]
fn rejected_edid_leaves_everything_alone() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);

    let err = rx.set_edid(0, 0, &edid_blocks(11, 0x55)).unwrap_err();
    assert!(matches!(err, HdmiRxError::TooManyBlocks { max: 2 }));
    let err = rx.set_edid(0, 0, &[0u8; 100]).unwrap_err();
    assert!(matches!(err, HdmiRxError::InvalidArgument(_)));
    assert!(matches!(rx.set_edid(1, 0, &edid_blocks(1, 0)), Err(HdmiRxError::InvalidPad(1))));
    assert!(matches!(
        rx.set_edid(0, 1, &edid_blocks(1, 0)),
        Err(HdmiRxError::InvalidArgument(_))
    ));

    assert!(rig.hw.hpd());
    assert!(!rx.hotplug_pending());
    assert_eq!(rx.status().edid_source, EdidSource::BuiltIn);
    assert_eq!(rig.hw.edid_ram(DEFAULT_EDID.len()), DEFAULT_EDID.to_vec());
}

#[test]
fn empty_edid_reverts_to_builtin_and_hotplug_returns() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);
    let user = edid_blocks(1, 0x66);
    rx.set_edid(0, 0, &user).unwrap();
    assert!(rx.flush_hotplug());
    assert_eq!(rig.hw.edid_ram(EDID_BLOCK_SIZE), user);

    rx.set_edid(0, 0, &[]).unwrap();
    assert!(!rig.hw.hpd());
    assert!(rx.hotplug_pending());
    assert_eq!(rig.hw.edid_ram(DEFAULT_EDID.len()), DEFAULT_EDID.to_vec());
    let status = rx.status();
    assert_eq!(status.edid_source, EdidSource::BuiltIn);
    assert_eq!(status.edid_blocks, 2);

    assert!(rx.flush_hotplug());
    assert!(rig.hw.hpd());

    // A later cable cycle raises hotplug on connect again.
    assert!(rig.hw.unplug());
    rig.settle(&rx);
    assert!(!rig.hw.hpd());
    assert!(rig.hw.plug());
    rig.settle(&rx);
    assert!(rig.hw.hpd());
    assert_eq!(rx.get_edid(0, 0, 2).unwrap().data, DEFAULT_EDID.to_vec());
}

#[test]
fn get_edid_with_zero_blocks_reports_the_size() {
    let rig = Rig::new();
    let rx = rig.bind();

    let edid = rx.get_edid(0, 0, 0).unwrap();
    assert_eq!(edid.blocks, 2);
    assert!(edid.data.is_empty());
    let edid = rx.get_edid(0, 0, 1).unwrap();
    assert_eq!(edid.data, DEFAULT_EDID[..EDID_BLOCK_SIZE].to_vec());
    assert!(matches!(rx.get_edid(0, 2, 1), Err(HdmiRxError::InvalidArgument(_))));
    assert!(matches!(rx.get_edid(3, 0, 1), Err(HdmiRxError::InvalidPad(3))));
}

#[test]
fn pad_operations_describe_the_receiver() {
    let rig = Rig::new();
    let rx = rig.bind();

    let cap = rx.dv_timings_cap(0).unwrap();
    assert_eq!((cap.max_width, cap.max_height), (4096, 2160));
    let sizes = rx.enum_frame_size(0).unwrap();
    assert_eq!((sizes.min_width, sizes.max_width), (1, 4096));
    assert_eq!((sizes.min_height, sizes.max_height), (1, 2160));
    assert!(matches!(rx.enum_frame_size(1), Err(HdmiRxError::InvalidPad(1))));
    assert!(rx.s_stream(true).is_ok());
    assert!(matches!(rx.get_format(0), Err(HdmiRxError::NoLink)));
}

#[test]
fn bottom_half_during_teardown_changes_nothing() {
    let rig = Rig::new();
    let rx = rig.bind();
    rig.connect(&rx);
    let before = rx.stats();

    // Latch a real unplug cause, then tear down before the bottom half runs.
    rig.hw.mask_line(true);
    assert!(rig.hw.unplug());
    assert_eq!(rx.run_top_half(), IrqReturn::WakeThread);
    assert!(rig.hw.interrupts_enabled().is_empty());
    rx.begin_teardown();
    assert_eq!(rx.run_bottom_half(), IrqReturn::Handled);

    assert_eq!(rx.link_state(), LinkState::Connected);
    assert!(rig.hw.hpd());
    assert!(rig.phy_hw.ibufds_enabled(Direction::Rx));
    assert!(rig.hw.interrupts_enabled().is_empty());
    let after = rx.stats();
    assert_eq!(after.top_halves, before.top_halves + 1);
    assert_eq!(after.bottom_halves, before.bottom_halves);
    assert_eq!(after.missing_snapshots, 0);
    assert_eq!(after.irq_causes, before.irq_causes);
    assert_eq!(after.link, before.link);

    // The interrupt thread stays out of it as well.
    rig.hw.mask_line(false);
    rig.hw.resample();
    rig.settle(&rx);
    assert_eq!(rx.link_state(), LinkState::Connected);
    assert_eq!(rx.stats().bottom_halves, before.bottom_halves);
}

#[test]
fn bottom_half_without_a_snapshot_is_counted() {
    let rig = Rig::new();
    let rx = rig.bind();

    assert_eq!(rx.run_bottom_half(), IrqReturn::None);
    let stats = rx.stats();
    assert_eq!(stats.missing_snapshots, 1);
    assert_eq!(stats.bottom_halves, 0);
    assert_eq!(rig.hw.interrupts_enabled(), IrqSource::ALL.to_vec());
}

#[test]
fn bind_defers_until_clocks_and_lanes_exist() {
    let rig = Rig::new();
    let platform = PlatformDevice::new("hdmi-rx@a0020000")
        .with_mmio(0xa002_0000, u64::from(SUBSYSTEM_BYTES), rig.hw.registers())
        .with_irq(90)
        .with_deferred_clock("video")
        .with_clock(Clock::new("axi-lite", 100_000_000));
    let err = HdmiRx::bind(Rig::config(), &platform, &rig.registry).unwrap_err();
    assert!(err.is_probe_deferred());

    let registry = PhyRegistry::new();
    registry.register_deferred("hdmi-rx@a0020000", "hdmi-phy0");
    let err = HdmiRx::bind(Rig::config(), &rig.platform(), &registry).unwrap_err();
    assert!(err.is_probe_deferred());

    let err = HdmiRx::bind(Rig::config(), &rig.platform(), &PhyRegistry::new()).unwrap_err();
    assert!(!err.is_probe_deferred());
}

#[test]
fn bind_rejects_a_core_outside_the_window() {
    let rig = Rig::new();
    let config = HdmiRxConfig {
        hdmi_rx_offset: SUBSYSTEM_BYTES - 0x800,
        ..Rig::config()
    };
    let err = HdmiRx::bind(config, &rig.platform(), &rig.registry).unwrap_err();
    assert!(matches!(err, HdmiRxError::AddressOutOfRange { .. }));

    let config = HdmiRxConfig {
        edid_ram_size: 200,
        ..Rig::config()
    };
    let err = HdmiRx::bind(config, &rig.platform(), &rig.registry).unwrap_err();
    assert!(matches!(err, HdmiRxError::InvalidConfig(_)));
}

#[test]
fn firmware_edid_is_used_when_valid() {
    let rig = Rig::new();
    let firmware = edid_blocks(1, 0x77);
    let platform = rig.platform().with_firmware(EDID_FIRMWARE, firmware.clone());
    let rx = rig.bind_with(Rig::config(), &platform).unwrap();

    let status = rx.status();
    assert_eq!(status.edid_source, EdidSource::Firmware);
    assert_eq!(status.edid_blocks, 1);
    assert_eq!(rig.hw.edid_ram(EDID_BLOCK_SIZE), firmware);
}

#[test]
fn bad_firmware_edid_falls_back_to_builtin() {
    let rig = Rig::new();
    let platform = rig.platform().with_firmware(EDID_FIRMWARE, vec![0u8; 100]);
    let rx = rig.bind_with(Rig::config(), &platform).unwrap();
    assert_eq!(rx.status().edid_source, EdidSource::BuiltIn);

    let rig = Rig::new();
    let platform = rig.platform().with_firmware(EDID_FIRMWARE, edid_blocks(3, 0));
    let rx = rig.bind_with(Rig::config(), &platform).unwrap();
    assert_eq!(rx.status().edid_source, EdidSource::BuiltIn);
    assert_eq!(rig.hw.edid_ram(DEFAULT_EDID.len()), DEFAULT_EDID.to_vec());
}

#[test]
fn remove_releases_lanes_and_the_phy_callbacks() {
    let rig = Rig::new();
    let mut rx = rig.bind();
    rig.connect(&rx);
    assert_eq!(rig.phy.acquire().lane(0).unwrap().init_count, 1);

    rx.remove();
    rx.remove();
    assert!(rig.hw.interrupts_enabled().is_empty());
    for lane in 0..3 {
        assert_eq!(rig.phy.acquire().lane(lane).unwrap().init_count, 0);
    }

    let before = rx.stats();
    rig.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ);
    rig.phy.synchronize_irq();
    assert_eq!(rx.stats().link, before.link);
}

#[test]
fn device_mutex_is_always_taken_before_the_phy() {
    let rig = Rig::new();
    let rx = rig.bind();
    let stream = VideoMode::Uhd2160p30.stream(ColorFormat::Rgb, ColorDepth::Bpc8);
    rig.bring_up(&rx, &stream);
    rx.set_edid(0, 0, &edid_blocks(1, 0x12)).unwrap();
    rig.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ);
    rig.settle(&rx);
    assert!(rig.hw.unplug());
    rig.settle(&rx);

    assert!(rig.monitor.violations().is_empty());
    assert!(rig.monitor.acquisitions() > 0);
    assert!(rig.monitor.held_by_current_thread().is_empty());
    assert!(HDMIRX_LOCK.rank() < xvid_vphy::VPHY_LOCK.rank());
}
