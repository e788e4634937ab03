mod harness;

use harness::{rig, stream, TMDS_CLOCK_HZ};
use xvid_hdmirx::{CorePhase, HdmiRxError, LinkState, VideoMode};
use xvid_vphy::Direction;

#[test]
fn every_preset_comes_up_and_goes_down() {
    for mode in VideoMode::ALL {
        let rig = rig();
        rig.connect(TMDS_CLOCK_HZ);
        let stream = stream(mode);
        rig.bring_up(&stream);

        assert_eq!(rig.rx.link_state(), LinkState::StreamUp, "{mode:?}");
        let timings = rig.rx.query_dv_timings().unwrap();
        assert_eq!(timings.width, stream.timing.h_active);
        assert_eq!(timings.interlaced, mode.is_interlaced());
        assert_eq!(timings.pixelclock, stream.pixel_clock_hz());
        let status = rig.rx.status();
        assert_eq!(status.core_phase, CorePhase::Up);
        assert!(status.line_rate_mbps > 0);

        rig.hw.unplug();
        rig.settle();
        assert_eq!(rig.rx.link_state(), LinkState::Disconnected);
        assert!(matches!(rig.rx.query_dv_timings(), Err(HdmiRxError::NoLink)));
    }
}

#[test]
fn renegotiated_timing_replaces_the_stream() {
    let rig = rig();
    rig.connect(TMDS_CLOCK_HZ);
    rig.bring_up(&stream(VideoMode::Hd720p60));
    assert_eq!(rig.rx.get_format(0).unwrap().width, 1280);

    // A new timebase while up tears the stream down and initialises the new one.
    rig.hw.lock_timing(&stream(VideoMode::Fhd1080p60));
    rig.settle();
    assert_eq!(rig.rx.link_state(), LinkState::StreamInitializing);
    assert!(rig.rx.get_format(0).is_err());

    rig.hw.set_video_ready(false);
    rig.settle();
    rig.hw.set_video_ready(true);
    rig.settle();
    assert_eq!(rig.rx.link_state(), LinkState::StreamUp);
    assert_eq!(rig.rx.get_format(0).unwrap().width, 1920);

    let stats = rig.rx.stats();
    assert_eq!(stats.link.stream_ups, 2);
    assert_eq!(stats.link.stream_inits, 2);
    assert_eq!(stats.link.rejected_transitions, 0);
}

#[test]
fn link_loss_returns_to_connected() {
    let rig = rig();
    rig.connect(TMDS_CLOCK_HZ);
    rig.bring_up(&stream(VideoMode::Fhd1080p60));

    rig.hw.set_link_ready(false);
    rig.settle();
    assert_eq!(rig.rx.link_state(), LinkState::Connected);
    assert!(!rig.hw.video_enabled());
    assert_eq!(rig.rx.status().core_phase, CorePhase::Idle);

    // A fresh training cycle brings the same stream back.
    rig.hw.set_video_ready(false);
    rig.settle();
    rig.bring_up(&stream(VideoMode::Fhd1080p60));
    assert_eq!(rig.rx.link_state(), LinkState::StreamUp);
}

#[test]
fn phy_sees_the_rx_clock_and_ratio() {
    let rig = rig();
    rig.hw.plug();
    rig.settle();
    rig.hw.scdc_update(1);
    rig.settle();
    rig.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ / 4);
    rig.settle();
    rig.phy_hw.reset_done(Direction::Rx);
    rig.settle();

    let held = rig.phy.acquire();
    assert_eq!(held.rx_tmds_clock_ratio(), 1);
    assert_eq!(held.ref_clk_hz(Direction::Rx), u64::from(TMDS_CLOCK_HZ / 4));
    assert_eq!(held.stats().link_init, [0, 1]);
    assert_eq!(held.stats().link_ready, [0, 1]);
    drop(held);

    let status = rig.rx.status();
    assert_eq!(status.ref_clk_hz, u64::from(TMDS_CLOCK_HZ / 4));
    assert_eq!(status.line_rate_mbps, u64::from(TMDS_CLOCK_HZ / 4) * 40 / 1_000_000);
    assert!(rig.hw.link_enabled());
}
