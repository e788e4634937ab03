mod harness;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;

use harness::{rig, stream, TMDS_CLOCK_HZ};
use xvid_hdmirx::{LinkState, VideoMode, HDMIRX_LOCK};
use xvid_vphy::{Direction, VPHY_LOCK};

const ROUNDS: usize = 200;

#[test]
fn concurrent_phy_and_rx_bottom_halves_keep_the_lock_order() {
    let rig = rig();
    rig.connect(TMDS_CLOCK_HZ);
    let phy_before = rig.phy.acquire().stats();
    let link_before = rig.rx.stats().link;
    let done = AtomicBool::new(false);
    let round = Barrier::new(2);
    let stream = stream(VideoMode::Fhd1080p60);
    let mut states = Vec::with_capacity(ROUNDS);

    std::thread::scope(|s| {
        // PHY side: a clock change and a transceiver reset run link-init and link-ready, which
        // take the device mutex from inside a PHY callback.
        s.spawn(|| {
            for _ in 0..ROUNDS {
                round.wait();
                rig.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ);
                rig.phy.synchronize_irq();
                rig.phy_hw.reset_done(Direction::Rx);
                rig.phy.synchronize_irq();
                round.wait();
            }
        });

        // Client side: status and EDID calls take the device mutex from a third thread.
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                let _ = rig.rx.status();
                let _ = rig.rx.query_dv_timings();
                let _ = rig.rx.get_edid(0, 0, 1);
                std::thread::yield_now();
            }
        });

        // RX side: stream bring-up configures the PHY clock from the RX bottom half, then a
        // cable cycle toggles the PHY input buffer while the PHY side tears the link down.
        for _ in 0..ROUNDS {
            rig.bring_up(&stream);
            states.push(rig.rx.link_state());
            round.wait();
            rig.hw.unplug();
            rig.settle();
            rig.hw.plug();
            rig.settle();
            round.wait();
            rig.settle();
        }
        done.store(true, Ordering::Release);
    });
    rig.settle();

    let violations = rig.monitor.violations();
    assert!(violations.is_empty(), "{violations:?}");
    assert!(HDMIRX_LOCK.rank() < VPHY_LOCK.rank());
    assert!(states.iter().all(|state| *state == LinkState::StreamUp), "{states:?}");
    assert_eq!(rig.rx.link_state(), LinkState::Connected);

    let rounds = ROUNDS as u64;
    let phy = rig.phy.acquire().stats();
    assert_eq!(phy.link_init[1] - phy_before.link_init[1], rounds);
    assert_eq!(phy.link_ready[1] - phy_before.link_ready[1], rounds);

    let stats = rig.rx.stats();
    assert_eq!(stats.link.stream_inits - link_before.stream_inits, rounds);
    assert_eq!(stats.link.stream_ups - link_before.stream_ups, rounds);
    assert_eq!(stats.link.stream_downs - link_before.stream_downs, rounds);
    assert_eq!(stats.link.disconnects - link_before.disconnects, rounds);
    assert_eq!(stats.link.connects - link_before.connects, rounds);
    assert_eq!(stats.link.init_failures, 0);
    assert_eq!(stats.link.rejected_transitions, 0);
    assert_eq!(stats.missing_snapshots, 0);
    assert!(stats.top_halves >= stats.bottom_halves);
}

#[test]
fn edid_commits_race_with_interrupts_without_deadlock() {
    let rig = rig();
    rig.connect(TMDS_CLOCK_HZ);

    std::thread::scope(|s| {
        s.spawn(|| {
            for round in 0..ROUNDS {
                let blocks = if round % 2 == 0 { 1 } else { 2 };
                rig.rx
                    .set_edid(0, 0, &xvid_sim::scenario::synthetic_edid(blocks))
                    .unwrap();
                if round % 3 == 0 {
                    rig.rx.flush_hotplug();
                }
            }
        });
        for _ in 0..ROUNDS {
            rig.hw.unplug();
            rig.hw.plug();
            rig.phy_hw.detect_clock(Direction::Rx, TMDS_CLOCK_HZ);
        }
    });
    rig.rx.flush_hotplug();
    rig.settle();

    assert!(rig.monitor.violations().is_empty());
    assert!(!rig.rx.hotplug_pending());
    assert!(rig.hw.hpd());
    assert_eq!(rig.rx.get_edid(0, 0, 10).unwrap().blocks, 2);
}
