#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use xvid_hdmirx::{ColorFormat, HdmiRxConfig, VideoMode, VideoStream};
use xvid_sim::Rig;
use xvid_vphy::{ColorDepth, VphyConfig};

pub const TMDS_CLOCK_HZ: u32 = 148_500_000;

/// Routes library logs through the test writer. Filter with `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn rig() -> Rig {
    rig_with(HdmiRxConfig::default())
}

pub fn rig_with(hdmirx: HdmiRxConfig) -> Rig {
    init_tracing();
    Rig::new(VphyConfig::default(), hdmirx).expect("rig binds")
}

pub fn stream(mode: VideoMode) -> VideoStream {
    mode.stream(ColorFormat::Rgb, ColorDepth::Bpc8)
}
