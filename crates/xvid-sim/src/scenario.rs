//! JSON scenarios: a rig configuration plus a list of cable-side and client-side steps.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use xvid_hdmirx::{
    AudioStatus, AuxPacket, ColorFormat, DvTimings, EdidData, HdmiRxConfig, LinkState, RxStats,
    RxStatus, VideoMode, DEFAULT_EDID, EDID_BLOCK_SIZE,
};
use xvid_vphy::{ColorDepth, Direction, PllType, VphyConfig, VphyStats};

use crate::rig::Rig;
use crate::ScenarioError;

fn default_ref_clk_hz() -> u32 {
    148_500_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vphy: VphyConfig,
    #[serde(default)]
    pub hdmirx: HdmiRxConfig,
    /// Blocks offered as the firmware EDID at bind, if any.
    #[serde(default)]
    pub firmware_edid_blocks: Option<u32>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "op",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case",
    deny_unknown_fields
)]
pub enum Step {
    Plug,
    Unplug,
    /// The PHY clock detector reports a new RX reference clock.
    RefClock {
        #[serde(default = "default_ref_clk_hz")]
        hz: u32,
    },
    PllLock {
        pll: PllType,
    },
    /// RX transceivers left reset; the PHY reports the link ready.
    PhyReady,
    /// Plug, reference clock and transceiver reset in one go.
    Connect {
        #[serde(default = "default_ref_clk_hz")]
        ref_clk_hz: u32,
    },
    LinkReady {
        #[serde(default = "default_true")]
        ready: bool,
    },
    LinkTimer,
    Timing {
        mode: VideoMode,
        #[serde(default)]
        format: ColorFormat,
        #[serde(default)]
        depth: ColorDepth,
    },
    VideoReady {
        #[serde(default = "default_true")]
        ready: bool,
    },
    /// Link ready, stable timer, timing lock and video ready for a connected receiver.
    BringUp {
        mode: VideoMode,
        #[serde(default)]
        format: ColorFormat,
        #[serde(default)]
        depth: ColorDepth,
    },
    HdmiMode {
        #[serde(default = "default_true")]
        hdmi: bool,
    },
    Scdc {
        ratio: u8,
    },
    EdidRead,
    AuxPacket {
        header: u32,
        #[serde(default)]
        data: [u32; 8],
    },
    Audio {
        active: bool,
        #[serde(default)]
        channels: u32,
    },
    LinkErrors {
        counts: [u32; 3],
    },
    /// Replaces the EDID with `blocks` blocks cycled from the built-in set.
    SetEdid {
        blocks: u32,
    },
    GetEdid {
        #[serde(default)]
        blocks: u32,
    },
    FlushHotplug,
    Sleep {
        ms: u64,
    },
    QueryTimings,
    ExpectState {
        state: LinkState,
    },
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Step::Plug => "plug",
            Step::Unplug => "unplug",
            Step::RefClock { .. } => "ref-clock",
            Step::PllLock { .. } => "pll-lock",
            Step::PhyReady => "phy-ready",
            Step::Connect { .. } => "connect",
            Step::LinkReady { .. } => "link-ready",
            Step::LinkTimer => "link-timer",
            Step::Timing { .. } => "timing",
            Step::VideoReady { .. } => "video-ready",
            Step::BringUp { .. } => "bring-up",
            Step::HdmiMode { .. } => "hdmi-mode",
            Step::Scdc { .. } => "scdc",
            Step::EdidRead => "edid-read",
            Step::AuxPacket { .. } => "aux-packet",
            Step::Audio { .. } => "audio",
            Step::LinkErrors { .. } => "link-errors",
            Step::SetEdid { .. } => "set-edid",
            Step::GetEdid { .. } => "get-edid",
            Step::FlushHotplug => "flush-hotplug",
            Step::Sleep { .. } => "sleep",
            Step::QueryTimings => "query-timings",
            Step::ExpectState { .. } => "expect-state",
        }
    }
}

/// EDID of `blocks` blocks cycled from the built-in set.
pub fn synthetic_edid(blocks: u32) -> Vec<u8> {
    DEFAULT_EDID
        .chunks(EDID_BLOCK_SIZE)
        .cycle()
        .take(blocks as usize)
        .flatten()
        .copied()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepRecord {
    pub index: usize,
    pub op: &'static str,
    pub link_state: LinkState,
    pub hpd: bool,
    /// Whether the hardware model took the event; `false` when the source block was stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<DvTimings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edid: Option<EdidData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    pub scenario: String,
    pub steps: Vec<StepRecord>,
    pub status: RxStatus,
    pub rx: RxStats,
    pub phy: VphyStats,
    pub hpd_assertions: u64,
    pub lock_acquisitions: u64,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds a rig, runs every step and reports what the receiver saw. Client-side errors are
    /// recorded per step; only a failed expectation or a lock order violation aborts the run.
    pub fn run(&self) -> Result<Report, ScenarioError> {
        let firmware = self.firmware_edid_blocks.map(synthetic_edid);
        let rig = Rig::with_firmware(self.vphy.clone(), self.hdmirx.clone(), firmware)?;
        let name = self.name.clone().unwrap_or_else(|| "unnamed".to_string());
        tracing::info!(scenario = %name, steps = self.steps.len(), "running scenario");

        let mut records = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let mut record = StepRecord {
                index,
                op: step.op(),
                link_state: LinkState::Disconnected,
                hpd: false,
                accepted: None,
                timings: None,
                edid: None,
                error: None,
            };
            tracing::debug!(index, op = record.op, "step");
            apply(&rig, step, &mut record);
            rig.settle();
            record.link_state = rig.rx.link_state();
            record.hpd = rig.hw.hpd();

            if let Step::ExpectState { state } = step {
                if record.link_state != *state {
                    return Err(ScenarioError::Expectation {
                        step: index,
                        expected: *state,
                        actual: record.link_state,
                    });
                }
            }
            records.push(record);
        }

        let violations = rig.monitor.violations();
        if !violations.is_empty() {
            for violation in &violations {
                tracing::error!(?violation, "lock order violation");
            }
            return Err(ScenarioError::LockOrder(violations.len()));
        }

        let phy = rig.phy.acquire().stats();
        Ok(Report {
            scenario: name,
            steps: records,
            status: rig.rx.status(),
            rx: rig.rx.stats(),
            phy,
            hpd_assertions: rig.hw.hpd_assertions(),
            lock_acquisitions: rig.monitor.acquisitions(),
        })
    }
}

fn apply(rig: &Rig, step: &Step, record: &mut StepRecord) {
    let accepted = match *step {
        Step::Plug => Some(rig.hw.plug()),
        Step::Unplug => Some(rig.hw.unplug()),
        Step::RefClock { hz } => {
            rig.phy_hw.detect_clock(Direction::Rx, hz);
            None
        }
        Step::PllLock { pll } => {
            rig.phy_hw.lock_pll(pll);
            None
        }
        Step::PhyReady => {
            rig.phy_hw.reset_done(Direction::Rx);
            None
        }
        Step::Connect { ref_clk_hz } => {
            rig.connect(ref_clk_hz);
            None
        }
        Step::LinkReady { ready } => Some(rig.hw.set_link_ready(ready)),
        Step::LinkTimer => Some(rig.hw.timer_expired()),
        Step::Timing { mode, format, depth } => Some(rig.hw.lock_timing(&mode.stream(format, depth))),
        Step::VideoReady { ready } => Some(rig.hw.set_video_ready(ready)),
        Step::BringUp { mode, format, depth } => {
            rig.bring_up(&mode.stream(format, depth));
            None
        }
        Step::HdmiMode { hdmi } => Some(rig.hw.set_hdmi_mode(hdmi)),
        Step::Scdc { ratio } => Some(rig.hw.scdc_update(ratio)),
        Step::EdidRead => Some(rig.hw.edid_read()),
        Step::AuxPacket { header, data } => Some(rig.hw.aux_packet(&AuxPacket { header, data })),
        Step::Audio { active, channels } => Some(rig.hw.audio(AudioStatus { active, channels })),
        Step::LinkErrors { counts } => Some(rig.hw.link_errors(counts)),
        Step::SetEdid { blocks } => {
            if let Err(err) = rig.rx.set_edid(0, 0, &synthetic_edid(blocks)) {
                record.error = Some(err.to_string());
            }
            None
        }
        Step::GetEdid { blocks } => {
            match rig.rx.get_edid(0, 0, blocks) {
                Ok(edid) => record.edid = Some(edid),
                Err(err) => record.error = Some(err.to_string()),
            }
            None
        }
        Step::FlushHotplug => {
            rig.rx.flush_hotplug();
            None
        }
        Step::Sleep { ms } => {
            std::thread::sleep(Duration::from_millis(ms));
            None
        }
        Step::QueryTimings => {
            match rig.rx.query_dv_timings() {
                Ok(timings) => record.timings = Some(timings),
                Err(err) => record.error = Some(err.to_string()),
            }
            None
        }
        Step::ExpectState { .. } => None,
    };
    record.accepted = accepted;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse_with_defaults() {
        let scenario = Scenario::from_json(
            r#"{
                "name": "defaults",
                "hdmirx": { "hdmi-rx-offset": 0 },
                "steps": [
                    { "op": "connect" },
                    { "op": "bring-up", "mode": "1920x1080p60" },
                    { "op": "timing", "mode": "1920x1080i60", "format": "ycrcb422", "depth": 10 },
                    { "op": "set-edid", "blocks": 1 },
                    { "op": "expect-state", "state": "stream-up" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.steps.len(), 5);
        assert!(matches!(
            scenario.steps[0],
            Step::Connect {
                ref_clk_hz: 148_500_000
            }
        ));
        assert!(matches!(
            scenario.steps[2],
            Step::Timing {
                mode: VideoMode::Fhd1080i60,
                format: ColorFormat::Ycrcb422,
                depth: ColorDepth::Bpc10,
            }
        ));
        assert!(matches!(
            scenario.steps[4],
            Step::ExpectState {
                state: LinkState::StreamUp
            }
        ));
    }

    #[test]
    fn unknown_ops_are_rejected() {
        let err = Scenario::from_json(r#"{ "steps": [ { "op": "reboot" } ] }"#).unwrap_err();
        assert!(matches!(err, ScenarioError::Parse(_)));
    }

    #[test]
    fn synthetic_edid_cycles_the_builtin_blocks() {
        let edid = synthetic_edid(3);
        assert_eq!(edid.len(), 3 * EDID_BLOCK_SIZE);
        assert_eq!(edid[..256], DEFAULT_EDID[..]);
        assert_eq!(edid[256..], DEFAULT_EDID[..EDID_BLOCK_SIZE]);
        assert!(synthetic_edid(0).is_empty());
    }
}
