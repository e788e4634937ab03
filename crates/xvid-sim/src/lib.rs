//! Scenario runner for the video PHY and HDMI receiver models.
//!
//! A [`Rig`] probes a [`xvid_vphy::Vphy`] and binds an [`xvid_hdmirx::HdmiRx`] to it over
//! simulated register files. A [`Scenario`] drives the rig step by step from JSON and returns a
//! [`Report`] of what the receiver saw.

#![forbid(unsafe_code)]

pub mod rig;
pub mod scenario;

use std::path::PathBuf;

use thiserror::Error;
use xvid_hdmirx::{HdmiRxError, LinkState};
use xvid_vphy::VphyError;

pub use rig::Rig;
pub use scenario::{Report, Scenario, Step, StepRecord};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("video phy: {0}")]
    Phy(#[from] VphyError),

    #[error("hdmi rx: {0}")]
    Rx(#[from] HdmiRxError),

    #[error("step {step}: expected link state {expected}, found {actual}")]
    Expectation {
        step: usize,
        expected: LinkState,
        actual: LinkState,
    },

    #[error("{0} lock order violation(s) recorded")]
    LockOrder(usize),
}

impl Scenario {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ScenarioError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|source| ScenarioError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_json(&text)
    }
}
