//! Lanes and consumer lane lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use xvid_platform::ResourceError;

use crate::coordinator::Vphy;
use crate::error::VphyError;

/// Lane-clock share cell value meaning "no sharing".
pub const NO_LANECLK_SHARE: u32 = u32::MAX;

/// The controller a lane is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerType {
    HdmiRx,
    HdmiTx,
    DisplayPortRx,
    DisplayPortTx,
}

impl TryFrom<u32> for ControllerType {
    type Error = VphyError;

    fn try_from(cell: u32) -> Result<Self, Self::Error> {
        Ok(match cell {
            0 => ControllerType::HdmiRx,
            1 => ControllerType::HdmiTx,
            2 => ControllerType::DisplayPortRx,
            3 => ControllerType::DisplayPortTx,
            other => return Err(VphyError::UnknownController(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneState {
    pub index: u8,
    pub controller: Option<ControllerType>,
    pub instance: u32,
    pub share_laneclk: Option<u32>,
    pub refclk_rate: u32,
    pub pll_lock: bool,
    pub init_count: u32,
}

impl LaneState {
    pub(crate) fn new(index: u8) -> Self {
        Self {
            index,
            controller: None,
            instance: 0,
            share_laneclk: None,
            refclk_rate: 0,
            pll_lock: false,
            init_count: 0,
        }
    }
}

/// A consumer's reference to one lane. Holds the PHY weakly.
#[derive(Debug, Clone)]
pub struct LaneHandle {
    phy: Weak<Vphy>,
    index: u8,
}

impl LaneHandle {
    pub(crate) fn new(phy: Weak<Vphy>, index: u8) -> Self {
        Self { phy, index }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// The coordinator that owns this lane, if it is still bound.
    pub fn coordinator(&self) -> Option<Arc<Vphy>> {
        self.phy.upgrade()
    }

    pub fn init(&self) -> Result<(), VphyError> {
        let phy = self.coordinator().ok_or(VphyError::Gone)?;
        let mut held = phy.acquire();
        let lane = held.lane_mut(self.index)?;
        lane.init_count += 1;
        tracing::debug!(device = %phy.name(), lane = self.index, count = lane.init_count, "lane init");
        Ok(())
    }

    pub fn exit(&self) {
        let Some(phy) = self.coordinator() else {
            return;
        };
        let mut held = phy.acquire();
        if let Ok(lane) = held.lane_mut(self.index) {
            lane.init_count = lane.init_count.saturating_sub(1);
            tracing::debug!(device = %phy.name(), lane = self.index, count = lane.init_count, "lane exit");
        }
    }
}

/// Resolves named lanes for a consumer device.
pub trait PhyProvider {
    fn get_phy(&self, consumer: &str, name: &str) -> Result<LaneHandle, ResourceError>;
}

#[derive(Debug)]
enum Entry {
    Bound {
        phy: Weak<Vphy>,
        lane: u8,
        cells: Vec<u32>,
    },
    Deferred,
}

/// Table of `(consumer, lane name)` to PHY lane bindings.
#[derive(Debug, Default)]
pub struct PhyRegistry {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl PhyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, consumer: &str, name: &str, phy: &Arc<Vphy>, lane: u8, cells: &[u32]) {
        self.lock().insert(
            (consumer.to_string(), name.to_string()),
            Entry::Bound {
                phy: Arc::downgrade(phy),
                lane,
                cells: cells.to_vec(),
            },
        );
    }

    /// Declares a lane whose PHY has not been probed yet.
    pub fn register_deferred(&self, consumer: &str, name: &str) {
        self.lock()
            .insert((consumer.to_string(), name.to_string()), Entry::Deferred);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PhyProvider for PhyRegistry {
    fn get_phy(&self, consumer: &str, name: &str) -> Result<LaneHandle, ResourceError> {
        let entries = self.lock();
        let key = (consumer.to_string(), name.to_string());
        match entries.get(&key) {
            None => Err(ResourceError::NotFound(name.to_string())),
            Some(Entry::Deferred) => Err(ResourceError::Deferred(name.to_string())),
            Some(Entry::Bound { phy, lane, cells }) => {
                let phy = phy
                    .upgrade()
                    .ok_or_else(|| ResourceError::Deferred(name.to_string()))?;
                phy.xlate(*lane, cells).map_err(|err| {
                    tracing::error!(consumer, lane = name, %err, "lane lookup failed");
                    ResourceError::Invalid(name.to_string(), "lane arguments rejected by the phy")
                })
            }
        }
    }
}
