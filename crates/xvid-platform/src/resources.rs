//! Resource lookup for bus-attached devices.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::regs::RegisterBus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("resource `{0}` not found")]
    NotFound(String),

    /// The provider exists but is not ready yet; binding should be retried later.
    #[error("resource `{0}` not ready, retry later")]
    Deferred(String),

    #[error("resource `{0}` is invalid: {1}")]
    Invalid(String, &'static str),
}

impl ResourceError {
    pub fn is_deferred(&self) -> bool {
        matches!(self, ResourceError::Deferred(_))
    }
}

/// A memory-mapped register region.
#[derive(Clone)]
pub struct MmioResource {
    pub start: u64,
    pub size: u64,
    pub bus: Arc<dyn RegisterBus>,
}

impl MmioResource {
    /// Last addressable byte of the region (inclusive).
    pub fn end(&self) -> u64 {
        self.start + self.size.saturating_sub(1)
    }
}

impl fmt::Debug for MmioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmioResource")
            .field("start", &format_args!("{:#x}", self.start))
            .field("size", &format_args!("{:#x}", self.size))
            .finish_non_exhaustive()
    }
}

pub trait ResourceProvider {
    fn name(&self) -> &str;

    fn mmio(&self, index: usize) -> Result<MmioResource, ResourceError>;

    fn irq(&self, index: usize) -> Result<u32, ResourceError>;

    fn clock(&self, name: &str) -> Result<Arc<Clock>, ResourceError>;

    /// Looks up a firmware blob. Absence is not an error.
    fn firmware(&self, name: &str) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone)]
enum ClockSlot {
    Ready(Arc<Clock>),
    Deferred,
}

/// Static resource table for one device.
#[derive(Debug, Clone)]
pub struct PlatformDevice {
    name: String,
    mmio: Vec<MmioResource>,
    irqs: Vec<u32>,
    clocks: HashMap<String, ClockSlot>,
    firmware: HashMap<String, Vec<u8>>,
}

impl PlatformDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mmio: Vec::new(),
            irqs: Vec::new(),
            clocks: HashMap::new(),
            firmware: HashMap::new(),
        }
    }

    pub fn with_mmio(mut self, start: u64, size: u64, bus: Arc<dyn RegisterBus>) -> Self {
        self.mmio.push(MmioResource { start, size, bus });
        self
    }

    pub fn with_irq(mut self, line: u32) -> Self {
        self.irqs.push(line);
        self
    }

    pub fn with_clock(mut self, clock: Arc<Clock>) -> Self {
        self.clocks
            .insert(clock.name().to_string(), ClockSlot::Ready(clock));
        self
    }

    /// Declares a clock whose provider has not registered yet.
    pub fn with_deferred_clock(mut self, name: &str) -> Self {
        self.clocks.insert(name.to_string(), ClockSlot::Deferred);
        self
    }

    pub fn with_firmware(mut self, name: &str, data: Vec<u8>) -> Self {
        self.firmware.insert(name.to_string(), data);
        self
    }
}

impl ResourceProvider for PlatformDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn mmio(&self, index: usize) -> Result<MmioResource, ResourceError> {
        self.mmio
            .get(index)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("{}: mmio {index}", self.name)))
    }

    fn irq(&self, index: usize) -> Result<u32, ResourceError> {
        match self.irqs.get(index) {
            Some(0) => Err(ResourceError::Invalid(
                format!("{}: irq {index}", self.name),
                "line 0 is not a valid interrupt",
            )),
            Some(line) => Ok(*line),
            None => Err(ResourceError::NotFound(format!("{}: irq {index}", self.name))),
        }
    }

    fn clock(&self, name: &str) -> Result<Arc<Clock>, ResourceError> {
        match self.clocks.get(name) {
            Some(ClockSlot::Ready(clock)) => Ok(Arc::clone(clock)),
            Some(ClockSlot::Deferred) => Err(ResourceError::Deferred(name.to_string())),
            None => Err(ResourceError::NotFound(name.to_string())),
        }
    }

    fn firmware(&self, name: &str) -> Option<Vec<u8>> {
        self.firmware.get(name).cloned()
    }
}
