use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::resources::ResourceError;

/// A gateable clock with a fixed (but externally adjustable) rate.
#[derive(Debug)]
pub struct Clock {
    name: String,
    rate_hz: AtomicU64,
    enable_count: AtomicU32,
}

impl Clock {
    pub fn new(name: impl Into<String>, rate_hz: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rate_hz: AtomicU64::new(rate_hz),
            enable_count: AtomicU32::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate_hz(&self) -> u64 {
        self.rate_hz.load(Ordering::Relaxed)
    }

    pub fn set_rate_hz(&self, rate_hz: u64) {
        self.rate_hz.store(rate_hz, Ordering::Relaxed);
    }

    /// Enables the clock. A clock without a rate cannot be ungated.
    pub fn prepare_enable(&self) -> Result<(), ResourceError> {
        if self.rate_hz() == 0 {
            return Err(ResourceError::Invalid(self.name.clone(), "clock has no rate"));
        }
        let count = self.enable_count.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(clock = %self.name, count, "clock enabled");
        Ok(())
    }

    pub fn disable_unprepare(&self) {
        let previous = self
            .enable_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
        if previous.is_err() {
            tracing::warn!(clock = %self.name, "unbalanced clock disable");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_count.load(Ordering::Acquire) > 0
    }
}
