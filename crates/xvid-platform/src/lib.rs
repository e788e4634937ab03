//! Platform plumbing shared by the video PHY and HDMI receiver models.
//!
//! Everything a bus-attached device needs from its host lives here:
//!
//! - [`regs`]: 32-bit register windows with write-one-to-clear and set/clear alias semantics.
//! - [`resources`]: MMIO/IRQ/clock/firmware lookup with probe deferral.
//! - [`irq`]: level-triggered interrupt lines with a hard half and a threaded half.
//! - [`work`]: a single-shot delayed work item (the hotplug timer).
//! - [`sync`]: mutexes that carry a lock class so acquisition order can be audited at runtime.

#![forbid(unsafe_code)]

pub mod clock;
pub mod irq;
pub mod regs;
pub mod resources;
pub mod sync;
pub mod work;

pub use clock::Clock;
pub use irq::{IrqError, IrqReturn, IrqStats, IrqTrigger, ThreadedIrq, ThreadedIrqHandler};
pub use regs::{RegisterBus, RegisterFile, RegisterKind, RegisterWindow};
pub use resources::{MmioResource, PlatformDevice, ResourceError, ResourceProvider};
pub use sync::{LockClass, LockOrderMonitor, LockOrderViolation, OrderedGuard, OrderedMutex};
pub use work::{DelayedWork, WorkError};
