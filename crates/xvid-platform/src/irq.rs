//! Level-triggered interrupt lines with a split hard/threaded handler.
//!
//! [`IrqTrigger::raise`] models the interrupt controller delivering the line: it runs the hard
//! half synchronously in the caller's context. A hard half that returns
//! [`IrqReturn::WakeThread`] queues the threaded half on the line's dedicated worker thread.
//!
//! The line is level-triggered: after every threaded run the worker samples the line again and
//! re-runs the hard half while the device keeps it asserted, so causes that arrived while the
//! device had its sources masked are not lost.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not for this device.
    None,
    Handled,
    WakeThread,
}

pub trait ThreadedIrqHandler: Send + Sync {
    /// Whether the device currently drives its interrupt line.
    fn is_asserted(&self) -> bool;

    /// Interrupt context. May only take short, non-sleeping locks.
    fn hard_irq(&self) -> IrqReturn;

    /// Thread context; runs on the line's worker after the hard half asked for it.
    fn thread_fn(&self) -> IrqReturn;
}

#[derive(Debug, Error)]
pub enum IrqError {
    #[error("interrupt line {0} is invalid")]
    InvalidLine(u32),

    #[error("failed to spawn the interrupt thread for line {line}")]
    Spawn {
        line: u32,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Deliveries through [`IrqTrigger::raise`].
    pub raised: u64,
    /// Deliveries that found the line deasserted.
    pub spurious: u64,
    pub hard: u64,
    pub threaded: u64,
}

#[derive(Default)]
struct IrqDesc {
    thread_pending: bool,
    running: bool,
    shutdown: bool,
    stats: IrqStats,
}

struct IrqShared {
    line: u32,
    name: String,
    handler: Weak<dyn ThreadedIrqHandler>,
    desc: Mutex<IrqDesc>,
    cond: Condvar,
}

impl IrqShared {
    fn lock_desc(&self) -> MutexGuard<'_, IrqDesc> {
        self.desc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the hard half with the descriptor lock held, serializing it against other
    /// deliveries of the same line.
    fn run_hard(&self, desc: &mut IrqDesc, handler: &dyn ThreadedIrqHandler) -> IrqReturn {
        desc.stats.hard += 1;
        let ret = handler.hard_irq();
        if ret == IrqReturn::WakeThread {
            desc.thread_pending = true;
            self.cond.notify_all();
        }
        ret
    }

    fn raise(&self) -> IrqReturn {
        // Must outlive `desc`: dropping the last handler reference frees this line.
        let handler = self.handler.upgrade();
        let mut desc = self.lock_desc();
        if desc.shutdown {
            return IrqReturn::None;
        }
        desc.stats.raised += 1;
        let Some(handler) = handler.as_ref() else {
            return IrqReturn::None;
        };
        if !handler.is_asserted() {
            desc.stats.spurious += 1;
            return IrqReturn::None;
        }
        self.run_hard(&mut desc, handler.as_ref())
    }

    fn synchronize(&self) {
        let mut desc = self.lock_desc();
        while (desc.thread_pending || desc.running) && !desc.shutdown {
            desc = self
                .cond
                .wait(desc)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

fn irq_thread(shared: Arc<IrqShared>) {
    let mut desc = shared.lock_desc();
    loop {
        while !desc.thread_pending && !desc.shutdown {
            desc = shared
                .cond
                .wait(desc)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if desc.shutdown {
            break;
        }
        desc.thread_pending = false;
        desc.running = true;
        drop(desc);

        let handler = shared.handler.upgrade();
        if let Some(handler) = &handler {
            if handler.thread_fn() == IrqReturn::None {
                tracing::debug!(line = shared.line, name = %shared.name, "threaded handler did not handle the interrupt");
            }
        }

        desc = shared.lock_desc();
        desc.running = false;
        desc.stats.threaded += 1;
        if let Some(handler) = &handler {
            if !desc.shutdown && !desc.thread_pending && handler.is_asserted() {
                shared.run_hard(&mut desc, handler.as_ref());
            }
        }
        shared.cond.notify_all();
        drop(desc);
        drop(handler);
        desc = shared.lock_desc();
    }
    desc.running = false;
    shared.cond.notify_all();
}

/// A requested interrupt line. Dropping it frees the line and joins the worker thread.
pub struct ThreadedIrq {
    shared: Arc<IrqShared>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for ThreadedIrq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedIrq")
            .field("line", &self.shared.line)
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl ThreadedIrq {
    pub fn request(
        line: u32,
        name: &str,
        handler: Weak<dyn ThreadedIrqHandler>,
    ) -> Result<Self, IrqError> {
        if line == 0 {
            return Err(IrqError::InvalidLine(line));
        }
        let shared = Arc::new(IrqShared {
            line,
            name: name.to_string(),
            handler,
            desc: Mutex::new(IrqDesc::default()),
            cond: Condvar::new(),
        });
        let worker = std::thread::Builder::new()
            .name(format!("irq/{line}-{name}"))
            .spawn({
                let shared = Arc::clone(&shared);
                move || irq_thread(shared)
            })
            .map_err(|source| IrqError::Spawn { line, source })?;
        tracing::debug!(line, name, "interrupt line requested");
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn line(&self) -> u32 {
        self.shared.line
    }

    pub fn trigger(&self) -> IrqTrigger {
        IrqTrigger {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn raise(&self) -> IrqReturn {
        self.shared.raise()
    }

    /// Waits until no threaded run is queued or in progress.
    pub fn synchronize(&self) {
        self.shared.synchronize()
    }

    pub fn stats(&self) -> IrqStats {
        self.shared.lock_desc().stats
    }

    fn shutdown(&mut self) {
        {
            let mut desc = self.shared.lock_desc();
            desc.shutdown = true;
            self.shared.cond.notify_all();
        }
        let Some(worker) = self.worker.take() else {
            return;
        };
        // The last owner may be the handler running on the worker itself; it exits on its own.
        if worker.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            tracing::error!(line = self.shared.line, "interrupt thread panicked");
        }
    }
}

impl Drop for ThreadedIrq {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The hardware side of an interrupt line.
#[derive(Clone)]
pub struct IrqTrigger {
    shared: Arc<IrqShared>,
}

impl fmt::Debug for IrqTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqTrigger")
            .field("line", &self.shared.line)
            .finish()
    }
}

impl IrqTrigger {
    pub fn raise(&self) -> IrqReturn {
        self.shared.raise()
    }

    pub fn synchronize(&self) {
        self.shared.synchronize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// One pending bit, one enable bit; the hard half masks, the threaded half acks and unmasks.
    #[derive(Default)]
    struct Device {
        pending: AtomicU32,
        enabled: AtomicBool,
        handled: AtomicU32,
    }

    impl ThreadedIrqHandler for Device {
        fn is_asserted(&self) -> bool {
            self.enabled.load(Ordering::SeqCst) && self.pending.load(Ordering::SeqCst) != 0
        }

        fn hard_irq(&self) -> IrqReturn {
            self.enabled.store(false, Ordering::SeqCst);
            IrqReturn::WakeThread
        }

        fn thread_fn(&self) -> IrqReturn {
            let pending = self.pending.swap(0, Ordering::SeqCst);
            self.handled.fetch_add(pending, Ordering::SeqCst);
            self.enabled.store(true, Ordering::SeqCst);
            IrqReturn::Handled
        }
    }

    fn setup() -> (Arc<Device>, ThreadedIrq) {
        let dev = Arc::new(Device::default());
        dev.enabled.store(true, Ordering::SeqCst);
        let weak: Weak<dyn ThreadedIrqHandler> = Arc::downgrade(&(Arc::clone(&dev) as Arc<dyn ThreadedIrqHandler>));
        let irq = ThreadedIrq::request(7, "test", weak).unwrap();
        (dev, irq)
    }

    #[test]
    fn deasserted_line_is_spurious() {
        let (_dev, irq) = setup();
        assert_eq!(irq.raise(), IrqReturn::None);
        assert_eq!(irq.stats().spurious, 1);
    }

    #[test]
    fn hard_half_wakes_thread() {
        let (dev, irq) = setup();
        dev.pending.store(1, Ordering::SeqCst);
        assert_eq!(irq.trigger().raise(), IrqReturn::WakeThread);
        irq.synchronize();
        assert_eq!(dev.handled.load(Ordering::SeqCst), 1);
        assert!(dev.enabled.load(Ordering::SeqCst));
    }

    #[test]
    fn causes_arriving_while_masked_are_replayed() {
        let (dev, irq) = setup();
        for _ in 0..100 {
            dev.pending.fetch_add(1, Ordering::SeqCst);
            irq.raise();
        }
        irq.synchronize();
        assert_eq!(dev.handled.load(Ordering::SeqCst), 100);
        assert_eq!(dev.pending.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn line_zero_is_rejected() {
        let dev: Arc<dyn ThreadedIrqHandler> = Arc::new(Device::default());
        assert!(matches!(
            ThreadedIrq::request(0, "bad", Arc::downgrade(&dev)),
            Err(IrqError::InvalidLine(0))
        ));
    }

    #[test]
    fn raise_after_free_is_ignored() {
        let (dev, irq) = setup();
        let trigger = irq.trigger();
        drop(irq);
        dev.pending.store(1, Ordering::SeqCst);
        assert_eq!(trigger.raise(), IrqReturn::None);
        trigger.synchronize();
    }
}
