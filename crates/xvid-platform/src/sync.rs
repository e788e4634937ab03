//! Mutexes with lock classes and a runtime lock-order audit.
//!
//! Every [`OrderedMutex`] belongs to a [`LockClass`] with a rank. A thread may only acquire a
//! lock whose rank is strictly greater than every rank it already holds. Violations are recorded
//! by the shared [`LockOrderMonitor`] and logged; they never panic, so a test can assert on the
//! recorded list after driving concurrent traffic.
//!
//! When an acquisition is contended, the waiter's call site and the current owner's call site are
//! emitted at `trace` level.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockClass {
    name: &'static str,
    rank: u16,
}

impl LockClass {
    pub const fn new(name: &'static str, rank: u16) -> Self {
        Self { name, rank }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn rank(&self) -> u16 {
        self.rank
    }
}

impl fmt::Display for LockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.rank)
    }
}

#[derive(Debug, Clone)]
pub struct LockOrderViolation {
    pub held: LockClass,
    pub acquiring: LockClass,
    pub location: &'static Location<'static>,
    pub thread: Option<String>,
}

#[derive(Debug, Default)]
pub struct LockOrderMonitor {
    held: Mutex<HashMap<ThreadId, Vec<LockClass>>>,
    violations: Mutex<Vec<LockOrderViolation>>,
    acquisitions: AtomicU64,
}

impl LockOrderMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock_held(&self) -> MutexGuard<'_, HashMap<ThreadId, Vec<LockClass>>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_acquire(&self, class: LockClass, location: &'static Location<'static>) {
        let conflict = self
            .lock_held()
            .get(&thread::current().id())
            .and_then(|stack| {
                stack
                    .iter()
                    .filter(|held| held.rank >= class.rank)
                    .max_by_key(|held| held.rank)
                    .copied()
            });
        let Some(held) = conflict else {
            return;
        };
        tracing::error!(%held, acquiring = %class, %location, "lock order violation");
        self.violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(LockOrderViolation {
                held,
                acquiring: class,
                location,
                thread: thread::current().name().map(str::to_string),
            });
    }

    fn note_acquired(&self, class: LockClass) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.lock_held()
            .entry(thread::current().id())
            .or_default()
            .push(class);
    }

    fn note_released(&self, class: LockClass) {
        let id = thread::current().id();
        let mut held = self.lock_held();
        if let Some(stack) = held.get_mut(&id) {
            if let Some(pos) = stack.iter().rposition(|held| *held == class) {
                stack.remove(pos);
            }
            if stack.is_empty() {
                held.remove(&id);
            }
        }
    }

    pub fn violations(&self) -> Vec<LockOrderViolation> {
        self.violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Lock classes held by the calling thread, in acquisition order.
    pub fn held_by_current_thread(&self) -> Vec<LockClass> {
        self.lock_held()
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_default()
    }
}

pub struct OrderedMutex<T> {
    class: LockClass,
    monitor: Arc<LockOrderMonitor>,
    owner: Mutex<Option<&'static Location<'static>>>,
    inner: Mutex<T>,
}

impl<T> fmt::Debug for OrderedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMutex")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl<T> OrderedMutex<T> {
    pub fn new(class: LockClass, monitor: Arc<LockOrderMonitor>, value: T) -> Self {
        Self {
            class,
            monitor,
            owner: Mutex::new(None),
            inner: Mutex::new(value),
        }
    }

    pub fn class(&self) -> LockClass {
        self.class
    }

    pub fn monitor(&self) -> &Arc<LockOrderMonitor> {
        &self.monitor
    }

    fn lock_owner(&self) -> MutexGuard<'_, Option<&'static Location<'static>>> {
        self.owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[track_caller]
    pub fn lock(&self) -> OrderedGuard<'_, T> {
        let location = Location::caller();
        self.monitor.check_acquire(self.class, location);
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                let owner = self
                    .lock_owner()
                    .map(|owner| owner.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::trace!(
                    lock = self.class.name(),
                    waiter = %location,
                    %owner,
                    "waiting for contended lock"
                );
                self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
            }
        };
        *self.lock_owner() = Some(location);
        self.monitor.note_acquired(self.class);
        OrderedGuard { mutex: self, guard }
    }
}

pub struct OrderedGuard<'a, T> {
    mutex: &'a OrderedMutex<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for OrderedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OrderedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OrderedGuard<'_, T> {
    fn drop(&mut self) {
        *self.mutex.lock_owner() = None;
        self.mutex.monitor.note_released(self.mutex.class);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTER: LockClass = LockClass::new("outer", 10);
    const INNER: LockClass = LockClass::new("inner", 20);

    #[test]
    fn ascending_order_is_clean() {
        let monitor = LockOrderMonitor::new();
        let outer = OrderedMutex::new(OUTER, Arc::clone(&monitor), 1u32);
        let inner = OrderedMutex::new(INNER, Arc::clone(&monitor), 2u32);

        let a = outer.lock();
        let b = inner.lock();
        assert_eq!(*a + *b, 3);
        assert_eq!(monitor.held_by_current_thread(), vec![OUTER, INNER]);
        drop(a);
        drop(b);
        assert!(monitor.held_by_current_thread().is_empty());
        assert!(monitor.violations().is_empty());
        assert_eq!(monitor.acquisitions(), 2);
    }

    #[test]
    fn descending_order_is_recorded() {
        let monitor = LockOrderMonitor::new();
        let outer = OrderedMutex::new(OUTER, Arc::clone(&monitor), ());
        let inner = OrderedMutex::new(INNER, Arc::clone(&monitor), ());

        let _b = inner.lock();
        let _a = outer.lock();
        let violations = monitor.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].held, INNER);
        assert_eq!(violations[0].acquiring, OUTER);
    }

    #[test]
    fn release_then_reacquire_is_clean() {
        let monitor = LockOrderMonitor::new();
        let outer = OrderedMutex::new(OUTER, Arc::clone(&monitor), ());
        let inner = OrderedMutex::new(INNER, Arc::clone(&monitor), ());

        let b = inner.lock();
        drop(b);
        let _a = outer.lock();
        let _b = inner.lock();
        assert!(monitor.violations().is_empty());
    }

    #[test]
    fn held_sets_are_per_thread() {
        let monitor = LockOrderMonitor::new();
        let inner = Arc::new(OrderedMutex::new(INNER, Arc::clone(&monitor), 0u32));
        let outer = OrderedMutex::new(OUTER, Arc::clone(&monitor), ());

        let _b = inner.lock();
        std::thread::scope(|s| {
            s.spawn(|| {
                let _a = outer.lock();
            });
        });
        assert!(monitor.violations().is_empty());
    }
}
