//! Register windows.
//!
//! Drivers only ever see [`RegisterBus`]. The simulated hardware owns a [`RegisterFile`] and
//! uses the `hw_*` accessors, which bypass the access semantics a driver observes (for example
//! the hardware can *set* bits in a write-one-to-clear status register).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// 32-bit register access over a memory-mapped window.
///
/// Offsets are byte offsets relative to the start of the window and must be 4-byte aligned.
pub trait RegisterBus: Send + Sync {
    fn read(&self, offset: u32) -> u32;

    fn write(&self, offset: u32, value: u32);

    /// Read-modify-write of the storage behind `offset`: clears `clear`, then sets `set`.
    ///
    /// Returns the new value.
    fn update(&self, offset: u32, clear: u32, set: u32) -> u32;

    fn set_bits(&self, offset: u32, bits: u32) {
        self.update(offset, 0, bits);
    }

    fn clear_bits(&self, offset: u32, bits: u32) {
        self.update(offset, bits, 0);
    }
}

impl<T: RegisterBus + ?Sized> RegisterBus for Arc<T> {
    fn read(&self, offset: u32) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: u32, value: u32) {
        (**self).write(offset, value)
    }

    fn update(&self, offset: u32, clear: u32, set: u32) -> u32 {
        (**self).update(offset, clear, set)
    }
}

/// How a driver write to a register is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterKind {
    #[default]
    Plain,
    /// Bits written as 1 are cleared.
    WriteOneToClear,
    /// Writes OR into the target register; reads return the target.
    SetAlias(u32),
    /// Writes clear the written bits in the target register; reads return the target.
    ClearAlias(u32),
    /// Driver writes are dropped.
    ReadOnly,
}

/// Observer for driver-visible writes: `(offset, old, new)` of the storage that changed.
pub type WriteObserver = Arc<dyn Fn(u32, u32, u32) + Send + Sync>;

/// Backing storage for a simulated register window.
pub struct RegisterFile {
    name: String,
    words: Mutex<Vec<u32>>,
    kinds: HashMap<u32, RegisterKind>,
    observer: Mutex<Option<WriteObserver>>,
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterFile")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl RegisterFile {
    /// Creates a zeroed register file covering `len` bytes.
    pub fn new(name: impl Into<String>, len: u32) -> Self {
        Self {
            name: name.into(),
            words: Mutex::new(vec![0; (len / 4) as usize]),
            kinds: HashMap::new(),
            observer: Mutex::new(None),
        }
    }

    pub fn with_kind(mut self, offset: u32, kind: RegisterKind) -> Self {
        self.kinds.insert(offset, kind);
        self
    }

    /// Registers `set` and `clear` as write aliases of `target`.
    pub fn with_set_clear(self, target: u32, set: u32, clear: u32) -> Self {
        self.with_kind(set, RegisterKind::SetAlias(target))
            .with_kind(clear, RegisterKind::ClearAlias(target))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> u32 {
        (self.lock_words().len() * 4) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self, offset: u32) -> RegisterKind {
        self.kinds.get(&offset).copied().unwrap_or_default()
    }

    pub fn set_write_observer(&self, observer: WriteObserver) {
        *self.observer.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(observer);
    }

    /// Hardware-side read of the raw storage.
    pub fn hw_read(&self, offset: u32) -> u32 {
        let words = self.lock_words();
        match self.index(offset, words.len()) {
            Some(index) => words[index],
            None => 0,
        }
    }

    /// Hardware-side write of the raw storage.
    pub fn hw_write(&self, offset: u32, value: u32) {
        self.hw_update(offset, u32::MAX, value);
    }

    pub fn hw_update(&self, offset: u32, clear: u32, set: u32) -> u32 {
        let mut words = self.lock_words();
        match self.index(offset, words.len()) {
            Some(index) => {
                words[index] = (words[index] & !clear) | set;
                words[index]
            }
            None => 0,
        }
    }

    pub fn hw_set_bits(&self, offset: u32, bits: u32) {
        self.hw_update(offset, 0, bits);
    }

    pub fn hw_clear_bits(&self, offset: u32, bits: u32) {
        self.hw_update(offset, bits, 0);
    }

    fn lock_words(&self) -> MutexGuard<'_, Vec<u32>> {
        self.words.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index(&self, offset: u32, words: usize) -> Option<usize> {
        let index = (offset / 4) as usize;
        if offset % 4 != 0 || index >= words {
            tracing::warn!(regs = %self.name, offset = format_args!("{offset:#x}"), "register access outside of the window");
            return None;
        }
        Some(index)
    }

    fn resolve(&self, offset: u32) -> u32 {
        match self.kind(offset) {
            RegisterKind::SetAlias(target) | RegisterKind::ClearAlias(target) => target,
            _ => offset,
        }
    }

    fn notify(&self, offset: u32, old: u32, new: u32) {
        if old == new {
            return;
        }
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(observer) = observer {
            observer(offset, old, new);
        }
    }
}

impl RegisterBus for RegisterFile {
    fn read(&self, offset: u32) -> u32 {
        self.hw_read(self.resolve(offset))
    }

    fn write(&self, offset: u32, value: u32) {
        let kind = self.kind(offset);
        let target = self.resolve(offset);
        let (old, new) = {
            let mut words = self.lock_words();
            let Some(index) = self.index(target, words.len()) else {
                return;
            };
            let old = words[index];
            let new = match kind {
                RegisterKind::Plain => value,
                RegisterKind::WriteOneToClear | RegisterKind::ClearAlias(_) => old & !value,
                RegisterKind::SetAlias(_) => old | value,
                RegisterKind::ReadOnly => old,
            };
            words[index] = new;
            (old, new)
        };
        // Observers run without the storage lock so they may read registers back.
        self.notify(target, old, new);
    }

    fn update(&self, offset: u32, clear: u32, set: u32) -> u32 {
        let target = self.resolve(offset);
        if self.kind(target) == RegisterKind::ReadOnly {
            return self.hw_read(target);
        }
        let (old, new) = {
            let mut words = self.lock_words();
            let Some(index) = self.index(target, words.len()) else {
                return 0;
            };
            let old = words[index];
            words[index] = (old & !clear) | set;
            (old, words[index])
        };
        self.notify(target, old, new);
        new
    }
}

/// A sub-window of a larger bus, e.g. one core inside a subsystem's register space.
#[derive(Clone)]
pub struct RegisterWindow {
    bus: Arc<dyn RegisterBus>,
    base: u32,
    len: u32,
}

impl fmt::Debug for RegisterWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterWindow")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &format_args!("{:#x}", self.len))
            .finish()
    }
}

impl RegisterWindow {
    pub fn new(bus: Arc<dyn RegisterBus>, base: u32, len: u32) -> Self {
        Self { bus, base, len }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn translate(&self, offset: u32) -> Option<u32> {
        if offset >= self.len {
            tracing::warn!(
                base = format_args!("{:#x}", self.base),
                offset = format_args!("{offset:#x}"),
                "register access beyond the end of the window"
            );
            return None;
        }
        Some(self.base + offset)
    }
}

impl RegisterBus for RegisterWindow {
    fn read(&self, offset: u32) -> u32 {
        self.translate(offset)
            .map(|offset| self.bus.read(offset))
            .unwrap_or(0)
    }

    fn write(&self, offset: u32, value: u32) {
        if let Some(offset) = self.translate(offset) {
            self.bus.write(offset, value);
        }
    }

    fn update(&self, offset: u32, clear: u32, set: u32) -> u32 {
        self.translate(offset)
            .map(|offset| self.bus.update(offset, clear, set))
            .unwrap_or(0)
    }
}
