use std::sync::{Arc, Mutex};

use xvid_platform::{IrqTrigger, RegisterFile, RegisterKind};

use crate::regs::{self, PhyIntr};
use crate::types::{Direction, PllType};

/// Register-level model of the PHY: posts status bits and drives the interrupt line.
pub struct PhyHardware {
    regs: Arc<RegisterFile>,
    trigger: Mutex<Option<IrqTrigger>>,
}

impl PhyHardware {
    pub const VERSION: u32 = 0x0201_0000;

    pub fn new() -> Self {
        let regs = RegisterFile::new("vphy", regs::WINDOW_BYTES)
            .with_kind(regs::VERSION, RegisterKind::ReadOnly)
            .with_kind(regs::INTR_EN, RegisterKind::SetAlias(regs::INTR_MASK))
            .with_kind(regs::INTR_DIS, RegisterKind::ClearAlias(regs::INTR_MASK))
            .with_kind(regs::INTR_STS, RegisterKind::WriteOneToClear)
            .with_kind(regs::CLKDET_FREQ_TX, RegisterKind::ReadOnly)
            .with_kind(regs::CLKDET_FREQ_RX, RegisterKind::ReadOnly);
        regs.hw_write(regs::VERSION, Self::VERSION);
        Self {
            regs: Arc::new(regs),
            trigger: Mutex::new(None),
        }
    }

    pub fn registers(&self) -> Arc<RegisterFile> {
        Arc::clone(&self.regs)
    }

    /// Connects the model to the interrupt line requested by the driver.
    pub fn attach(&self, trigger: IrqTrigger) {
        *self.trigger.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(trigger);
    }

    pub fn detect_clock(&self, direction: Direction, freq_hz: u32) {
        self.regs.hw_write(regs::clkdet_freq(direction), freq_hz);
        let flag = match direction {
            Direction::Tx => PhyIntr::TX_CLKDET_FREQ_CHANGE,
            Direction::Rx => PhyIntr::RX_CLKDET_FREQ_CHANGE,
        };
        self.post(flag);
    }

    pub fn lock_pll(&self, pll: PllType) {
        self.post(match pll {
            PllType::Cpll => PhyIntr::CPLL_LOCK,
            PllType::Qpll | PllType::Qpll0 => PhyIntr::QPLL0_LOCK,
            PllType::Qpll1 => PhyIntr::QPLL1_LOCK,
        });
    }

    pub fn reset_done(&self, direction: Direction) {
        self.post(match direction {
            Direction::Tx => PhyIntr::TXRESET_DONE,
            Direction::Rx => PhyIntr::RXRESET_DONE,
        });
    }

    pub fn tx_align_done(&self) {
        self.post(PhyIntr::TXALIGN_DONE);
    }

    pub fn timer_timeout(&self, direction: Direction) {
        self.post(match direction {
            Direction::Tx => PhyIntr::TX_TMR_TIMEOUT,
            Direction::Rx => PhyIntr::RX_TMR_TIMEOUT,
        });
    }

    pub fn ibufds_enabled(&self, direction: Direction) -> bool {
        self.regs.hw_read(regs::IBUFDS_CTRL) & regs::ibufds_ce(direction) != 0
    }

    pub fn mmcm_started(&self, direction: Direction) -> bool {
        self.regs.hw_read(regs::mmcm_base(direction) + regs::MMCM_CTRL) & regs::MMCM_CTRL_START != 0
    }

    pub fn interrupts_enabled(&self) -> PhyIntr {
        PhyIntr::from_bits_truncate(self.regs.hw_read(regs::INTR_MASK))
    }

    fn post(&self, status: PhyIntr) {
        self.regs.hw_set_bits(regs::INTR_STS, status.bits());
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(trigger) = trigger {
            trigger.raise();
        }
    }
}

impl Default for PhyHardware {
    fn default() -> Self {
        Self::new()
    }
}
