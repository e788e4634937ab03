//! Interrupt sources of the RX core and the snapshot handed from the top half to the bottom half.

use std::fmt;

use serde::Serialize;

use crate::regs::{self, RxRegs, STA, STA_IRQ};

/// The seven interrupt sources, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IrqSource {
    Pio,
    Tmr,
    Vtd,
    Ddc,
    Aux,
    Aud,
    LinkStatus,
}

impl IrqSource {
    pub const ALL: [IrqSource; 7] = [
        IrqSource::Pio,
        IrqSource::Tmr,
        IrqSource::Vtd,
        IrqSource::Ddc,
        IrqSource::Aux,
        IrqSource::Aud,
        IrqSource::LinkStatus,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn block(self) -> u32 {
        match self {
            IrqSource::Pio => regs::PIO,
            IrqSource::Tmr => regs::TMR,
            IrqSource::Vtd => regs::VTD,
            IrqSource::Ddc => regs::DDC,
            IrqSource::Aux => regs::AUX,
            IrqSource::Aud => regs::AUD,
            IrqSource::LinkStatus => regs::LNKSTA,
        }
    }
}

/// Pending-bit per source, latched by the top half for exactly one bottom half run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CauseSnapshot([u32; 7]);

impl CauseSnapshot {
    pub(crate) fn latch(regs: &RxRegs) -> Self {
        let mut causes = [0; 7];
        for source in IrqSource::ALL {
            causes[source.index()] = regs.read(source.block() + STA) & STA_IRQ;
        }
        Self(causes)
    }

    pub(crate) fn merge(self, other: CauseSnapshot) -> Self {
        let mut causes = self.0;
        for (cause, more) in causes.iter_mut().zip(other.0) {
            *cause |= more;
        }
        Self(causes)
    }

    pub fn get(&self, source: IrqSource) -> u32 {
        self.0[source.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&cause| cause == 0)
    }

    pub fn pending(&self) -> impl Iterator<Item = IrqSource> + '_ {
        IrqSource::ALL
            .into_iter()
            .filter(move |source| self.get(*source) != 0)
    }
}

impl fmt::Display for CauseSnapshot {
    /// One column per source: its index when pending, `.` otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for source in IrqSource::ALL {
            if self.get(source) != 0 {
                write!(f, "{}", source.index())?;
            } else {
                f.write_str(".")?;
            }
        }
        Ok(())
    }
}
