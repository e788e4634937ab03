//! MMCM parameter search.
//!
//! The MMCM turns the recovered TMDS reference clock into the video clock:
//! `vco = clkin * mult / div` and `video = vco / clkout0_div`. For the video clock to carry
//! `ppc` pixels of `bpc` bits per cycle, `clkout0_div` must equal `mult * bpc * ppc / (8 * div)`
//! exactly.

use serde::Serialize;

use crate::error::VphyError;
use crate::types::{ColorDepth, PixelsPerClock};

pub const DIV_MAX: u8 = 106;
pub const MULT_MIN: u16 = 2;
pub const MULT_MAX: u16 = 64;
pub const CLKOUT_DIV_MAX: u16 = 128;
pub const CLKIN_MIN_HZ: u64 = 10_000_000;
pub const CLKIN_MAX_HZ: u64 = 800_000_000;
pub const PFD_MIN_HZ: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcoRange {
    pub min_hz: u64,
    pub max_hz: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MmcmParams {
    pub clkin_hz: u64,
    pub mult: u16,
    pub div: u8,
    pub clkout0_div: u16,
}

impl MmcmParams {
    pub fn vco_hz(&self) -> u64 {
        self.clkin_hz * u64::from(self.mult) / u64::from(self.div)
    }

    pub fn video_clk_hz(&self) -> u64 {
        self.vco_hz() / u64::from(self.clkout0_div)
    }
}

/// Finds the first `(div, mult)` pair, lowest divider first, that keeps the VCO in range and
/// yields an integral output divider.
pub fn calc_params(
    clkin_hz: u64,
    ppc: PixelsPerClock,
    bpc: ColorDepth,
    vco: VcoRange,
) -> Result<MmcmParams, VphyError> {
    let failed = || VphyError::MmcmParams {
        clkin_hz,
        ppc: ppc.count(),
        bpc: bpc.bits(),
    };
    if !(CLKIN_MIN_HZ..=CLKIN_MAX_HZ).contains(&clkin_hz) || bpc == ColorDepth::Bpc6 {
        return Err(failed());
    }

    let scale = u64::from(bpc.bits()) * u64::from(ppc.count());
    for div in 1..=DIV_MAX {
        let div_wide = u64::from(div);
        if clkin_hz / div_wide < PFD_MIN_HZ {
            break;
        }
        for mult in MULT_MIN..=MULT_MAX {
            let vco_hz = clkin_hz * u64::from(mult) / div_wide;
            if vco_hz < vco.min_hz {
                continue;
            }
            if vco_hz > vco.max_hz {
                break;
            }
            let numerator = u64::from(mult) * scale;
            let denominator = 8 * div_wide;
            if numerator % denominator != 0 {
                continue;
            }
            let clkout0_div = numerator / denominator;
            if (1..=u64::from(CLKOUT_DIV_MAX)).contains(&clkout0_div) {
                return Ok(MmcmParams {
                    clkin_hz,
                    mult,
                    div,
                    clkout0_div: clkout0_div as u16,
                });
            }
        }
    }
    Err(failed())
}
