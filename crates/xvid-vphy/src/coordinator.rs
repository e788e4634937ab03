use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use xvid_platform::{
    Clock, IrqReturn, IrqTrigger, LockClass, LockOrderMonitor, OrderedGuard, OrderedMutex,
    RegisterBus, ResourceProvider, ThreadedIrq, ThreadedIrqHandler,
};

use crate::config::VphyConfig;
use crate::error::VphyError;
use crate::lane::{ControllerType, LaneHandle, LaneState, NO_LANECLK_SHARE};
use crate::mmcm::{self, MmcmParams};
use crate::regs::{self, PhyIntr};
use crate::types::{ChannelId, ColorDepth, Direction, PixelsPerClock, PllType};

/// Lock class of the PHY mutex. Device mutexes of PHY consumers must rank below it.
pub const VPHY_LOCK: LockClass = LockClass::new("xvphy", 20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VphyVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl VphyVersion {
    fn from_reg(value: u32) -> Self {
        Self {
            major: (value >> 24) as u8,
            minor: (value >> 16) as u8,
            revision: (value >> 8) as u8,
        }
    }
}

impl fmt::Display for VphyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.major, self.minor, self.revision)
    }
}

/// A PHY configuration event forwarded to the handler of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    PllLocked(PllType),
    TimerTimeout,
}

/// Callbacks an upper-layer driver registers per direction.
///
/// Every method is called from the PHY interrupt thread with the PHY mutex held, passed in as
/// `held`, and must hand a guard for the same PHY back.
pub trait PhyLinkHandler: Send + Sync {
    /// The reference clock of this direction changed.
    fn link_init<'a>(&self, held: VphyGuard<'a>) -> VphyGuard<'a>;

    /// The transceivers of this direction completed reset.
    fn link_ready<'a>(&self, held: VphyGuard<'a>) -> VphyGuard<'a>;

    fn config_step<'a>(&self, held: VphyGuard<'a>, step: ConfigStep) -> VphyGuard<'a> {
        let _ = step;
        held
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VphyStats {
    pub serviced_irqs: u64,
    pub link_init: [u64; 2],
    pub link_ready: [u64; 2],
    pub config_steps: u64,
    pub mmcm_configured: [u64; 2],
    pub mmcm_failures: u64,
}

pub struct VphyState {
    lanes: Vec<LaneState>,
    ref_clk_hz: [u64; 2],
    rx_tmds_clock_ratio: u8,
    line_rate_hz: [u64; 6],
    ibufds: [bool; 2],
    mmcm: [Option<MmcmParams>; 2],
    mmcm_running: [bool; 2],
    handlers: [Option<Weak<dyn PhyLinkHandler>>; 2],
    stats: VphyStats,
}

impl VphyState {
    fn new(lanes: u8) -> Self {
        Self {
            lanes: (0..lanes).map(LaneState::new).collect(),
            ref_clk_hz: [0; 2],
            rx_tmds_clock_ratio: 0,
            line_rate_hz: [0; 6],
            ibufds: [false; 2],
            mmcm: [None; 2],
            mmcm_running: [false; 2],
            handlers: [None, None],
            stats: VphyStats::default(),
        }
    }
}

pub struct Vphy {
    name: String,
    config: VphyConfig,
    regs: Arc<dyn RegisterBus>,
    version: VphyVersion,
    state: OrderedMutex<VphyState>,
    irq: Mutex<Option<ThreadedIrq>>,
    axi_lite: Arc<Clock>,
    teardown: AtomicBool,
}

impl fmt::Debug for Vphy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vphy")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Vphy {
    pub fn probe(
        config: VphyConfig,
        platform: &dyn ResourceProvider,
        monitor: Arc<LockOrderMonitor>,
    ) -> Result<Arc<Self>, VphyError> {
        config.validate()?;
        let mmio = platform.mmio(0)?;
        let line = platform.irq(0)?;
        let axi_lite = platform.clock("axi-lite").map_err(|err| {
            if err.is_deferred() {
                tracing::debug!(device = platform.name(), "axi-lite clock not ready");
            }
            err
        })?;
        axi_lite.prepare_enable()?;

        let version = VphyVersion::from_reg(mmio.bus.read(regs::VERSION));
        let phy = Arc::new(Self {
            name: platform.name().to_string(),
            state: OrderedMutex::new(VPHY_LOCK, monitor, VphyState::new(config.lanes)),
            config,
            regs: mmio.bus,
            version,
            irq: Mutex::new(None),
            axi_lite,
            teardown: AtomicBool::new(false),
        });

        let handler: Weak<dyn ThreadedIrqHandler> = Arc::<Vphy>::downgrade(&phy);
        let irq = match ThreadedIrq::request(line, &phy.name, handler) {
            Ok(irq) => irq,
            Err(err) => {
                phy.axi_lite.disable_unprepare();
                return Err(err.into());
            }
        };
        *phy.lock_irq() = Some(irq);

        phy.regs.write(regs::INTR_STS, PhyIntr::all().bits());
        phy.regs.write(regs::INTR_EN, PhyIntr::all().bits());
        tracing::info!(
            device = %phy.name,
            version = %phy.version,
            lanes = phy.config.lanes,
            transceiver = ?phy.config.transceiver_type,
            "video phy probed"
        );
        Ok(phy)
    }

    /// Masks the PHY interrupts, frees the line and gates the bus clock. Idempotent.
    pub fn remove(&self) {
        if self.teardown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.regs.write(regs::INTR_DIS, PhyIntr::all().bits());
        let irq = self.lock_irq().take();
        drop(irq);
        self.axi_lite.disable_unprepare();
        tracing::info!(device = %self.name, "video phy removed");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &VphyConfig {
        &self.config
    }

    pub fn version(&self) -> VphyVersion {
        self.version
    }

    pub fn lock_monitor(&self) -> &Arc<LockOrderMonitor> {
        self.state.monitor()
    }

    /// Takes the PHY mutex. Blocks without timeout.
    #[track_caller]
    pub fn acquire(&self) -> VphyGuard<'_> {
        VphyGuard {
            phy: self,
            state: self.state.lock(),
        }
    }

    /// Resolves a lane from four lookup cells: controller type, controller instance,
    /// lane-clock share index and reference clock rate.
    pub fn xlate(self: &Arc<Self>, lane: u8, cells: &[u32]) -> Result<LaneHandle, VphyError> {
        let &[controller, instance, share, refclk_rate] = cells else {
            return Err(VphyError::XlateArgs(cells.len()));
        };
        let controller = ControllerType::try_from(controller)?;
        let share_laneclk = (share != NO_LANECLK_SHARE).then_some(share);
        if let Some(share) = share_laneclk {
            if share >= u32::from(self.config.lanes) {
                return Err(VphyError::NoSuchLane(share));
            }
        }

        let mut held = self.acquire();
        let state = held.lane_mut(lane)?;
        state.controller = Some(controller);
        state.instance = instance;
        state.share_laneclk = share_laneclk;
        state.refclk_rate = refclk_rate;
        drop(held);

        tracing::debug!(device = %self.name, lane, ?controller, instance, "lane resolved");
        Ok(LaneHandle::new(Arc::downgrade(self), lane))
    }

    pub fn irq_trigger(&self) -> Option<IrqTrigger> {
        self.lock_irq().as_ref().map(ThreadedIrq::trigger)
    }

    /// Waits for a queued or running PHY bottom half to finish.
    pub fn synchronize_irq(&self) {
        let trigger = self.irq_trigger();
        if let Some(trigger) = trigger {
            trigger.synchronize();
        }
    }

    fn lock_irq(&self) -> std::sync::MutexGuard<'_, Option<ThreadedIrq>> {
        self.irq.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_channel(&self, direction: Direction, channel: ChannelId) -> Result<(), VphyError> {
        if channel.is_common() || channel.index() < usize::from(self.config.channels(direction)) {
            Ok(())
        } else {
            Err(VphyError::InvalidChannel { direction, channel })
        }
    }

    fn program_mmcm(&self, direction: Direction, params: &MmcmParams) {
        let base = regs::mmcm_base(direction);
        self.regs.clear_bits(base + regs::MMCM_CTRL, regs::MMCM_CTRL_START);
        self.regs.write(base + regs::MMCM_MULT, u32::from(params.mult));
        self.regs.write(base + regs::MMCM_DIV, u32::from(params.div));
        self.regs
            .write(base + regs::MMCM_CLKOUT0_DIV, u32::from(params.clkout0_div));
    }

    fn service<'a>(&'a self, mut held: VphyGuard<'a>) -> VphyGuard<'a> {
        let status = PhyIntr::from_bits_truncate(self.regs.read(regs::INTR_STS));
        self.regs.write(regs::INTR_STS, status.bits());
        held.state.stats.serviced_irqs += 1;
        tracing::debug!(device = %self.name, ?status, "phy interrupt");

        for (direction, flag) in [
            (Direction::Tx, PhyIntr::TX_CLKDET_FREQ_CHANGE),
            (Direction::Rx, PhyIntr::RX_CLKDET_FREQ_CHANGE),
        ] {
            if status.contains(flag) {
                held = self.clock_changed(held, direction);
            }
        }

        for (flag, pll) in [
            (PhyIntr::CPLL_LOCK, PllType::Cpll),
            (PhyIntr::QPLL0_LOCK, PllType::Qpll0),
            (PhyIntr::QPLL1_LOCK, PllType::Qpll1),
        ] {
            if !status.contains(flag) {
                continue;
            }
            held.mark_pll_locked(pll);
            for direction in Direction::BOTH {
                if self.config.pll_selection(direction).is_served_by(pll) {
                    held.state.stats.config_steps += 1;
                    held = Self::dispatch(held, direction, |handler, held| {
                        handler.config_step(held, ConfigStep::PllLocked(pll))
                    });
                }
            }
        }

        let tx_ready = if self.config.tx_buffer_bypass {
            PhyIntr::TXALIGN_DONE
        } else {
            PhyIntr::TXRESET_DONE
        };
        for (direction, flag) in [(Direction::Tx, tx_ready), (Direction::Rx, PhyIntr::RXRESET_DONE)] {
            if status.contains(flag) {
                held.state.stats.link_ready[direction.index()] += 1;
                held = Self::dispatch(held, direction, |handler, held| handler.link_ready(held));
            }
        }

        for (direction, flag) in [
            (Direction::Tx, PhyIntr::TX_TMR_TIMEOUT),
            (Direction::Rx, PhyIntr::RX_TMR_TIMEOUT),
        ] {
            if status.contains(flag) {
                held.state.stats.config_steps += 1;
                held = Self::dispatch(held, direction, |handler, held| {
                    handler.config_step(held, ConfigStep::TimerTimeout)
                });
            }
        }
        held
    }

    fn clock_changed<'a>(&'a self, mut held: VphyGuard<'a>, direction: Direction) -> VphyGuard<'a> {
        let freq_hz = u64::from(self.regs.read(regs::clkdet_freq(direction)));
        let d = direction.index();
        held.state.ref_clk_hz[d] = freq_hz;
        held.state.mmcm_running[d] = false;
        self.regs.clear_bits(
            regs::mmcm_base(direction) + regs::MMCM_CTRL,
            regs::MMCM_CTRL_START,
        );
        tracing::debug!(device = %self.name, ?direction, freq_hz, "reference clock changed");

        if freq_hz != 0 {
            held.state.stats.link_init[d] += 1;
            held = Self::dispatch(held, direction, |handler, held| handler.link_init(held));
        }
        held.update_line_rate(direction);
        held
    }

    fn dispatch<'a>(
        mut held: VphyGuard<'a>,
        direction: Direction,
        call: impl FnOnce(&dyn PhyLinkHandler, VphyGuard<'a>) -> VphyGuard<'a>,
    ) -> VphyGuard<'a> {
        let handler = held.state.handlers[direction.index()]
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(handler) = handler else {
            tracing::debug!(?direction, "no link handler registered");
            return held;
        };
        call(handler.as_ref(), held)
    }
}

impl ThreadedIrqHandler for Vphy {
    fn is_asserted(&self) -> bool {
        self.regs.read(regs::INTR_STS) & self.regs.read(regs::INTR_MASK) != 0
    }

    fn hard_irq(&self) -> IrqReturn {
        self.regs.write(regs::INTR_DIS, PhyIntr::all().bits());
        IrqReturn::WakeThread
    }

    fn thread_fn(&self) -> IrqReturn {
        if self.teardown.load(Ordering::Acquire) {
            return IrqReturn::Handled;
        }
        let held = self.acquire();
        self.service(held).release();
        if !self.teardown.load(Ordering::Acquire) {
            self.regs.write(regs::INTR_EN, PhyIntr::all().bits());
        }
        IrqReturn::Handled
    }
}

/// Proof that the PHY mutex is held.
pub struct VphyGuard<'a> {
    phy: &'a Vphy,
    state: OrderedGuard<'a, VphyState>,
}

impl<'a> VphyGuard<'a> {
    pub fn phy(&self) -> &'a Vphy {
        self.phy
    }

    /// Drops the PHY mutex, keeping the PHY reference so it can be reacquired.
    pub fn release(self) -> &'a Vphy {
        let VphyGuard { phy, state } = self;
        drop(state);
        phy
    }

    pub fn set_link_handler(&mut self, direction: Direction, handler: Weak<dyn PhyLinkHandler>) {
        self.state.handlers[direction.index()] = Some(handler);
    }

    pub fn clear_link_handler(&mut self, direction: Direction) {
        self.state.handlers[direction.index()] = None;
    }

    /// Computes and programs MMCM parameters for `direction` from its current reference clock.
    /// The MMCM is left stopped.
    pub fn configure_clock_params(
        &mut self,
        direction: Direction,
        channel: ChannelId,
        ppc: PixelsPerClock,
        bpc: ColorDepth,
    ) -> Result<MmcmParams, VphyError> {
        self.phy.check_channel(direction, channel)?;
        let d = direction.index();
        let clkin_hz = self.state.ref_clk_hz[d];
        if clkin_hz == 0 {
            return Err(VphyError::NoReferenceClock(direction));
        }
        let vco = self.phy.config.transceiver_type.mmcm_vco_range();
        let params = match mmcm::calc_params(clkin_hz, ppc, bpc, vco) {
            Ok(params) => params,
            Err(err) => {
                self.state.stats.mmcm_failures += 1;
                return Err(err);
            }
        };
        self.phy.program_mmcm(direction, &params);
        self.state.mmcm[d] = Some(params);
        self.state.mmcm_running[d] = false;
        self.state.stats.mmcm_configured[d] += 1;
        tracing::debug!(
            device = %self.phy.name,
            ?direction,
            %ppc,
            %bpc,
            mult = params.mult,
            div = params.div,
            clkout0_div = params.clkout0_div,
            "mmcm configured"
        );
        Ok(params)
    }

    pub fn start_clock(&mut self, direction: Direction) -> Result<(), VphyError> {
        let d = direction.index();
        if self.state.mmcm[d].is_none() {
            return Err(VphyError::MmcmNotConfigured(direction));
        }
        self.phy.regs.set_bits(
            regs::mmcm_base(direction) + regs::MMCM_CTRL,
            regs::MMCM_CTRL_START,
        );
        self.state.mmcm_running[d] = true;
        Ok(())
    }

    pub fn line_rate_hz(&self, channel: ChannelId) -> u64 {
        self.state.line_rate_hz[channel.index()]
    }

    pub fn pll_type(&self, direction: Direction) -> PllType {
        self.phy.config.pll_selection(direction)
    }

    pub fn ibufds_enable(&mut self, direction: Direction, enable: bool) {
        let bit = regs::ibufds_ce(direction);
        if enable {
            self.phy.regs.set_bits(regs::IBUFDS_CTRL, bit);
        } else {
            self.phy.regs.clear_bits(regs::IBUFDS_CTRL, bit);
        }
        self.state.ibufds[direction.index()] = enable;
    }

    pub fn ibufds_enabled(&self, direction: Direction) -> bool {
        self.state.ibufds[direction.index()]
    }

    pub fn ref_clk_hz(&self, direction: Direction) -> u64 {
        self.state.ref_clk_hz[direction.index()]
    }

    pub fn rx_tmds_clock_ratio(&self) -> u8 {
        self.state.rx_tmds_clock_ratio
    }

    pub fn set_rx_tmds_clock_ratio(&mut self, ratio: u8) {
        self.state.rx_tmds_clock_ratio = ratio;
    }

    pub fn mmcm(&self, direction: Direction) -> Option<MmcmParams> {
        self.state.mmcm[direction.index()]
    }

    pub fn mmcm_running(&self, direction: Direction) -> bool {
        self.state.mmcm_running[direction.index()]
    }

    pub fn lane(&self, index: u8) -> Option<&LaneState> {
        self.state.lanes.get(usize::from(index))
    }

    pub fn lanes(&self) -> &[LaneState] {
        &self.state.lanes
    }

    pub fn stats(&self) -> VphyStats {
        self.state.stats
    }

    pub(crate) fn lane_mut(&mut self, index: u8) -> Result<&mut LaneState, VphyError> {
        self.state
            .lanes
            .get_mut(usize::from(index))
            .ok_or(VphyError::NoSuchLane(u32::from(index)))
    }

    fn mark_pll_locked(&mut self, pll: PllType) {
        let phy = self.phy;
        let lanes = &mut self.state.lanes;
        for direction in Direction::BOTH {
            if !phy.config.pll_selection(direction).is_served_by(pll) {
                continue;
            }
            let channels = usize::from(phy.config.channels(direction));
            for lane in lanes.iter_mut().take(channels) {
                lane.pll_lock = true;
            }
        }
    }

    /// Recomputes the line rate of the channels fed by `direction`'s PLL.
    fn update_line_rate(&mut self, direction: Direction) {
        let d = direction.index();
        let ratio = if direction == Direction::Rx && self.state.rx_tmds_clock_ratio != 0 {
            40
        } else {
            10
        };
        let rate = self.state.ref_clk_hz[d] * ratio;
        let pll = self.pll_type(direction);
        if pll == PllType::Cpll {
            let channels = usize::from(self.phy.config.channels(direction));
            for channel in (0..channels).filter_map(ChannelId::lane) {
                self.state.line_rate_hz[channel.index()] = rate;
            }
        } else {
            self.state.line_rate_hz[ChannelId::for_pll(pll).index()] = rate;
        }
        if self.state.ref_clk_hz[d] == 0 {
            let channels = usize::from(self.phy.config.channels(direction));
            for lane in self.state.lanes.iter_mut().take(channels) {
                lane.pll_lock = false;
            }
        }
    }
}

impl fmt::Debug for VphyGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VphyGuard")
            .field("phy", &self.phy.name)
            .finish_non_exhaustive()
    }
}
