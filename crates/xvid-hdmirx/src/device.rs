//! HDMI RX device: bind/remove, interrupt halves, PHY callbacks and the client API.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use xvid_platform::{
    Clock, DelayedWork, IrqReturn, IrqTrigger, LockClass, OrderedMutex, RegisterWindow,
    ResourceError, ResourceProvider, ThreadedIrq, ThreadedIrqHandler,
};
use xvid_vphy::{
    ChannelId, Direction, LaneHandle, PhyLinkHandler, PhyProvider, Vphy, VphyError, VphyGuard,
};

use crate::config::HdmiRxConfig;
use crate::core::{CorePhase, RxCore};
use crate::edid::{EdidData, EdidSource, EdidStore, EDID_FIRMWARE};
use crate::error::HdmiRxError;
use crate::irq::{CauseSnapshot, IrqSource};
use crate::link::{LinkState, LinkStateMachine, LinkStats, SideChannel};
use crate::regs::{self, RxRegs};
use crate::timing::{DvTimings, DvTimingsCap, FrameSizeRange, MbusFormat, VideoStream};

/// Lock class of the RX device mutex. Ranks below the PHY so it is always taken first.
pub const HDMIRX_LOCK: LockClass = LockClass::new("xhdmirx", 10);

const IRQ_NAME: &str = "xilinx-hdmi-rx";

/// Lanes the receiver takes from the PHY, one per TMDS data channel.
const RX_LANES: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RxStats {
    /// Top halves that latched at least one cause.
    pub top_halves: u64,
    pub bottom_halves: u64,
    /// Dispatches per source, indexed like [`IrqSource::ALL`].
    pub irq_causes: [u64; 7],
    pub missing_snapshots: u64,
    pub hotplug_assertions: u64,
    pub link: LinkStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RxStatus {
    pub link_state: LinkState,
    pub stream_up: bool,
    pub core_phase: CorePhase,
    pub tmds_clock_ratio: u8,
    pub hdmi_mode: bool,
    pub ref_clk_hz: u64,
    pub line_rate_mbps: u64,
    pub edid_source: EdidSource,
    pub edid_blocks: u32,
}

struct RxState {
    core: RxCore,
    link: LinkStateMachine,
    edid: EdidStore,
    bottom_halves: u64,
    irq_causes: [u64; 7],
}

/// State shared with the top half. Only ever held for a few register accesses.
#[derive(Default)]
struct IrqLatch {
    snapshot: Option<CauseSnapshot>,
    teardown: bool,
    top_halves: u64,
    missing_snapshots: u64,
}

struct RxShared {
    name: String,
    config: HdmiRxConfig,
    regs: RxRegs,
    phy: Arc<Vphy>,
    state: OrderedMutex<RxState>,
    latch: Mutex<IrqLatch>,
    hpd_hold: Arc<AtomicBool>,
    hotplug_assertions: AtomicU64,
}

impl RxShared {
    fn lock_latch(&self) -> MutexGuard<'_, IrqLatch> {
        self.latch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_torn_down(&self) -> bool {
        self.lock_latch().teardown
    }

    fn reenable_interrupts(&self) {
        let latch = self.lock_latch();
        if !latch.teardown {
            self.regs.intr_enable_all();
        }
    }

    /// Deferred end of an EDID commit.
    fn assert_hotplug(&self) {
        self.hpd_hold.store(false, Ordering::Release);
        self.regs.set_hpd(true);
        self.hotplug_assertions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(device = %self.name, "hotplug asserted");
    }
}

impl ThreadedIrqHandler for RxShared {
    fn is_asserted(&self) -> bool {
        IrqSource::ALL
            .into_iter()
            .any(|source| self.regs.source_asserted(source))
    }

    fn hard_irq(&self) -> IrqReturn {
        let mut latch = self.lock_latch();
        if latch.teardown {
            return IrqReturn::None;
        }
        let snapshot = CauseSnapshot::latch(&self.regs);
        if snapshot.is_empty() {
            return IrqReturn::None;
        }
        self.regs.intr_disable_all();
        latch.top_halves += 1;
        latch.snapshot = Some(match latch.snapshot.take() {
            Some(pending) => pending.merge(snapshot),
            None => snapshot,
        });
        IrqReturn::WakeThread
    }

    fn thread_fn(&self) -> IrqReturn {
        let snapshot = {
            let mut latch = self.lock_latch();
            if latch.teardown {
                tracing::debug!(device = %self.name, "bottom half during teardown");
                return IrqReturn::Handled;
            }
            let snapshot = latch.snapshot.take();
            if snapshot.is_none() {
                latch.missing_snapshots += 1;
            }
            snapshot
        };
        let Some(snapshot) = snapshot else {
            tracing::error!(device = %self.name, err = %HdmiRxError::MissingCauseSnapshot, "rx bottom half");
            self.reenable_interrupts();
            return IrqReturn::None;
        };

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.bottom_halves += 1;
            tracing::trace!(device = %self.name, causes = %snapshot, "rx interrupt");
            for source in snapshot.pending() {
                state.irq_causes[source.index()] += 1;
                state.core.service(source, &mut state.link);
            }
        }
        self.reenable_interrupts();
        IrqReturn::Handled
    }
}

impl PhyLinkHandler for RxShared {
    fn link_init<'a>(&self, held: VphyGuard<'a>) -> VphyGuard<'a> {
        if self.is_torn_down() {
            return held;
        }
        let phy = held.release();
        let mut guard = self.state.lock();
        let mut held = phy.acquire();
        let state = &mut *guard;
        let ratio = state.core.ref_clock_change_init(&mut state.link);
        held.set_rx_tmds_clock_ratio(ratio);
        drop(guard);
        held
    }

    fn link_ready<'a>(&self, held: VphyGuard<'a>) -> VphyGuard<'a> {
        if self.is_torn_down() {
            return held;
        }
        let phy = held.release();
        let mut state = self.state.lock();
        let held = phy.acquire();
        let channel = ChannelId::for_pll(held.pll_type(Direction::Rx));
        let ref_clk_hz = held.ref_clk_hz(Direction::Rx);
        let line_rate_mbps = held.line_rate_hz(channel) / 1_000_000;
        state.core.set_stream(ref_clk_hz, line_rate_mbps);
        drop(state);
        held
    }
}

/// Clocks enabled at bind, gated again on drop.
struct RxClocks(Vec<Arc<Clock>>);

impl RxClocks {
    fn acquire(platform: &dyn ResourceProvider) -> Result<Self, HdmiRxError> {
        let mut clocks = RxClocks(Vec::with_capacity(3));
        for (name, required) in [("video", true), ("axi-lite", true), ("dru-clk", false)] {
            let clock = match platform.clock(name) {
                Ok(clock) => clock,
                Err(ResourceError::NotFound(_)) if !required => {
                    tracing::debug!(device = platform.name(), clock = name, "optional clock absent");
                    continue;
                }
                Err(err) => {
                    if err.is_deferred() {
                        tracing::debug!(device = platform.name(), clock = name, "clock not ready");
                    } else {
                        tracing::error!(device = platform.name(), clock = name, %err, "failed to get clock");
                    }
                    return Err(err.into());
                }
            };
            clock.prepare_enable()?;
            tracing::debug!(device = platform.name(), clock = name, rate_hz = clock.rate_hz(), "clock enabled");
            clocks.0.push(clock);
        }
        Ok(clocks)
    }
}

impl Drop for RxClocks {
    fn drop(&mut self) {
        for clock in self.0.iter().rev() {
            clock.disable_unprepare();
        }
    }
}

/// PHY lanes initialised at bind, exited again on drop.
struct RxLanes(Vec<LaneHandle>);

impl RxLanes {
    fn acquire(consumer: &str, phys: &dyn PhyProvider) -> Result<Self, HdmiRxError> {
        let mut lanes = RxLanes(Vec::with_capacity(usize::from(RX_LANES)));
        for index in 0..RX_LANES {
            let name = format!("hdmi-phy{index}");
            let lane = phys.get_phy(consumer, &name).map_err(|err| {
                if err.is_deferred() {
                    tracing::debug!(device = consumer, lane = %name, "video phy not ready");
                } else {
                    tracing::error!(device = consumer, lane = %name, %err, "failed to get phy lane");
                }
                err
            })?;
            lane.init().map_err(|err| match err {
                VphyError::Gone => HdmiRxError::PhyUnavailable(index),
                other => {
                    tracing::error!(device = consumer, lane = index, err = %other, "failed to init phy lane");
                    other.into()
                }
            })?;
            lanes.0.push(lane);
        }
        Ok(lanes)
    }

    fn coordinator(&self) -> Result<Arc<Vphy>, HdmiRxError> {
        self.0
            .first()
            .and_then(LaneHandle::coordinator)
            .ok_or(HdmiRxError::PhyUnavailable(0))
    }
}

impl Drop for RxLanes {
    fn drop(&mut self) {
        for lane in self.0.iter().rev() {
            lane.exit();
        }
    }
}

/// A bound HDMI RX subsystem.
pub struct HdmiRx {
    shared: Arc<RxShared>,
    hotplug: DelayedWork,
    irq: Option<ThreadedIrq>,
    clocks: Option<RxClocks>,
    lanes: Option<RxLanes>,
}

impl fmt::Debug for HdmiRx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdmiRx")
            .field("name", &self.shared.name)
            .field("irq", &self.irq)
            .finish_non_exhaustive()
    }
}

impl HdmiRx {
    pub fn bind(
        config: HdmiRxConfig,
        platform: &dyn ResourceProvider,
        phys: &dyn PhyProvider,
    ) -> Result<Self, HdmiRxError> {
        config.validate()?;
        let name = platform.name().to_string();
        let mmio = platform.mmio(0)?;
        if u64::from(config.hdmi_rx_offset) + u64::from(regs::WINDOW_BYTES) > mmio.size {
            tracing::error!(device = %name, offset = config.hdmi_rx_offset, "rx core outside the subsystem window");
            return Err(HdmiRxError::AddressOutOfRange {
                offset: config.hdmi_rx_offset,
                size: mmio.size,
            });
        }

        let clocks = RxClocks::acquire(platform)?;
        let line = platform.irq(0)?;
        let lanes = RxLanes::acquire(&name, phys)?;
        let phy = lanes.coordinator()?;

        let regs = RxRegs::new(
            RegisterWindow::new(mmio.bus, config.hdmi_rx_offset, regs::WINDOW_BYTES),
            config.edid_ram_size,
        );
        let hpd_hold = Arc::new(AtomicBool::new(false));
        let state = RxState {
            core: RxCore::new(
                regs.clone(),
                config.input_pixels_per_clock,
                config.max_bits_per_component,
                Arc::clone(&hpd_hold),
            ),
            link: LinkStateMachine::new(name.clone(), Arc::clone(&phy)),
            edid: EdidStore::new(config.edid_blocks_max()),
            bottom_halves: 0,
            irq_causes: [0; 7],
        };
        let shared = Arc::new(RxShared {
            state: OrderedMutex::new(HDMIRX_LOCK, Arc::clone(phy.lock_monitor()), state),
            name,
            config,
            regs,
            phy,
            latch: Mutex::new(IrqLatch::default()),
            hpd_hold,
            hotplug_assertions: AtomicU64::new(0),
        });

        let hotplug = DelayedWork::new(&format!("{}-hotplug", shared.name), {
            let shared = Arc::<RxShared>::downgrade(&shared);
            move || {
                if let Some(shared) = shared.upgrade() {
                    shared.assert_hotplug();
                }
            }
        })?;

        {
            let mut state = shared.state.lock();
            state.core.cfg_initialize();
            if let Some(image) = platform.firmware(EDID_FIRMWARE) {
                match EdidStore::check_firmware(&image, shared.config.edid_blocks_max()) {
                    Ok(_) => state.edid.replace(EdidSource::Firmware, &image),
                    Err(err) => tracing::warn!(
                        device = %shared.name,
                        firmware = EDID_FIRMWARE,
                        max_blocks = shared.config.edid_blocks_max(),
                        %err,
                        "using built-in edid instead"
                    ),
                }
            }
            tracing::info!(
                device = %shared.name,
                source = ?state.edid.source(),
                blocks = state.edid.active_blocks(),
                "edid loaded"
            );
            shared.regs.load_edid(state.edid.active());
            {
                let _latch = shared.lock_latch();
                shared.regs.intr_disable_all();
            }
            let handler: Weak<dyn PhyLinkHandler> = Arc::<RxShared>::downgrade(&shared);
            shared.phy.acquire().set_link_handler(Direction::Rx, handler);
        }

        let handler: Weak<dyn ThreadedIrqHandler> = Arc::<RxShared>::downgrade(&shared);
        let irq = match ThreadedIrq::request(line, IRQ_NAME, handler) {
            Ok(irq) => irq,
            Err(err) => {
                tracing::error!(device = %shared.name, line, %err, "unable to request irq");
                shared.phy.acquire().clear_link_handler(Direction::Rx);
                return Err(err.into());
            }
        };

        {
            let _latch = shared.lock_latch();
            shared.regs.intr_enable_all();
        }
        tracing::info!(
            device = %shared.name,
            line,
            phy = shared.phy.name(),
            ppc = shared.config.input_pixels_per_clock.count(),
            max_bpc = %shared.config.max_bits_per_component,
            "hdmi rx bound"
        );
        Ok(Self {
            shared,
            hotplug,
            irq: Some(irq),
            clocks: Some(clocks),
            lanes: Some(lanes),
        })
    }

    /// Unbinds the device. Idempotent; also run on drop.
    pub fn remove(&mut self) {
        if self.irq.is_none() && self.clocks.is_none() {
            return;
        }
        {
            let mut latch = self.shared.lock_latch();
            self.shared.regs.intr_disable_all();
            latch.teardown = true;
        }
        self.hotplug.cancel_sync();
        drop(self.irq.take());
        self.shared.phy.acquire().clear_link_handler(Direction::Rx);
        drop(self.clocks.take());
        drop(self.lanes.take());
        tracing::info!(device = %self.shared.name, "hdmi rx removed");
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &HdmiRxConfig {
        &self.shared.config
    }

    pub fn phy(&self) -> &Arc<Vphy> {
        &self.shared.phy
    }

    pub fn edid_blocks_max(&self) -> u32 {
        self.shared.config.edid_blocks_max()
    }

    pub fn irq_trigger(&self) -> Option<IrqTrigger> {
        self.irq.as_ref().map(ThreadedIrq::trigger)
    }

    /// Waits for a queued or running bottom half to finish.
    pub fn synchronize_irq(&self) {
        if let Some(irq) = &self.irq {
            irq.synchronize();
        }
    }

    /// Runs a pending hotplug re-assertion now. Returns whether one was pending.
    pub fn flush_hotplug(&self) -> bool {
        self.hotplug.flush()
    }

    pub fn hotplug_pending(&self) -> bool {
        self.hotplug.is_pending()
    }

    fn check_pad(pad: u32) -> Result<(), HdmiRxError> {
        if pad != 0 {
            return Err(HdmiRxError::InvalidPad(pad));
        }
        Ok(())
    }

    /// Timings of the current stream, or [`HdmiRxError::NoLink`] while no stream is up.
    pub fn query_dv_timings(&self) -> Result<DvTimings, HdmiRxError> {
        self.shared
            .state
            .lock()
            .link
            .detected_timings()
            .ok_or(HdmiRxError::NoLink)
    }

    pub fn get_format(&self, pad: u32) -> Result<MbusFormat, HdmiRxError> {
        Self::check_pad(pad)?;
        let state = self.shared.state.lock();
        if !state.link.is_stream_up() {
            return Err(HdmiRxError::NoLink);
        }
        Ok(state.link.detected_format())
    }

    /// The receiver cannot be told a format; the detected format is returned instead.
    pub fn set_format(&self, pad: u32, requested: &MbusFormat) -> Result<MbusFormat, HdmiRxError> {
        let format = self.get_format(pad)?;
        if format != *requested {
            tracing::debug!(device = %self.shared.name, ?requested, detected = ?format, "set_format overridden");
        }
        Ok(format)
    }

    /// Reads up to `blocks` blocks of the active EDID. `blocks == 0` only queries the size.
    pub fn get_edid(&self, pad: u32, start_block: u32, blocks: u32) -> Result<EdidData, HdmiRxError> {
        Self::check_pad(pad)?;
        if start_block != 0 {
            return Err(HdmiRxError::InvalidArgument("start block must be 0"));
        }
        Ok(self.shared.state.lock().edid.read(blocks))
    }

    /// Replaces the EDID. Hotplug stays low until the new blocks have been in the EDID RAM
    /// for the hotplug delay. An empty `data` reverts to the built-in EDID the same way.
    pub fn set_edid(&self, pad: u32, start_block: u32, data: &[u8]) -> Result<(), HdmiRxError> {
        Self::check_pad(pad)?;
        if start_block != 0 {
            return Err(HdmiRxError::InvalidArgument("start block must be 0"));
        }
        let blocks = EdidStore::check_len(data, self.edid_blocks_max())?;

        let mut state = self.shared.state.lock();
        self.hotplug.cancel_sync();
        self.shared.hpd_hold.store(true, Ordering::Release);
        self.shared.regs.set_hpd(false);
        state.edid.replace(EdidSource::User, data);
        self.shared.regs.load_edid(state.edid.active());
        self.hotplug.schedule(self.shared.config.hotplug_delay());
        tracing::info!(
            device = %self.shared.name,
            blocks,
            source = ?state.edid.source(),
            "edid replaced"
        );
        Ok(())
    }

    pub fn dv_timings_cap(&self, pad: u32) -> Result<DvTimingsCap, HdmiRxError> {
        Self::check_pad(pad)?;
        Ok(DvTimingsCap::hdmi_rx())
    }

    /// Any size within the timing capabilities; there is no discrete set.
    pub fn enum_frame_size(&self, pad: u32) -> Result<FrameSizeRange, HdmiRxError> {
        Self::check_pad(pad)?;
        let cap = DvTimingsCap::hdmi_rx();
        Ok(FrameSizeRange {
            min_width: 1,
            max_width: cap.max_width,
            min_height: 1,
            max_height: cap.max_height,
        })
    }

    /// The receiver streams whenever the link is up; nothing to start or stop.
    pub fn s_stream(&self, enable: bool) -> Result<(), HdmiRxError> {
        tracing::debug!(device = %self.shared.name, enable, "s_stream");
        Ok(())
    }

    pub fn link_state(&self) -> LinkState {
        self.shared.state.lock().link.state()
    }

    pub fn detected_stream(&self) -> Option<VideoStream> {
        self.shared.state.lock().link.detected_stream()
    }

    pub fn side_channel(&self) -> SideChannel {
        self.shared.state.lock().link.side_channel()
    }

    pub fn status(&self) -> RxStatus {
        let state = self.shared.state.lock();
        RxStatus {
            link_state: state.link.state(),
            stream_up: state.link.is_stream_up(),
            core_phase: state.core.phase(),
            tmds_clock_ratio: state.core.tmds_clock_ratio(),
            hdmi_mode: state.core.is_hdmi_mode(),
            ref_clk_hz: state.core.ref_clk_hz(),
            line_rate_mbps: state.core.line_rate_mbps(),
            edid_source: state.edid.source(),
            edid_blocks: state.edid.active_blocks(),
        }
    }

    pub fn stats(&self) -> RxStats {
        let (top_halves, missing_snapshots) = {
            let latch = self.shared.lock_latch();
            (latch.top_halves, latch.missing_snapshots)
        };
        let state = self.shared.state.lock();
        RxStats {
            top_halves,
            bottom_halves: state.bottom_halves,
            irq_causes: state.irq_causes,
            missing_snapshots,
            hotplug_assertions: self.shared.hotplug_assertions.load(Ordering::Relaxed),
            link: state.link.stats(),
        }
    }

    /// Runs the bottom half directly, as the interrupt thread would after a top half.
    #[doc(hidden)]
    pub fn run_bottom_half(&self) -> IrqReturn {
        self.shared.thread_fn()
    }

    #[doc(hidden)]
    pub fn run_top_half(&self) -> IrqReturn {
        self.shared.hard_irq()
    }

    /// Marks the device as tearing down without unbinding it.
    #[doc(hidden)]
    pub fn begin_teardown(&self) {
        let mut latch = self.shared.lock_latch();
        self.shared.regs.intr_disable_all();
        latch.teardown = true;
    }
}

impl Drop for HdmiRx {
    fn drop(&mut self) {
        self.remove();
    }
}
