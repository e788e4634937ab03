use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use xvid_platform::{IrqTrigger, RegisterFile, RegisterKind};

use crate::irq::IrqSource;
use crate::link::{AudioStatus, AuxPacket};
use crate::regs::{self, CTRL, CTRL_CLR, CTRL_IE, CTRL_RUN, CTRL_SET, STA, STA_IRQ};
use crate::timing::{self, VideoStream};

/// Register-level model of the HDMI RX subsystem as seen from the cable side.
///
/// Events are posted into the status registers of their source and the interrupt line is
/// raised; a source whose block is not running drops its events.
pub struct RxHardware {
    regs: Arc<RegisterFile>,
    base: u32,
    trigger: Mutex<Option<IrqTrigger>>,
    line_masked: AtomicBool,
    hpd_assertions: Arc<AtomicU64>,
}

impl RxHardware {
    /// Builds the subsystem window with the RX core at `rx_offset`.
    pub fn new(subsystem_bytes: u32, rx_offset: u32) -> Self {
        let mut file = RegisterFile::new("hdmi-rx-ss", subsystem_bytes);
        for source in IrqSource::ALL {
            let block = rx_offset + source.block();
            file = file
                .with_set_clear(block + CTRL, block + CTRL_SET, block + CTRL_CLR)
                .with_kind(block + STA, RegisterKind::WriteOneToClear);
        }
        file = file
            .with_set_clear(
                rx_offset + regs::PIO_OUT,
                rx_offset + regs::PIO_OUT_SET,
                rx_offset + regs::PIO_OUT_CLR,
            )
            .with_kind(rx_offset + regs::PIO_IN, RegisterKind::ReadOnly)
            .with_kind(rx_offset + regs::PIO_IN_EVT, RegisterKind::WriteOneToClear);
        for offset in (regs::VTD_H_ACTIVE..=regs::VTD_PIXCLK).step_by(4) {
            file = file.with_kind(rx_offset + offset, RegisterKind::ReadOnly);
        }

        let hpd_assertions = Arc::new(AtomicU64::new(0));
        let pio_out = rx_offset + regs::PIO_OUT;
        file.set_write_observer({
            let hpd_assertions = Arc::clone(&hpd_assertions);
            Arc::new(move |offset, old, new| {
                if offset == pio_out && !old & new & regs::PIO_OUT_HPD != 0 {
                    hpd_assertions.fetch_add(1, Ordering::SeqCst);
                }
            })
        });

        Self {
            regs: Arc::new(file),
            base: rx_offset,
            trigger: Mutex::new(None),
            line_masked: AtomicBool::new(false),
            hpd_assertions,
        }
    }

    pub fn registers(&self) -> Arc<RegisterFile> {
        Arc::clone(&self.regs)
    }

    pub fn attach(&self, trigger: IrqTrigger) {
        *self.trigger.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(trigger);
    }

    fn read(&self, offset: u32) -> u32 {
        self.regs.hw_read(self.base + offset)
    }

    fn write(&self, offset: u32, value: u32) {
        self.regs.hw_write(self.base + offset, value)
    }

    fn is_running(&self, source: IrqSource) -> bool {
        self.read(source.block() + CTRL) & CTRL_RUN != 0
    }

    /// While masked, posted events latch in the status registers but the line is not delivered.
    /// Unmasking does not deliver it either; call [`RxHardware::resample`].
    pub fn mask_line(&self, masked: bool) {
        self.line_masked.store(masked, Ordering::SeqCst);
    }

    /// Delivers the line to the driver. Spurious when no enabled source is pending.
    pub fn resample(&self) {
        if self.line_masked.load(Ordering::SeqCst) {
            return;
        }
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(trigger) = trigger {
            trigger.raise();
        }
    }

    /// Returns whether the block was running and took the event.
    fn post(&self, source: IrqSource, events: u32) -> bool {
        if !self.is_running(source) {
            tracing::trace!(?source, "source stopped, dropping event");
            return false;
        }
        self.regs
            .hw_set_bits(self.base + source.block() + STA, STA_IRQ | events);
        self.resample();
        true
    }

    fn set_inputs(&self, mask: u32, on: bool) -> bool {
        let old = self.read(regs::PIO_IN);
        let new = if on { old | mask } else { old & !mask };
        let changed = old ^ new;
        if changed == 0 {
            return false;
        }
        self.write(regs::PIO_IN, new);
        self.regs
            .hw_set_bits(self.base + regs::PIO_IN_EVT, changed);
        self.post(IrqSource::Pio, 0)
    }

    pub fn plug(&self) -> bool {
        self.set_inputs(regs::PIO_IN_DET, true)
    }

    /// Pulls the cable: detect, link ready and video ready drop together.
    pub fn unplug(&self) -> bool {
        self.set_inputs(
            regs::PIO_IN_DET | regs::PIO_IN_LNK_RDY | regs::PIO_IN_VID_RDY,
            false,
        )
    }

    pub fn set_link_ready(&self, ready: bool) -> bool {
        self.set_inputs(regs::PIO_IN_LNK_RDY, ready)
    }

    pub fn set_video_ready(&self, ready: bool) -> bool {
        self.set_inputs(regs::PIO_IN_VID_RDY, ready)
    }

    pub fn set_hdmi_mode(&self, hdmi: bool) -> bool {
        self.set_inputs(regs::PIO_IN_MODE, hdmi)
    }

    /// The source signals the TMDS clock ratio through SCDC.
    pub fn scdc_update(&self, tmds_clock_ratio: u8) -> bool {
        let old = self.read(regs::PIO_IN);
        let new = if tmds_clock_ratio != 0 {
            old | regs::PIO_IN_TMDS_CLOCK_RATIO
        } else {
            old & !regs::PIO_IN_TMDS_CLOCK_RATIO
        };
        self.write(regs::PIO_IN, new);
        self.post(IrqSource::Ddc, regs::STA_DDC_SCDC_EVT)
    }

    pub fn edid_read(&self) -> bool {
        self.post(IrqSource::Ddc, regs::STA_DDC_EDID_EVT)
    }

    pub fn timer_expired(&self) -> bool {
        self.post(IrqSource::Tmr, regs::STA_TMR_EVT)
    }

    /// Loads the timing detector with `stream` and signals a timebase change.
    pub fn lock_timing(&self, stream: &VideoStream) -> bool {
        let t = &stream.timing;
        for (offset, value) in [
            (regs::VTD_H_ACTIVE, t.h_active),
            (regs::VTD_H_FRONT_PORCH, t.h_front_porch),
            (regs::VTD_H_SYNC_WIDTH, t.h_sync_width),
            (regs::VTD_H_BACK_PORCH, t.h_back_porch),
            (regs::VTD_H_TOTAL, t.h_total),
            (regs::VTD_V_ACTIVE, t.v_active),
            (regs::VTD_F0_V_FRONT_PORCH, t.f0_pv_front_porch),
            (regs::VTD_F0_V_SYNC_WIDTH, t.f0_pv_sync_width),
            (regs::VTD_F0_V_BACK_PORCH, t.f0_pv_back_porch),
            (regs::VTD_F0_V_TOTAL, t.f0_pv_total),
            (regs::VTD_F1_V_FRONT_PORCH, t.f1_v_front_porch),
            (regs::VTD_F1_V_SYNC_WIDTH, t.f1_v_sync_width),
            (regs::VTD_F1_V_BACK_PORCH, t.f1_v_back_porch),
            (regs::VTD_F1_V_TOTAL, t.f1_v_total),
            (regs::VTD_FRAME_RATE, stream.frame_rate),
        ] {
            self.write(offset, value);
        }
        let mut sig = 0;
        if t.h_sync_positive {
            sig |= regs::VTD_SIG_HSYNC_POS;
        }
        if t.v_sync_positive {
            sig |= regs::VTD_SIG_VSYNC_POS;
        }
        if stream.interlaced {
            sig |= regs::VTD_SIG_INTERLACED;
        }
        self.write(regs::VTD_SIG, sig);
        self.write(
            regs::VTD_VID_PROPS,
            stream.color_format.code() | timing::depth_code(stream.color_depth) << 2,
        );
        self.write(
            regs::VTD_PIXCLK,
            u32::try_from(stream.pixel_clock_hz()).unwrap_or(u32::MAX),
        );
        self.post(IrqSource::Vtd, regs::STA_VTD_TIMEBASE_EVT)
    }

    pub fn aux_packet(&self, packet: &AuxPacket) -> bool {
        self.write(regs::AUX_DATA, packet.header);
        for (index, word) in packet.data.iter().enumerate() {
            self.write(regs::AUX_DATA + 4 * (index as u32 + 1), *word);
        }
        self.post(IrqSource::Aux, regs::STA_AUX_NEW_EVT)
    }

    pub fn audio(&self, status: AudioStatus) -> bool {
        self.write(
            regs::AUD_STATUS,
            if status.active { regs::AUD_STATUS_ACTIVE } else { 0 },
        );
        self.write(regs::AUD_CHANNELS, status.channels);
        self.post(IrqSource::Aud, regs::STA_AUD_EVT)
    }

    pub fn link_errors(&self, errors: [u32; 3]) -> bool {
        for (offset, count) in regs::LNKSTA_ERR_CNT.into_iter().zip(errors) {
            self.write(offset, count);
        }
        self.post(IrqSource::LinkStatus, regs::STA_LNKSTA_ERR_EVT)
    }

    pub fn hpd(&self) -> bool {
        self.read(regs::PIO_OUT) & regs::PIO_OUT_HPD != 0
    }

    /// Rising edges of the hotplug output since the model was built.
    pub fn hpd_assertions(&self) -> u64 {
        self.hpd_assertions.load(Ordering::SeqCst)
    }

    pub fn link_enabled(&self) -> bool {
        self.read(regs::PIO_OUT) & regs::PIO_OUT_LNK_EN != 0
    }

    pub fn video_enabled(&self) -> bool {
        self.read(regs::PIO_OUT) & regs::PIO_OUT_VID_EN != 0
    }

    pub fn edid_ram(&self, len: usize) -> Vec<u8> {
        (0..len.div_ceil(4))
            .flat_map(|word| {
                self.read(regs::EDID_RAM + 4 * word as u32)
                    .to_le_bytes()
            })
            .take(len)
            .collect()
    }

    /// Sources with their interrupt enable set.
    pub fn interrupts_enabled(&self) -> Vec<IrqSource> {
        IrqSource::ALL
            .into_iter()
            .filter(|source| self.read(source.block() + CTRL) & CTRL_IE != 0)
            .collect()
    }
}
