//! Stream timing as reported by the RX core, and its translation into the formats consumed by
//! video-pipeline clients.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use xvid_vphy::{ColorDepth, PixelsPerClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorFormat {
    #[default]
    Rgb,
    Ycrcb444,
    Ycrcb422,
    Ycrcb420,
}

impl ColorFormat {
    pub(crate) fn from_code(code: u32) -> Self {
        match code & 0x3 {
            0 => ColorFormat::Rgb,
            1 => ColorFormat::Ycrcb444,
            2 => ColorFormat::Ycrcb422,
            _ => ColorFormat::Ycrcb420,
        }
    }

    pub(crate) fn code(self) -> u32 {
        match self {
            ColorFormat::Rgb => 0,
            ColorFormat::Ycrcb444 => 1,
            ColorFormat::Ycrcb422 => 2,
            ColorFormat::Ycrcb420 => 3,
        }
    }
}

/// Depth code of the video properties register.
pub(crate) fn depth_from_code(code: u32) -> Option<ColorDepth> {
    Some(match code {
        0 => ColorDepth::Bpc6,
        1 => ColorDepth::Bpc8,
        2 => ColorDepth::Bpc10,
        3 => ColorDepth::Bpc12,
        4 => ColorDepth::Bpc16,
        _ => return None,
    })
}

pub(crate) fn depth_code(depth: ColorDepth) -> u32 {
    match depth {
        ColorDepth::Bpc6 => 0,
        ColorDepth::Bpc8 => 1,
        ColorDepth::Bpc10 => 2,
        ColorDepth::Bpc12 => 3,
        ColorDepth::Bpc16 => 4,
    }
}

/// Line and field timing of a stream. Field 1 values are only meaningful for interlaced streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VideoTiming {
    pub h_active: u32,
    pub h_front_porch: u32,
    pub h_sync_width: u32,
    pub h_back_porch: u32,
    pub h_total: u32,
    pub h_sync_positive: bool,
    pub v_active: u32,
    pub f0_pv_front_porch: u32,
    pub f0_pv_sync_width: u32,
    pub f0_pv_back_porch: u32,
    pub f0_pv_total: u32,
    pub f1_v_front_porch: u32,
    pub f1_v_sync_width: u32,
    pub f1_v_back_porch: u32,
    pub f1_v_total: u32,
    pub v_sync_positive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoStream {
    pub timing: VideoTiming,
    pub color_format: ColorFormat,
    pub color_depth: ColorDepth,
    pub pixels_per_clock: PixelsPerClock,
    pub frame_rate: u32,
    pub interlaced: bool,
}

impl VideoStream {
    /// Pixel clock derived from the line timing and the frame rate.
    pub fn pixel_clock_hz(&self) -> u64 {
        let t = &self.timing;
        let lines = if self.interlaced {
            (u64::from(t.f0_pv_total) + u64::from(t.f1_v_total)) * u64::from(self.frame_rate) / 2
        } else {
            u64::from(t.f0_pv_total) * u64::from(self.frame_rate)
        };
        lines * u64::from(t.h_total)
    }

    /// Component depth the video clock must be generated for. 4:2:2 is always carried in
    /// 8-bit containers on the link, whatever depth the source reports.
    pub fn clock_color_depth(&self) -> ColorDepth {
        match self.color_format {
            ColorFormat::Ycrcb422 => ColorDepth::Bpc8,
            _ => self.color_depth,
        }
    }

    pub fn mbus_format(&self) -> MbusFormat {
        MbusFormat {
            width: self.timing.h_active,
            height: self.timing.v_active,
            code: MbusCode::for_color_format(self.color_format),
            field: if self.interlaced {
                Field::Interlaced
            } else {
                Field::None
            },
            colorspace: match self.color_format {
                ColorFormat::Rgb => Colorspace::Srgb,
                _ => Colorspace::Rec709,
            },
        }
    }

    pub fn dv_timings(&self) -> DvTimings {
        let t = &self.timing;
        let mut polarities = Polarities::empty();
        polarities.set(Polarities::VSYNC_POS, t.v_sync_positive);
        polarities.set(Polarities::HSYNC_POS, t.h_sync_positive);
        DvTimings {
            width: t.h_active,
            height: t.v_active,
            interlaced: self.interlaced,
            polarities,
            pixelclock: self.pixel_clock_hz(),
            hfrontporch: t.h_front_porch,
            hsync: t.h_sync_width,
            hbackporch: t.h_back_porch,
            vfrontporch: t.f0_pv_front_porch,
            vsync: t.f0_pv_sync_width,
            vbackporch: t.f0_pv_back_porch,
            il_vfrontporch: t.f1_v_front_porch,
            il_vsync: t.f1_v_sync_width,
            il_vbackporch: t.f1_v_back_porch,
            standards: Standards::CEA861,
            flags: DvFlags::IS_CE_VIDEO,
        }
    }
}

/// Media bus pixel codes, numbered like the V4L2 `MEDIA_BUS_FMT_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum MbusCode {
    Rbg888_1x24 = 0x100e,
    Uyvy8_1x16 = 0x200f,
    Vuy8_1x24 = 0x2024,
}

impl MbusCode {
    pub fn for_color_format(format: ColorFormat) -> Self {
        match format {
            ColorFormat::Rgb => MbusCode::Rbg888_1x24,
            ColorFormat::Ycrcb444 => MbusCode::Vuy8_1x24,
            // 4:2:0 maps like 4:2:2 with the chroma of every other line omitted.
            ColorFormat::Ycrcb422 | ColorFormat::Ycrcb420 => MbusCode::Uyvy8_1x16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Field {
    None,
    Interlaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Colorspace {
    Srgb,
    Rec709,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MbusFormat {
    pub width: u32,
    pub height: u32,
    pub code: MbusCode,
    pub field: Field,
    pub colorspace: Colorspace,
}

impl Default for MbusFormat {
    /// The format reported before any stream was detected.
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            code: MbusCode::Rbg888_1x24,
            field: Field::None,
            colorspace: Colorspace::Srgb,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct Polarities: u32 {
        const VSYNC_POS = 1 << 0;
        const HSYNC_POS = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct Standards: u32 {
        const CEA861 = 1 << 0;
        const DMT = 1 << 1;
        const CVT = 1 << 2;
        const GTF = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct DvFlags: u32 {
        const IS_CE_VIDEO = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct DvCapabilities: u32 {
        const INTERLACED = 1 << 0;
        const PROGRESSIVE = 1 << 1;
        const REDUCED_BLANKING = 1 << 2;
        const CUSTOM = 1 << 3;
    }
}

/// BT.656/1120 timing description of a detected stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DvTimings {
    pub width: u32,
    /// Active lines of field 0.
    pub height: u32,
    pub interlaced: bool,
    pub polarities: Polarities,
    pub pixelclock: u64,
    pub hfrontporch: u32,
    pub hsync: u32,
    pub hbackporch: u32,
    pub vfrontporch: u32,
    pub vsync: u32,
    pub vbackporch: u32,
    pub il_vfrontporch: u32,
    pub il_vsync: u32,
    pub il_vbackporch: u32,
    pub standards: Standards,
    pub flags: DvFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DvTimingsCap {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub min_pixelclock: u64,
    pub max_pixelclock: u64,
    pub standards: Standards,
    pub capabilities: DvCapabilities,
}

impl DvTimingsCap {
    pub fn hdmi_rx() -> Self {
        Self {
            min_width: 0,
            max_width: 4096,
            min_height: 0,
            max_height: 2160,
            min_pixelclock: 25_000_000,
            max_pixelclock: 297_000_000,
            standards: Standards::CEA861 | Standards::DMT | Standards::GTF | Standards::CVT,
            capabilities: DvCapabilities::PROGRESSIVE
                | DvCapabilities::REDUCED_BLANKING
                | DvCapabilities::CUSTOM,
        }
    }
}

/// Inclusive frame size range of `enum_frame_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSizeRange {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// Common CEA/DMT modes for driving the simulated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoMode {
    #[serde(rename = "640x480p60")]
    Vga640x480p60,
    #[serde(rename = "1280x720p60")]
    Hd720p60,
    #[serde(rename = "1920x1080p60")]
    Fhd1080p60,
    #[serde(rename = "1920x1080i60")]
    Fhd1080i60,
    #[serde(rename = "3840x2160p30")]
    Uhd2160p30,
}

impl VideoMode {
    pub const ALL: [VideoMode; 5] = [
        VideoMode::Vga640x480p60,
        VideoMode::Hd720p60,
        VideoMode::Fhd1080p60,
        VideoMode::Fhd1080i60,
        VideoMode::Uhd2160p30,
    ];

    fn progressive(h: [u32; 5], v: [u32; 5], positive: bool) -> VideoTiming {
        VideoTiming {
            h_active: h[0],
            h_front_porch: h[1],
            h_sync_width: h[2],
            h_back_porch: h[3],
            h_total: h[4],
            h_sync_positive: positive,
            v_active: v[0],
            f0_pv_front_porch: v[1],
            f0_pv_sync_width: v[2],
            f0_pv_back_porch: v[3],
            f0_pv_total: v[4],
            v_sync_positive: positive,
            ..VideoTiming::default()
        }
    }

    pub fn timing(self) -> VideoTiming {
        match self {
            VideoMode::Vga640x480p60 => {
                Self::progressive([640, 16, 96, 48, 800], [480, 10, 2, 33, 525], false)
            }
            VideoMode::Hd720p60 => {
                Self::progressive([1280, 110, 40, 220, 1650], [720, 5, 5, 20, 750], true)
            }
            VideoMode::Fhd1080p60 => {
                Self::progressive([1920, 88, 44, 148, 2200], [1080, 4, 5, 36, 1125], true)
            }
            VideoMode::Fhd1080i60 => VideoTiming {
                f1_v_front_porch: 2,
                f1_v_sync_width: 5,
                f1_v_back_porch: 16,
                f1_v_total: 563,
                ..Self::progressive([1920, 88, 44, 148, 2200], [540, 2, 5, 15, 562], true)
            },
            VideoMode::Uhd2160p30 => {
                Self::progressive([3840, 176, 88, 296, 4400], [2160, 8, 10, 72, 2250], true)
            }
        }
    }

    pub fn frame_rate(self) -> u32 {
        match self {
            VideoMode::Uhd2160p30 => 30,
            _ => 60,
        }
    }

    pub fn is_interlaced(self) -> bool {
        self == VideoMode::Fhd1080i60
    }

    pub fn stream(self, color_format: ColorFormat, color_depth: ColorDepth) -> VideoStream {
        VideoStream {
            timing: self.timing(),
            color_format,
            color_depth,
            pixels_per_clock: PixelsPerClock::default(),
            frame_rate: self.frame_rate(),
            interlaced: self.is_interlaced(),
        }
    }
}
