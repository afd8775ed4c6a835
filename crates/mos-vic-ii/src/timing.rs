//! Video timing variants.
//!
//! Each variant is a plain record of constants. The drawable text area is
//! centred in the visible area, so the first visible raster line is chosen
//! to put the same number of border lines above and below it.

/// Raster line on which the text area starts, on every variant.
pub const DISPLAY_START_LINE: u16 = 0x33;

/// Chip revision, selected once at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimingMode {
    /// 6569, 50 Hz.
    #[default]
    Pal,
    /// 6567R8, 60 Hz.
    Ntsc,
    /// 6567R56A, 60 Hz with 64-cycle lines.
    NtscOld,
}

/// Timing constants of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub cpu_clock_hz: u32,
    pub cycles_per_line: u32,
    pub raster_lines: u16,
    /// Visible area in pixels, border included.
    pub visible_width: u16,
    pub visible_height: u16,
}

impl Timing {
    #[must_use]
    pub const fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_line * self.raster_lines as u32
    }
}

impl TimingMode {
    #[must_use]
    pub const fn timing(self) -> Timing {
        match self {
            Self::Pal => Timing {
                cpu_clock_hz: 985_248,
                cycles_per_line: 63,
                raster_lines: 312,
                visible_width: 384,
                visible_height: 272,
            },
            Self::Ntsc => Timing {
                cpu_clock_hz: 1_022_727,
                cycles_per_line: 65,
                raster_lines: 263,
                visible_width: 384,
                visible_height: 224,
            },
            Self::NtscOld => Timing {
                cpu_clock_hz: 1_022_727,
                cycles_per_line: 64,
                raster_lines: 262,
                visible_width: 384,
                visible_height: 222,
            },
        }
    }

    #[must_use]
    pub const fn cycles_per_frame(self) -> u32 {
        self.timing().cycles_per_frame()
    }

    #[must_use]
    pub const fn cpu_clock_hz(self) -> u32 {
        self.timing().cpu_clock_hz
    }

    /// Border lines above a text area `drawable_height` pixels tall.
    #[must_use]
    pub const fn top_border(self, drawable_height: u16) -> u16 {
        self.timing().visible_height.saturating_sub(drawable_height) / 2
    }

    /// Whether the top border fits above [`DISPLAY_START_LINE`], so the text
    /// area can start on that line and stay centred.
    #[must_use]
    pub const fn can_centre(self, drawable_height: u16) -> bool {
        self.top_border(drawable_height) <= DISPLAY_START_LINE
    }

    /// First raster line shown, for a text area `drawable_height` pixels
    /// tall. Clamped to line 0 for layouts [`can_centre`](Self::can_centre)
    /// rejects.
    #[must_use]
    pub const fn first_visible_line(self, drawable_height: u16) -> u16 {
        DISPLAY_START_LINE.saturating_sub(self.top_border(drawable_height))
    }

    /// Screen row for a raster line, or `None` in the vertical blank.
    #[must_use]
    pub const fn screen_line(self, raster_line: u16, drawable_height: u16) -> Option<u16> {
        let first = self.first_visible_line(drawable_height);
        if raster_line < first {
            return None;
        }
        let line = raster_line - first;
        if line < self.timing().visible_height {
            Some(line)
        } else {
            None
        }
    }
}
