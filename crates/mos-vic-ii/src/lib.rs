//! MOS 6569/6567 VIC-II.
//!
//! A scanline rasterizer rather than a cycle-exact one: each raster line
//! is drawn in one go once the CPU has spent that line's cycles. Text mode
//! only, 8x8 glyphs, plus eight 24x21 hires sprites with expansion,
//! priority and collision latches.
//!
//! Screen and colour RAM are fetched through the bus; glyph and sprite
//! data are peeked, since the chip only ever sees plain RAM there.
//!
//! Frames are double-buffered. [`Vic::frame_handle`] gives a thread-safe
//! reader that always sees a complete frame.

mod collision;
mod frame;
pub mod palette;
mod timing;
mod vic;

pub use collision::{LineMask, MAX_LINE_WIDTH, SPRITE_HEIGHT, SPRITE_WIDTH};
pub use frame::{Frame, FrameBuffers, FrameHandle, TRANSPARENT};
pub use timing::{DISPLAY_START_LINE, Timing, TimingMode};
pub use vic::{
    CONTROL_DEN, IRQ_RASTER, IRQ_SPRITE_BACKGROUND, IRQ_SPRITE_SPRITE, REG_BACKGROUND,
    REG_BORDER, REG_CONTROL_1, REG_IRQ_ENABLE, REG_IRQ_STATUS, REG_RASTER, REG_SPRITE_BACKGROUND,
    REG_SPRITE_COLOUR, REG_SPRITE_ENABLE, REG_SPRITE_EXPAND_X, REG_SPRITE_EXPAND_Y,
    REG_SPRITE_PRIORITY, REG_SPRITE_SPRITE, REG_SPRITE_X_MSB, REGISTER_WINDOW, Vic, VicConfig,
};
