//! The chip: register file, raster counter and scanline renderer.

use std::sync::Arc;

use emu_core::{Bus, InterruptSource, Observable, Peripheral, SyncContext, Value};

use crate::collision::{LineMask, SPRITE_HEIGHT};
use crate::frame::{Frame, FrameBuffers, FrameHandle, TRANSPARENT};
use crate::palette::argb;
use crate::timing::{Timing, TimingMode};

/// Bytes of address space the register file answers to.
pub const REGISTER_WINDOW: u16 = 0x40;

pub const REG_SPRITE_X_MSB: u8 = 0x10;
pub const REG_CONTROL_1: u8 = 0x11;
pub const REG_RASTER: u8 = 0x12;
pub const REG_SPRITE_ENABLE: u8 = 0x15;
pub const REG_SPRITE_EXPAND_Y: u8 = 0x17;
pub const REG_IRQ_STATUS: u8 = 0x19;
pub const REG_IRQ_ENABLE: u8 = 0x1A;
pub const REG_SPRITE_PRIORITY: u8 = 0x1B;
pub const REG_SPRITE_EXPAND_X: u8 = 0x1D;
pub const REG_SPRITE_SPRITE: u8 = 0x1E;
pub const REG_SPRITE_BACKGROUND: u8 = 0x1F;
pub const REG_BORDER: u8 = 0x20;
pub const REG_BACKGROUND: u8 = 0x21;
pub const REG_SPRITE_COLOUR: u8 = 0x27;
const LAST_REGISTER: u8 = 0x2E;

/// `$D011` display enable.
pub const CONTROL_DEN: u8 = 0x10;

/// `$D019`/`$D01A` sources.
pub const IRQ_RASTER: u8 = 0x01;
pub const IRQ_SPRITE_BACKGROUND: u8 = 0x02;
pub const IRQ_SPRITE_SPRITE: u8 = 0x04;
const IRQ_SOURCES: u8 = 0x0F;

/// Sprite X of the first text column.
const SPRITE_X_ORIGIN: isize = 24;
/// Sprite pointers sit in the last 8 bytes of the 1K screen block.
const SPRITE_POINTERS: u16 = 0x03F8;

/// Where the chip finds its memory and how large the text area is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VicConfig {
    pub timing: TimingMode,
    pub screen_ram: u16,
    pub colour_ram: u16,
    /// 2K of 8x8 glyphs, 8 bytes per screen code.
    pub char_memory: u16,
    pub text_columns: u16,
    pub text_rows: u16,
}

impl Default for VicConfig {
    fn default() -> Self {
        Self {
            timing: TimingMode::Pal,
            screen_ram: 0x0400,
            colour_ram: 0xD800,
            char_memory: 0x3800,
            text_columns: 40,
            text_rows: 25,
        }
    }
}

impl VicConfig {
    #[must_use]
    pub fn drawable_width(&self) -> u16 {
        self.text_columns * 8
    }

    #[must_use]
    pub fn drawable_height(&self) -> u16 {
        self.text_rows * 8
    }

    #[must_use]
    pub fn cells(&self) -> u16 {
        self.text_columns * self.text_rows
    }

    /// Border width on each side.
    #[must_use]
    pub fn border_left(&self) -> u16 {
        self.timing
            .timing()
            .visible_width
            .saturating_sub(self.drawable_width())
            / 2
    }

    /// Border height above the text area.
    #[must_use]
    pub fn border_top(&self) -> u16 {
        self.timing
            .timing()
            .visible_height
            .saturating_sub(self.drawable_height())
            / 2
    }
}

/// One sprite's contribution to the line being drawn.
struct SpriteLine {
    index: usize,
    mask: LineMask,
    colour: u32,
    behind_text: bool,
}

pub struct Vic {
    config: VicConfig,
    timing: Timing,
    regs: [u8; REGISTER_WINDOW as usize],
    raster_line: u16,
    /// Cycles into the current raster line.
    line_cycles: u32,
    raster_compare: u16,
    irq_status: u8,
    irq_enable: u8,
    sprite_sprite: u8,
    sprite_background: u8,
    buffers: FrameBuffers,
    interrupt: InterruptSource,
    frames: u64,
}

impl Vic {
    #[must_use]
    pub fn new(config: VicConfig, interrupt: InterruptSource) -> Self {
        let timing = config.timing.timing();
        let mut vic = Self {
            config,
            timing,
            regs: [0; REGISTER_WINDOW as usize],
            raster_line: 0,
            line_cycles: 0,
            raster_compare: 0,
            irq_status: 0,
            irq_enable: 0,
            sprite_sprite: 0,
            sprite_background: 0,
            buffers: FrameBuffers::new(
                usize::from(timing.visible_width),
                usize::from(timing.visible_height),
            ),
            interrupt,
            frames: 0,
        };
        vic.power_on_registers();
        vic
    }

    /// Registers come up as the KERNAL leaves them: display on, light blue
    /// border, blue background.
    fn power_on_registers(&mut self) {
        self.regs = [0; REGISTER_WINDOW as usize];
        self.regs[usize::from(REG_CONTROL_1)] = CONTROL_DEN | 0x0B;
        self.regs[usize::from(REG_BORDER)] = 0x0E;
        self.regs[usize::from(REG_BACKGROUND)] = 0x06;
    }

    pub fn reset(&mut self) {
        self.power_on_registers();
        self.raster_line = 0;
        self.line_cycles = 0;
        self.raster_compare = 0;
        self.irq_status = 0;
        self.irq_enable = 0;
        self.sprite_sprite = 0;
        self.sprite_background = 0;
    }

    #[must_use]
    pub fn config(&self) -> &VicConfig {
        &self.config
    }

    #[must_use]
    pub fn raster_line(&self) -> u16 {
        self.raster_line
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Read handle for the front frame, for a render thread.
    #[must_use]
    pub fn frame_handle(&self) -> FrameHandle {
        self.buffers.handle()
    }

    /// Last completed frame.
    #[must_use]
    pub fn current_frame(&self) -> Arc<Frame> {
        self.buffers.handle().current()
    }

    #[must_use]
    pub fn irq_active(&self) -> bool {
        self.irq_status & self.irq_enable & IRQ_SOURCES != 0
    }

    /// Run the beam forward by `cycles`, drawing each line it finishes.
    pub fn advance(&mut self, cycles: u32, bus: &mut (impl Bus + ?Sized)) {
        self.line_cycles += cycles;
        while self.line_cycles >= self.timing.cycles_per_line {
            self.line_cycles -= self.timing.cycles_per_line;
            self.render_line(bus);
            self.raster_line += 1;
            if self.raster_line >= self.timing.raster_lines {
                self.raster_line = 0;
            }
            if self.raster_line == self.raster_compare {
                self.irq_status |= IRQ_RASTER;
            }
        }
    }

    /// Publish the finished frame.
    pub fn end_frame(&mut self) {
        self.buffers.swap();
        self.frames += 1;
        log::trace!("vic frame {} presented", self.frames);
    }

    fn sprites_on_line(&self, bus: &(impl Bus + ?Sized)) -> Vec<SpriteLine> {
        let enable = self.regs[usize::from(REG_SPRITE_ENABLE)];
        let expand_y = self.regs[usize::from(REG_SPRITE_EXPAND_Y)];
        let expand_x = self.regs[usize::from(REG_SPRITE_EXPAND_X)];
        let priority = self.regs[usize::from(REG_SPRITE_PRIORITY)];
        let x_msb = self.regs[usize::from(REG_SPRITE_X_MSB)];
        let left = self.config.border_left() as isize;

        let mut sprites = Vec::new();
        for index in 0..8 {
            let bit = 1u8 << index;
            if enable & bit == 0 {
                continue;
            }
            let tall = expand_y & bit != 0;
            let height = if tall { SPRITE_HEIGHT * 2 } else { SPRITE_HEIGHT };
            let top = u16::from(self.regs[index * 2 + 1]);
            let line_in_sprite = self.raster_line.wrapping_sub(top);
            if line_in_sprite >= height {
                continue;
            }
            let data_line = if tall { line_in_sprite / 2 } else { line_in_sprite };

            let pointer = bus.peek(
                self.config
                    .screen_ram
                    .wrapping_add(SPRITE_POINTERS)
                    .wrapping_add(index as u16),
            );
            let base = (u16::from(pointer) * 64).wrapping_add(data_line * 3);
            let row = [
                bus.peek(base),
                bus.peek(base.wrapping_add(1)),
                bus.peek(base.wrapping_add(2)),
            ];

            let mut x = isize::from(self.regs[index * 2]);
            if x_msb & bit != 0 {
                x += 256;
            }
            sprites.push(SpriteLine {
                index,
                mask: LineMask::sprite_row(row, x - SPRITE_X_ORIGIN + left, expand_x & bit != 0),
                colour: argb(self.regs[usize::from(REG_SPRITE_COLOUR) + index]),
                behind_text: priority & bit != 0,
            });
        }
        sprites
    }

    fn render_line(&mut self, bus: &mut (impl Bus + ?Sized)) {
        let config = self.config;
        let Some(y) = config
            .timing
            .screen_line(self.raster_line, config.drawable_height())
        else {
            return;
        };

        let sprites = self.sprites_on_line(&*bus);
        let border = argb(self.regs[usize::from(REG_BORDER)]);
        let background = argb(self.regs[usize::from(REG_BACKGROUND)]);
        let display_on = self.regs[usize::from(REG_CONTROL_1)] & CONTROL_DEN != 0;
        let left = usize::from(config.border_left());
        let top = config.border_top();

        let mut text = LineMask::new();
        let (bg_row, fg_row) = self.buffers.back_mut().row_mut(usize::from(y));
        bg_row.fill(border);
        fg_row.fill(TRANSPARENT);

        if display_on && (top..top + config.drawable_height()).contains(&y) {
            let text_y = y - top;
            let glyph_line = text_y % 8;
            let first_cell = (text_y / 8) * config.text_columns;
            let right = (left + usize::from(config.drawable_width())).min(bg_row.len());
            bg_row[left.min(right)..right].fill(background);

            for column in 0..config.text_columns {
                let cell = first_cell + column;
                let code = bus.read(config.screen_ram.wrapping_add(cell));
                let colour = argb(bus.read(config.colour_ram.wrapping_add(cell)));
                let glyph = bus.peek(
                    config
                        .char_memory
                        .wrapping_add(u16::from(code) * 8 + glyph_line),
                );
                let x = left + usize::from(column) * 8;
                if x + 8 > bg_row.len() {
                    break;
                }
                for (i, pixel) in bg_row[x..x + 8].iter_mut().enumerate() {
                    if glyph & (0x80 >> i) != 0 {
                        *pixel = colour;
                    }
                }
                text.set_byte(x, glyph);
            }
        }

        // Sprite 0 has the highest priority, so draw it last
        for sprite in sprites.iter().rev() {
            for (x, pixel) in fg_row.iter_mut().enumerate() {
                if sprite.mask.get(x) && !(sprite.behind_text && text.get(x)) {
                    *pixel = sprite.colour;
                }
            }
        }

        let mut sprite_sprite = 0;
        let mut sprite_background = 0;
        for (n, a) in sprites.iter().enumerate() {
            if a.mask.overlaps(&text) {
                sprite_background |= 1 << a.index;
            }
            for b in &sprites[n + 1..] {
                if a.mask.overlaps(&b.mask) {
                    sprite_sprite |= (1 << a.index) | (1 << b.index);
                }
            }
        }
        self.latch_collisions(sprite_sprite, sprite_background);
    }

    /// Collision IRQs fire when a latch goes from empty to non-empty.
    fn latch_collisions(&mut self, sprite_sprite: u8, sprite_background: u8) {
        if sprite_sprite != 0 {
            if self.sprite_sprite == 0 {
                self.irq_status |= IRQ_SPRITE_SPRITE;
            }
            self.sprite_sprite |= sprite_sprite;
        }
        if sprite_background != 0 {
            if self.sprite_background == 0 {
                self.irq_status |= IRQ_SPRITE_BACKGROUND;
            }
            self.sprite_background |= sprite_background;
        }
    }

    /// Register read. `$1E`/`$1F` clear on read.
    pub fn read(&mut self, reg: u8) -> u8 {
        let value = self.peek(reg);
        match reg % REGISTER_WINDOW as u8 {
            REG_SPRITE_SPRITE => self.sprite_sprite = 0,
            REG_SPRITE_BACKGROUND => self.sprite_background = 0,
            _ => {}
        }
        value
    }

    /// Register read without side effects.
    #[must_use]
    pub fn peek(&self, reg: u8) -> u8 {
        match reg % REGISTER_WINDOW as u8 {
            REG_CONTROL_1 => {
                let raster_hi = if self.raster_line & 0x100 != 0 { 0x80 } else { 0 };
                (self.regs[usize::from(REG_CONTROL_1)] & 0x7F) | raster_hi
            }
            REG_RASTER => (self.raster_line & 0xFF) as u8,
            REG_IRQ_STATUS => {
                let any = if self.irq_active() { 0x80 } else { 0 };
                self.irq_status | any | 0x70
            }
            REG_IRQ_ENABLE => self.irq_enable | 0xF0,
            REG_SPRITE_SPRITE => self.sprite_sprite,
            REG_SPRITE_BACKGROUND => self.sprite_background,
            // Colour registers only have four bits
            r @ REG_BORDER..=LAST_REGISTER => self.regs[usize::from(r)] | 0xF0,
            r if r < REG_BORDER => self.regs[usize::from(r)],
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        let reg = reg % REGISTER_WINDOW as u8;
        self.regs[usize::from(reg)] = value;
        match reg {
            REG_CONTROL_1 => {
                self.raster_compare =
                    (self.raster_compare & 0x00FF) | (u16::from(value & 0x80) << 1);
            }
            REG_RASTER => {
                self.raster_compare = (self.raster_compare & 0x0100) | u16::from(value);
            }
            // Acknowledge by writing 1s
            REG_IRQ_STATUS => self.irq_status &= !value & IRQ_SOURCES,
            REG_IRQ_ENABLE => self.irq_enable = value & IRQ_SOURCES,
            _ => {}
        }
    }
}

impl Peripheral for Vic {
    fn on_after_instruction(&mut self, cycles: u32, ctx: &mut SyncContext<'_>) {
        self.advance(cycles, &mut *ctx.bus);
        ctx.interrupts.set(self.interrupt, self.irq_active());
    }

    fn on_end_frame(&mut self, _ctx: &mut SyncContext<'_>) {
        self.end_frame();
    }
}

const QUERY_PATHS: &[&str] = &[
    "raster_line",
    "raster_compare",
    "irq_status",
    "irq_enable",
    "border",
    "background",
    "sprite_enable",
    "sprite_collisions",
    "background_collisions",
    "frames",
];

impl Observable for Vic {
    fn query(&self, path: &str) -> Option<Value> {
        let value = match path {
            "raster_line" => self.raster_line.into(),
            "raster_compare" => self.raster_compare.into(),
            "irq_status" => self.irq_status.into(),
            "irq_enable" => self.irq_enable.into(),
            "border" => (self.regs[usize::from(REG_BORDER)] & 0x0F).into(),
            "background" => (self.regs[usize::from(REG_BACKGROUND)] & 0x0F).into(),
            "sprite_enable" => self.regs[usize::from(REG_SPRITE_ENABLE)].into(),
            "sprite_collisions" => self.sprite_sprite.into(),
            "background_collisions" => self.sprite_background.into(),
            "frames" => self.frames.into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::Memory;

    const PAL_LINE: u32 = 63;

    fn vic() -> Vic {
        Vic::new(VicConfig::default(), InterruptSource::irq(0x02))
    }

    #[test]
    fn raster_counts_lines_and_wraps() {
        let mut vic = vic();
        let mut mem = Memory::new();
        vic.advance(PAL_LINE * 10 + 5, &mut mem);
        assert_eq!(vic.raster_line(), 10);
        vic.advance(PAL_LINE * 302, &mut mem);
        assert_eq!(vic.raster_line(), 0);
    }

    #[test]
    fn raster_irq_fires_on_compare_line() {
        let mut vic = vic();
        let mut mem = Memory::new();
        vic.write(REG_RASTER, 100);
        vic.write(REG_IRQ_ENABLE, IRQ_RASTER);
        vic.advance(PAL_LINE * 99, &mut mem);
        assert!(!vic.irq_active());
        vic.advance(PAL_LINE, &mut mem);
        assert!(vic.irq_active());
        assert_eq!(vic.peek(REG_IRQ_STATUS) & 0x81, 0x81);

        vic.write(REG_IRQ_STATUS, IRQ_RASTER);
        assert!(!vic.irq_active());
    }

    #[test]
    fn raster_compare_bit_eight_comes_from_control() {
        let mut vic = vic();
        vic.write(REG_RASTER, 0x05);
        vic.write(REG_CONTROL_1, 0x9B);
        assert_eq!(vic.query("raster_compare"), Some(Value::U16(0x105)));
    }

    #[test]
    fn colour_registers_read_back_with_high_nibble_set() {
        let mut vic = vic();
        vic.write(REG_BORDER, 0x02);
        assert_eq!(vic.read(REG_BORDER), 0xF2);
        assert_eq!(vic.peek(0x3F), 0xFF);
    }

    #[test]
    fn collision_latch_clears_on_read_but_not_peek() {
        let mut vic = vic();
        vic.latch_collisions(0x03, 0);
        assert_eq!(vic.peek(REG_SPRITE_SPRITE), 0x03);
        assert_eq!(vic.read(REG_SPRITE_SPRITE), 0x03);
        assert_eq!(vic.read(REG_SPRITE_SPRITE), 0x00);
    }

    #[test]
    fn collision_irq_only_on_first_latch() {
        let mut vic = vic();
        vic.write(REG_IRQ_ENABLE, IRQ_SPRITE_SPRITE);
        vic.latch_collisions(0x03, 0);
        assert!(vic.irq_active());
        vic.write(REG_IRQ_STATUS, IRQ_SPRITE_SPRITE);
        vic.latch_collisions(0x03, 0);
        assert!(!vic.irq_active());
    }

    #[test]
    fn borders_are_even_for_default_layout() {
        let config = VicConfig::default();
        assert_eq!(config.border_left(), 32);
        assert_eq!(config.border_top(), 36);
    }
}
