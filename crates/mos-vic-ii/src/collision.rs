//! Per-scanline pixel coverage for collision detection.
//!
//! Every sprite on a line and the text foreground beneath it are reduced
//! to a bitmap across the visible width. Two things collide on that line
//! when the AND of their bitmaps is nonzero.

/// Widest visible line a mask can hold.
pub const MAX_LINE_WIDTH: usize = 512;

const WORDS: usize = MAX_LINE_WIDTH / 64;

/// Sprite width in unexpanded pixels.
pub const SPRITE_WIDTH: usize = 24;
/// Sprite height in unexpanded lines.
pub const SPRITE_HEIGHT: u16 = 21;

/// One bit per pixel of a visible line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineMask([u64; WORDS]);

impl LineMask {
    #[must_use]
    pub const fn new() -> Self {
        Self([0; WORDS])
    }

    /// Set pixel `x`. Pixels past the mask are ignored.
    pub fn set(&mut self, x: usize) {
        if x < MAX_LINE_WIDTH {
            self.0[x / 64] |= 1 << (x % 64);
        }
    }

    #[must_use]
    pub fn get(&self, x: usize) -> bool {
        x < MAX_LINE_WIDTH && self.0[x / 64] & (1 << (x % 64)) != 0
    }

    /// Set eight pixels from `bits`, MSB leftmost, starting at `x`.
    pub fn set_byte(&mut self, x: usize, bits: u8) {
        for i in 0..8 {
            if bits & (0x80 >> i) != 0 {
                self.set(x + i);
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// The two masks share at least one pixel.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    /// Place one 24-pixel sprite row with its left edge at `x` (may be
    /// negative or run past the edge; off-line pixels are dropped).
    #[must_use]
    pub fn sprite_row(row: [u8; 3], x: isize, expand_x: bool) -> Self {
        let bits = u32::from_be_bytes([0, row[0], row[1], row[2]]);
        let scale: isize = if expand_x { 2 } else { 1 };
        let mut mask = Self::new();
        for i in 0..SPRITE_WIDTH {
            if bits & (0x80_0000 >> i) == 0 {
                continue;
            }
            for dup in 0..scale {
                let px = x + i as isize * scale + dup;
                if let Ok(px) = usize::try_from(px) {
                    mask.set(px);
                }
            }
        }
        mask
    }
}
