//! The 16 VIC-II colours as ARGB32 (VICE PAL values).

pub const PALETTE: [u32; 16] = [
    0xFF00_0000, // black
    0xFFFF_FFFF, // white
    0xFF88_3932, // red
    0xFF67_B6BD, // cyan
    0xFF8B_3F96, // purple
    0xFF55_A049, // green
    0xFF40_318D, // blue
    0xFFBF_CE72, // yellow
    0xFF8B_5429, // orange
    0xFF57_4200, // brown
    0xFFB8_6962, // light red
    0xFF50_5050, // dark grey
    0xFF78_7878, // grey
    0xFF94_E089, // light green
    0xFF78_68C0, // light blue
    0xFF9F_9F9F, // light grey
];

/// Colour register or colour RAM value to ARGB. Only the low nibble is
/// wired.
#[must_use]
pub fn argb(colour: u8) -> u32 {
    PALETTE[usize::from(colour & 0x0F)]
}
