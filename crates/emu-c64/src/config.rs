//! System configuration.
//!
//! Built once, validated eagerly, never mutated afterwards. Every chip gets
//! a copy of the part it needs when the system is constructed.

use std::fmt;

use mos_vic_ii::{DISPLAY_START_LINE, MAX_LINE_WIDTH, REGISTER_WINDOW, TimingMode, VicConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const SID_WINDOW: u32 = 0x20;
const CIA_WINDOW: u32 = 0x10;
/// 256 glyphs of 8 bytes.
const CHAR_MEMORY_LEN: u32 = 0x800;
/// Screen RAM block, sprite pointers included.
const SCREEN_BLOCK_LEN: u32 = 0x400;
const SAMPLE_RATES: std::ops::RangeInclusive<u32> = 8_000..=192_000;

/// One-byte memory-mapped mailboxes shared with the running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Bit 0: new frame produced. Bit 1: emulator finished the frame.
    pub frame_status: u16,
    /// Last key pressed; clears on read.
    pub key_pressed: u16,
    /// Key currently held, 0 when none.
    pub key_down: u16,
    /// Last key released; clears on read.
    pub key_released: u16,
    /// Fresh random byte every frame.
    pub random: u16,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            frame_status: 0xCF00,
            key_pressed: 0xCF01,
            key_down: 0xCF02,
            key_released: 0xCF03,
            random: 0xCF04,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct C64Config {
    pub timing: TimingMode,
    pub screen_ram: u16,
    pub colour_ram: u16,
    pub char_memory: u16,
    pub text_columns: u16,
    pub text_rows: u16,
    pub vic_base: u16,
    pub sid_base: u16,
    pub cia1_base: u16,
    pub cia2_base: u16,
    pub mailboxes: MailboxConfig,
    pub sample_rate: u32,
    /// Hold the CPU at each frame end until the program acknowledges it.
    pub wait_for_frame_ack: bool,
    pub frame_ack_max_cycles: u64,
    /// Seed for the random mailbox; entropy when absent.
    pub random_seed: Option<u64>,
}

impl Default for C64Config {
    fn default() -> Self {
        Self {
            timing: TimingMode::Pal,
            screen_ram: 0x0400,
            colour_ram: 0xD800,
            char_memory: 0x3800,
            text_columns: 40,
            text_rows: 25,
            vic_base: 0xD000,
            sid_base: 0xD400,
            cia1_base: 0xDC00,
            cia2_base: 0xDD00,
            mailboxes: MailboxConfig::default(),
            sample_rate: 48_000,
            wait_for_frame_ack: false,
            frame_ack_max_cycles: 1_000_000,
            random_seed: None,
        }
    }
}

/// A named span of the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    name: &'static str,
    start: u16,
    len: u32,
}

impl Region {
    fn end(&self) -> u32 {
        u32::from(self.start) + self.len
    }

    fn overlaps(&self, other: &Region) -> bool {
        u32::from(self.start) < other.end() && u32::from(other.start) < self.end()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.end().saturating_sub(1);
        write!(f, "{} ${:04X}-${last:04X}", self.name, self.start)
    }
}

impl C64Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn vic(&self) -> VicConfig {
        VicConfig {
            timing: self.timing,
            screen_ram: self.screen_ram,
            colour_ram: self.colour_ram,
            char_memory: self.char_memory,
            text_columns: self.text_columns,
            text_rows: self.text_rows,
        }
    }

    #[must_use]
    pub fn cycles_per_frame(&self) -> u32 {
        self.timing.cycles_per_frame()
    }

    fn cells(&self) -> u32 {
        u32::from(self.text_columns) * u32::from(self.text_rows)
    }

    fn regions(&self) -> Vec<Region> {
        let region = |name, start, len| Region { name, start, len };
        let mb = &self.mailboxes;
        vec![
            region("screen RAM", self.screen_ram, self.cells().max(SCREEN_BLOCK_LEN)),
            region("colour RAM", self.colour_ram, self.cells()),
            region("character memory", self.char_memory, CHAR_MEMORY_LEN),
            region("VIC registers", self.vic_base, u32::from(REGISTER_WINDOW)),
            region("SID registers", self.sid_base, SID_WINDOW),
            region("CIA1 registers", self.cia1_base, CIA_WINDOW),
            region("CIA2 registers", self.cia2_base, CIA_WINDOW),
            region("frame status mailbox", mb.frame_status, 1),
            region("key pressed mailbox", mb.key_pressed, 1),
            region("key down mailbox", mb.key_down, 1),
            region("key released mailbox", mb.key_released, 1),
            region("random mailbox", mb.random, 1),
        ]
    }

    /// Check the whole configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        let regions = self.regions();
        for region in &regions {
            if region.end() > 0x1_0000 {
                violations.push(format!("{region} runs past $FFFF"));
            }
        }
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                if a.overlaps(b) {
                    violations.push(format!("{a} overlaps {b}"));
                }
            }
        }

        let vic = self.vic();
        let timing = self.timing.timing();
        if self.text_columns == 0 || self.text_rows == 0 {
            violations.push("text area is empty".to_owned());
        }
        if vic.drawable_width() > timing.visible_width
            || vic.drawable_height() > timing.visible_height
        {
            violations.push(format!(
                "text area {}x{} does not fit the {}x{} visible area",
                vic.drawable_width(),
                vic.drawable_height(),
                timing.visible_width,
                timing.visible_height
            ));
        }
        if !self.timing.can_centre(vic.drawable_height()) {
            violations.push(format!(
                "text area {} lines tall leaves a top border of {} lines, more than the {} raster lines above the display",
                vic.drawable_height(),
                self.timing.top_border(vic.drawable_height()),
                DISPLAY_START_LINE
            ));
        }
        if usize::from(timing.visible_width) > MAX_LINE_WIDTH {
            violations.push(format!(
                "visible width {} exceeds {MAX_LINE_WIDTH} pixels",
                timing.visible_width
            ));
        }
        if !SAMPLE_RATES.contains(&self.sample_rate) {
            violations.push(format!(
                "sample rate {} Hz outside {}-{} Hz",
                self.sample_rate,
                SAMPLE_RATES.start(),
                SAMPLE_RATES.end()
            ));
        }
        if self.wait_for_frame_ack && self.frame_ack_max_cycles == 0 {
            violations.push("frame acknowledge wait needs a nonzero cycle cap".to_owned());
        }

        if violations.is_empty() {
            log::debug!("configuration accepted");
            Ok(())
        } else {
            Err(ConfigError::Invalid(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(C64Config::default().validate().is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let config = C64Config {
            colour_ram: 0x0500,
            sample_rate: 0,
            ..C64Config::default()
        };
        let Err(ConfigError::Invalid(violations)) = config.validate() else {
            panic!("expected invalid");
        };
        assert_eq!(violations.len(), 2, "{violations:?}");
        assert!(violations[0].contains("screen RAM $0400-$07FF overlaps colour RAM"));
        assert!(violations[1].contains("sample rate"));
    }

    #[test]
    fn mailbox_inside_register_window_is_rejected() {
        let config = C64Config {
            mailboxes: MailboxConfig {
                random: 0xDC05,
                ..MailboxConfig::default()
            },
            ..C64Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CIA1 registers $DC00-$DC0F overlaps random mailbox"));
    }

    #[test]
    fn oversized_text_area_and_wrap() {
        let config = C64Config {
            text_columns: 60,
            colour_ram: 0xFF00,
            ..C64Config::default()
        };
        let Err(ConfigError::Invalid(violations)) = config.validate() else {
            panic!("expected invalid");
        };
        assert!(violations.iter().any(|v| v.contains("runs past $FFFF")));
        assert!(violations.iter().any(|v| v.contains("does not fit")));
    }

    #[test]
    fn short_text_area_is_rejected() {
        let mut config = C64Config {
            text_rows: 21,
            ..C64Config::default()
        };
        let Err(ConfigError::Invalid(violations)) = config.validate() else {
            panic!("expected invalid");
        };
        assert!(violations.iter().any(|v| v.contains("top border of 52 lines")));
        config.text_rows = 22;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_ack_cap_only_matters_when_waiting() {
        let mut config = C64Config {
            frame_ack_max_cycles: 0,
            ..C64Config::default()
        };
        assert!(config.validate().is_ok());
        config.wait_for_frame_ack = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = C64Config::from_json(r#"{"timing":"ntsc","screen_ram":2048}"#)
            .expect("valid config");
        assert_eq!(config.timing, TimingMode::Ntsc);
        assert_eq!(config.screen_ram, 0x0800);
        assert_eq!(config.colour_ram, 0xD800);
        assert!(matches!(
            C64Config::from_json("{"),
            Err(ConfigError::Json(_))
        ));
    }
}
