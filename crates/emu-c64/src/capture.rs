//! Headless capture: PNG screenshots and WAV audio dumps.

use std::error::Error;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use mos_vic_ii::Frame;

/// Save a frame, layers composited, as a PNG file.
///
/// Pixels are ARGB32; the encoder gets opaque RGBA bytes.
pub fn save_screenshot(frame: &Frame, path: &Path) -> Result<(), Box<dyn Error>> {
    let width = u32::try_from(frame.width())?;
    let height = u32::try_from(frame.height())?;

    let file = fs::File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&to_rgba(&frame.composite()))?;
    Ok(())
}

fn to_rgba(pixels: &[u32]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&pixel| {
            let [_, r, g, b] = pixel.to_be_bytes();
            [r, g, b, 0xFF]
        })
        .collect()
}

/// Save mono samples in -1.0..=1.0 as a 16-bit PCM WAV file.
pub fn save_audio(samples: &[f32], sample_rate: u32, path: &Path) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * f32::from(i16::MAX)) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_becomes_opaque_rgba() {
        assert_eq!(
            to_rgba(&[0xFF11_2233, 0x0044_5566]),
            vec![0x11, 0x22, 0x33, 0xFF, 0x44, 0x55, 0x66, 0xFF]
        );
    }

    #[test]
    fn wav_has_one_sample_per_input() {
        let path = std::env::temp_dir().join(format!("emu-c64-capture-{}.wav", std::process::id()));
        save_audio(&[0.0, 0.5, -2.0], 22_050, &path).expect("write wav");
        let reader = hound::WavReader::open(&path).expect("read wav");
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.len(), 3);
        let _ = fs::remove_file(&path);
    }
}
