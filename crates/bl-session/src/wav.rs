//! WAV encoding for 16-bit PCM.

use std::io::Write;

/// Encode planar stereo f32 into a 16-bit stereo WAV stream.
pub fn write_wav(
    w: &mut impl Write,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> std::io::Result<()> {
    debug_assert_eq!(left.len(), right.len());
    let num_channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let data_size = left.len() as u32 * block_align as u32;

    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, num_channels, sample_rate, block_align, bits_per_sample)?;
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for (&l, &r) in left.iter().zip(right) {
        w.write_all(&to_i16(l).to_le_bytes())?;
        w.write_all(&to_i16(r).to_le_bytes())?;
    }
    Ok(())
}

/// Encode planar stereo f32 into an in-memory WAV file.
pub fn channels_to_wav(left: &[f32], right: &[f32], sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    write_wav(&mut buf, left, right, sample_rate).expect("Vec<u8> write cannot fail");
    buf
}

/// Encode interleaved f32 capture data into an in-memory WAV file.
pub fn interleaved_to_wav(samples: &[f32], num_channels: u16, sample_rate: u32) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let frames = samples.len() / num_channels.max(1) as usize;
    let data_size = frames as u32 * block_align as u32;

    let mut buf = Vec::new();
    let w = &mut buf;
    let encode = |w: &mut Vec<u8>| -> std::io::Result<()> {
        write_riff_header(w, data_size)?;
        write_fmt_chunk(w, num_channels, sample_rate, block_align, bits_per_sample)?;
        w.write_all(b"data")?;
        w.write_all(&data_size.to_le_bytes())?;
        for &s in &samples[..frames * num_channels as usize] {
            w.write_all(&to_i16(s).to_le_bytes())?;
        }
        Ok(())
    };
    encode(w).expect("Vec<u8> write cannot fail");
    buf
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(
    w: &mut impl Write,
    num_channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
) -> std::io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&num_channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let wav = channels_to_wav(&[0.0; 4], &[0.0; 4], 44100);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        // 4 frames * 4 bytes
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 16);
        assert_eq!(wav.len(), 44 + 16);
    }

    #[test]
    fn samples_clamp_and_scale() {
        let wav = channels_to_wav(&[1.5, -1.5], &[0.0, 0.0], 44100);
        let first = i16::from_le_bytes(wav[44..46].try_into().unwrap());
        let third = i16::from_le_bytes(wav[48..50].try_into().unwrap());
        assert_eq!(first, 32767);
        assert_eq!(third, -32767);
    }

    #[test]
    fn interleaved_mono_layout() {
        let wav = interleaved_to_wav(&[0.5; 10], 1, 48000);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 20);
        let rate = u32::from_le_bytes(wav[24..28].try_into().unwrap());
        assert_eq!(rate, 48000);
    }
}
