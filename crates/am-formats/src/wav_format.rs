//! WAV encoding and decoding for PCM audio.

use std::io::Write;

use am_engine::Frame;
use am_ir::{Sample, SampleData};

use crate::FormatError;

// --- Writing ---

/// Encode rendered frames as 16-bit PCM. The channel count comes from the
/// first frame (stereo when empty).
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let num_channels = frames.first().map_or(2, |f| f.channels.max(1)) as u16;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let data_size = frames.len() as u32 * block_align as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&num_channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for frame in frames {
        for ch in 0..num_channels as usize {
            buf.extend_from_slice(&frame.samples[ch].to_le_bytes());
        }
    }
    buf
}

pub fn write_wav(w: &mut impl Write, frames: &[Frame], sample_rate: u32) -> std::io::Result<()> {
    w.write_all(&frames_to_wav(frames, sample_rate))
}

// --- Reading ---

/// Load a WAV file into a mono sample.
///
/// 8- and 16-bit PCM are accepted; stereo input is averaged to mono. A
/// `smpl` chunk supplies the root key and the first loop.
pub fn load_wav(data: &[u8], name: &str) -> Result<Sample, FormatError> {
    let header = parse_header(data)?;
    let end = (header.data_offset + header.data_size).min(data.len());
    let raw = &data[header.data_offset..end];

    let pcm = match (header.bits_per_sample, header.num_channels) {
        (8, 1) => SampleData::Mono8(raw.iter().map(|&b| (b as i16 - 128) as i8).collect()),
        (8, 2) => SampleData::Mono8(
            raw.chunks_exact(2)
                .map(|c| ((c[0] as i16 + c[1] as i16) / 2 - 128) as i8)
                .collect(),
        ),
        (16, 1) => SampleData::Mono16(raw.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()),
        (16, 2) => SampleData::Mono16(
            raw.chunks_exact(4)
                .map(|c| {
                    let l = i16::from_le_bytes([c[0], c[1]]) as i32;
                    let r = i16::from_le_bytes([c[2], c[3]]) as i32;
                    ((l + r) / 2) as i16
                })
                .collect(),
        ),
        (bits, channels) => {
            return Err(FormatError::UnsupportedWav(format!("{bits}-bit, {channels} channels")))
        }
    };

    let mut sample = Sample::new(name);
    sample.data = pcm;
    sample.sample_rate = header.sample_rate;
    if let Some(smpl) = header.smpl {
        sample.root_key = smpl.root_key.min(127) as u8;
        if let Some((start, end)) = smpl.first_loop {
            // `smpl` loop ends are inclusive.
            sample = sample.with_loop(start, end.saturating_add(1));
        }
    }
    tracing::trace!(name, frames = sample.len(), rate = sample.sample_rate, "wav loaded");
    Ok(sample)
}

struct SmplChunk {
    root_key: u32,
    first_loop: Option<(u32, u32)>,
}

struct WavHeader {
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
    smpl: Option<SmplChunk>,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < 12 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;
    let mut smpl = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;
        let body = pos + 8;

        if chunk_id == b"fmt " && chunk_size >= 16 && body + 16 <= data.len() {
            let format = read_u16_le(data, body);
            if format != 1 {
                return Err(FormatError::UnsupportedWav(format!("format tag {format}")));
            }
            fmt = Some((read_u16_le(data, body + 2), read_u32_le(data, body + 4), read_u16_le(data, body + 14)));
        } else if chunk_id == b"data" {
            data_chunk = Some((body, chunk_size));
        } else if chunk_id == b"smpl" && chunk_size >= 36 && body + 36 <= data.len() {
            let loops = read_u32_le(data, body + 28);
            let first_loop = (loops > 0 && chunk_size >= 60 && body + 60 <= data.len())
                .then(|| (read_u32_le(data, body + 44), read_u32_le(data, body + 48)));
            smpl = Some(SmplChunk { root_key: read_u32_le(data, body + 12), first_loop });
        }

        pos = body.saturating_add(chunk_size);
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (num_channels, sample_rate, bits_per_sample) = fmt.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::UnexpectedEof)?;
    Ok(WavHeader { num_channels, sample_rate, bits_per_sample, data_offset, data_size, smpl })
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
