//! Creative Voice File (VOC) decoder.
//!
//! Expands a VOC byte buffer into a single contiguous mono PCM16 stream at
//! one reference sample rate, the rate of the first sound/silence block
//! encountered. Only the 8-bit unsigned PCM codec is supported, matching
//! the asset format actually shipped by the game this core was built for.
//!
//! Reference: <https://moddingwiki.shikadi.net/wiki/VOC_Format>

use crate::error::{AudioError, AudioResult};

const VOC_HEADER_SIG: &[u8; 20] = b"Creative Voice File\x1A";
const MAX_NESTED_REPEATS: usize = 8;

const BLOCK_TERMINATOR: u8 = 0x00;
const BLOCK_SOUND_DATA: u8 = 0x01;
const BLOCK_SOUND_CONT: u8 = 0x02;
const BLOCK_SILENCE: u8 = 0x03;
const BLOCK_TEXT: u8 = 0x05;
const BLOCK_REPEAT: u8 = 0x06;
const BLOCK_END_REPEAT: u8 = 0x07;

const CODEC_PCM_U8: u8 = 0;

/// Output of `decode`: one contiguous mono PCM16 stream and its rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVoc {
    pub pcm: Box<[i16]>,
    pub rate: u32,
}

struct RepeatFrame {
    jump_pos: usize,
    remaining: u16,
}

/// Converts a VOC "time constant" byte into a sample rate in Hz.
fn timeconst_to_rate(time_constant: u8) -> Option<u32> {
    let denom = 256u32.checked_sub(time_constant as u32)?;
    if denom == 0 {
        return None;
    }
    Some(1_000_000u32 / denom)
}

/// 16.16 fixed-point linear-interpolation resample of a mono PCM16 buffer.
fn resample_linear(src: &[i16], src_rate: u32, dst_rate: u32) -> Vec<i16> {
    if src.is_empty() || src_rate == 0 || dst_rate == 0 {
        return Vec::new();
    }
    if src_rate == dst_rate {
        return src.to_vec();
    }

    let step_fp = (((src_rate as u64) << 16) / dst_rate as u64).max(1) as u32;
    let est = ((src.len() as u64 * dst_rate as u64) + (src_rate as u64 - 1)) / src_rate as u64;
    let mut out = Vec::with_capacity(est as usize);

    let mut pos_fp: u64 = 0;
    loop {
        let idx = (pos_fp >> 16) as usize;
        if idx >= src.len() {
            break;
        }
        let frac = (pos_fp & 0xFFFF) as i64;
        let s0 = src[idx] as i64;
        let s1 = if idx + 1 < src.len() { src[idx + 1] as i64 } else { s0 };
        let sample = ((s0 * (65536 - frac) + s1 * frac) >> 16) as i16;
        out.push(sample);
        pos_fp += step_fp as u64;
    }
    out
}

/// Converts unsigned 8-bit PCM to signed 16-bit: `(s - 128) << 8`.
fn u8_to_i16(s: u8) -> i16 {
    ((s as i32 - 128) << 8) as i16
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    cur_time_constant: u8,
    cur_codec: u8,
    overall_rate: u32,
    pcm: Vec<i16>,
    repeat_stack: Vec<RepeatFrame>,
}

impl<'a> Decoder<'a> {
    fn append_sound(&mut self, raw_u8: &[u8], block_rate: u32) -> AudioResult<()> {
        if raw_u8.is_empty() {
            return Ok(());
        }
        let converted: Vec<i16> = raw_u8.iter().map(|&b| u8_to_i16(b)).collect();
        let to_append = if block_rate == self.overall_rate {
            converted
        } else {
            resample_linear(&converted, block_rate, self.overall_rate)
        };
        self.pcm
            .try_reserve(to_append.len())
            .map_err(|_| AudioError::OutOfMemory)?;
        self.pcm.extend_from_slice(&to_append);
        Ok(())
    }

    fn append_silence(&mut self, duration_minus_1: u16, block_rate: u32) -> AudioResult<()> {
        let in_samples = duration_minus_1 as u64 + 1;
        let out_samples = if block_rate == self.overall_rate {
            in_samples
        } else {
            (in_samples * self.overall_rate as u64 + (block_rate as u64 / 2)) / block_rate as u64
        };
        self.pcm
            .try_reserve(out_samples as usize)
            .map_err(|_| AudioError::OutOfMemory)?;
        self.pcm.resize(self.pcm.len() + out_samples as usize, 0);
        Ok(())
    }
}

/// Decodes a Creative Voice File into a single PCM16 stream.
///
/// Fails with [`AudioError::InvalidInput`] on a malformed header, a block
/// length that overruns the buffer, an unsupported codec, a time constant
/// yielding a zero-denominator rate, or an end-repeat with no matching
/// repeat. A VOC with no sound/silence block is also a failure: there is
/// no rate to report. Fails with [`AudioError::OutOfMemory`] if growing
/// the output buffer for a sound or silence block cannot allocate.
pub fn decode(data: &[u8]) -> AudioResult<DecodedVoc> {
    if data.len() < 4 {
        return Err(AudioError::InvalidInput("buffer too short for a VOC block".into()));
    }

    let mut pos = 0usize;
    if data.len() >= 26 && &data[..20] == VOC_HEADER_SIG.as_slice() {
        let data_ofs = u16::from_le_bytes([data[20], data[21]]) as usize;
        if data_ofs >= data.len() {
            return Err(AudioError::InvalidInput("VOC header data offset out of range".into()));
        }
        pos = data_ofs;
    }

    let mut dec = Decoder {
        data,
        pos,
        cur_time_constant: 0,
        cur_codec: 0xff,
        overall_rate: 0,
        pcm: Vec::new(),
        repeat_stack: Vec::new(),
    };

    loop {
        if dec.pos >= dec.data.len() {
            break;
        }
        let block_type = dec.data[dec.pos];
        dec.pos += 1;
        if block_type == BLOCK_TERMINATOR {
            break;
        }

        if dec.pos + 3 > dec.data.len() {
            return Err(AudioError::InvalidInput("truncated block length".into()));
        }
        let block_len = u32::from_le_bytes([
            dec.data[dec.pos],
            dec.data[dec.pos + 1],
            dec.data[dec.pos + 2],
            0,
        ]) as usize;
        dec.pos += 3;
        let payload = dec.pos;

        if payload + block_len > dec.data.len() {
            return Err(AudioError::InvalidInput("block payload overruns buffer".into()));
        }

        match block_type {
            BLOCK_SOUND_DATA => {
                if block_len < 2 {
                    return Err(AudioError::InvalidInput("sound-data block too short".into()));
                }
                dec.cur_time_constant = dec.data[payload];
                dec.cur_codec = dec.data[payload + 1];
                if dec.cur_codec != CODEC_PCM_U8 {
                    return Err(AudioError::InvalidInput(format!(
                        "unsupported VOC codec {}",
                        dec.cur_codec
                    )));
                }
                let rate = timeconst_to_rate(dec.cur_time_constant)
                    .ok_or_else(|| AudioError::InvalidInput("time constant yields rate 0".into()))?;
                if dec.overall_rate == 0 {
                    dec.overall_rate = rate;
                }
                let raw = dec.data[payload + 2..payload + block_len].to_vec();
                dec.append_sound(&raw, rate)?;
            }
            BLOCK_SOUND_CONT => {
                if dec.cur_codec != CODEC_PCM_U8 {
                    return Err(AudioError::InvalidInput("continue block with no active codec".into()));
                }
                let rate = timeconst_to_rate(dec.cur_time_constant)
                    .ok_or_else(|| AudioError::InvalidInput("time constant yields rate 0".into()))?;
                if dec.overall_rate == 0 {
                    dec.overall_rate = rate;
                }
                let raw = dec.data[payload..payload + block_len].to_vec();
                dec.append_sound(&raw, rate)?;
            }
            BLOCK_SILENCE => {
                if block_len < 3 {
                    return Err(AudioError::InvalidInput("silence block too short".into()));
                }
                let dur = u16::from_le_bytes([dec.data[payload], dec.data[payload + 1]]);
                let tc = dec.data[payload + 2];
                let rate = timeconst_to_rate(tc)
                    .ok_or_else(|| AudioError::InvalidInput("time constant yields rate 0".into()))?;
                if dec.overall_rate == 0 {
                    dec.overall_rate = rate;
                }
                dec.append_silence(dur, rate)?;
            }
            BLOCK_TEXT => {
                // Ignored.
            }
            BLOCK_REPEAT => {
                if block_len < 2 {
                    return Err(AudioError::InvalidInput("repeat block too short".into()));
                }
                let mut count = u16::from_le_bytes([dec.data[payload], dec.data[payload + 1]]);
                if count == 0xFFFF {
                    count = 0; // guarantee termination
                }
                if dec.repeat_stack.len() < MAX_NESTED_REPEATS {
                    dec.repeat_stack.push(RepeatFrame {
                        jump_pos: payload + block_len,
                        remaining: count,
                    });
                }
                // Depth exceeding MAX_NESTED_REPEATS is tolerated silently:
                // the excess repeat simply isn't tracked, matching the
                // reference decoder's behavior of pushing past capacity.
            }
            BLOCK_END_REPEAT => {
                let mut frame = dec
                    .repeat_stack
                    .pop()
                    .ok_or_else(|| AudioError::InvalidInput("end-repeat with no matching repeat".into()))?;
                if frame.remaining > 0 {
                    frame.remaining -= 1;
                    let jump_pos = frame.jump_pos;
                    dec.repeat_stack.push(frame);
                    dec.pos = jump_pos;
                    continue;
                }
            }
            _ => {
                // Skip unknown blocks.
            }
        }

        dec.pos = payload + block_len;
    }

    if dec.overall_rate == 0 {
        return Err(AudioError::InvalidInput("VOC contains no sound/silence block".into()));
    }

    Ok(DecodedVoc {
        pcm: dec.pcm.into_boxed_slice(),
        rate: dec.overall_rate,
    })
}
