//! Real-time mixer: combines the OPL2 ring, a preemptive one-shot sample
//! channel, and the PC-speaker generator into a single host-rate PCM16
//! stream.
//!
//! `Mixer` itself holds no lock — the two-mutex policy described by the
//! engine (one guarding this struct, one guarding the OPL2 register state)
//! is composed by [`crate::engine::AudioEngine`]. `generate` takes the
//! OPL2 pull as a closure so this module has no compile-time dependency
//! on the `opl2` module and the caller controls exactly when the OPL2
//! mutex is held.

use std::sync::Arc;

use crate::ring::Opl2Ring;
use crate::pcspeaker::PcSpeaker;

/// Callback invoked exactly once per sample-channel completion. Stored as
/// a cheaply-cloneable `Arc` so `Mixer` can capture it while a caller-held
/// lock is in effect and hand the clone back to be invoked after the lock
/// is released, without losing the installed callback.
pub type SoundFinishedCallback = Arc<dyn Fn() + Send + Sync>;

/// Fixed Q8.8 mix volumes. Chosen to match the reference mixer: OPL2 and
/// the one-shot sample channel dominate, the PC-speaker sits underneath.
const VOL_OPL2: i32 = 160;
const VOL_SFX: i32 = 200;
const VOL_PC: i32 = 120;

/// Scratch size for pulling OPL2 samples into the ring per `generate`
/// iteration. Stack-allocated, so the steady path never allocates.
const OPL2_SCRATCH: usize = 64;

struct SampleChannel {
    pcm: Box<[i16]>,
    frames: u32,
    pos_fp: u64,
    step_fp: u32,
    is_voc: bool,
}

impl SampleChannel {
    /// Advances by one host sample and returns `(sample, just_finished)`.
    fn next(&mut self) -> (i16, bool) {
        let idx = (self.pos_fp >> 16) as usize;
        if idx >= self.frames as usize {
            return (0, true);
        }
        let frac = (self.pos_fp & 0xFFFF) as i64;
        let s0 = self.pcm[idx] as i64;
        let s1 = if idx + 1 < self.frames as usize {
            self.pcm[idx + 1] as i64
        } else {
            s0
        };
        let sample = ((s0 * (65536 - frac) + s1 * frac) >> 16) as i16;

        self.pos_fp += self.step_fp as u64;
        let done = (self.pos_fp >> 16) as usize >= self.frames as usize;
        (sample, done)
    }
}

pub struct Mixer {
    host_rate: u32,
    opl2_enabled: bool,
    opl2_cursor_fp: u64,
    opl2_step_fp: u32,
    ring: Opl2Ring,
    sample: Option<SampleChannel>,
    pcspeaker: PcSpeaker,
    sound_finished_cb: Option<SoundFinishedCallback>,
}

impl Mixer {
    /// Creates mixer state for a given host device rate. Corresponds to
    /// `init(host_rate)`: the engine guarantees this runs exactly once.
    pub fn new(host_rate: u32) -> Self {
        let opl2_step_fp = ((crate::opl2::NATIVE_RATE_HZ as u64) << 16) / host_rate.max(1) as u64;
        Self {
            host_rate,
            opl2_enabled: true,
            opl2_cursor_fp: 0,
            opl2_step_fp: opl2_step_fp.max(1) as u32,
            ring: Opl2Ring::new(),
            sample: None,
            pcspeaker: PcSpeaker::new(host_rate),
            sound_finished_cb: None,
        }
    }

    pub fn set_opl2_enabled(&mut self, enabled: bool) {
        self.opl2_enabled = enabled;
    }

    pub fn set_pc_divisor(&mut self, divisor: u16) {
        self.pcspeaker.set_divisor(divisor);
    }

    pub fn set_sound_finished_callback(&mut self, cb: Option<SoundFinishedCallback>) {
        self.sound_finished_cb = cb;
    }

    pub fn is_sample_playing(&self) -> bool {
        self.sample.is_some()
    }

    pub fn is_voc_playing(&self) -> bool {
        self.sample.as_ref().is_some_and(|s| s.is_voc)
    }

    /// Replaces any currently playing sample without invoking the
    /// completion callback. Takes ownership of `pcm`; an empty buffer,
    /// zero frame count, or zero source rate silently drops it and
    /// leaves the channel idle.
    pub fn play_pcm16(&mut self, pcm: Box<[i16]>, frames: u32, src_rate: u32, is_voc: bool) {
        self.sample = None; // preemption: old buffer freed, no callback
        if pcm.is_empty() || frames == 0 || src_rate == 0 {
            return;
        }
        let step_fp = (((src_rate as u64) << 16) / self.host_rate.max(1) as u64).max(1) as u32;
        self.sample = Some(SampleChannel {
            pcm,
            frames,
            pos_fp: 0,
            step_fp,
            is_voc,
        });
    }

    /// Equivalent to `play_pcm16` of an all-zero buffer of `frames` frames.
    pub fn play_silence(&mut self, frames: u32, src_rate: u32) {
        let zeros = vec![0i16; frames as usize].into_boxed_slice();
        self.play_pcm16(zeros, frames, src_rate, false);
    }

    /// Stops and frees the sample channel. Synchronous. If
    /// `call_callback`, returns the installed callback (if a sample was
    /// actually playing) so the caller can invoke it after releasing any
    /// lock it holds.
    pub fn stop_sample(&mut self, call_callback: bool) -> Option<SoundFinishedCallback> {
        let was_playing = self.sample.is_some();
        self.sample = None;
        if call_callback && was_playing {
            self.sound_finished_cb.clone()
        } else {
            None
        }
    }

    /// Produces `out.len()` host-rate mono samples. `opl2_gen` is invoked
    /// with a fixed-size scratch buffer whenever more native-rate OPL2
    /// samples are needed; the caller is expected to hold the OPL2
    /// register mutex only for the duration of that call. Returns a
    /// completion callback to invoke (outside any lock) if the sample
    /// channel finished during this call.
    pub fn generate(
        &mut self,
        out: &mut [i16],
        mut opl2_gen: impl FnMut(&mut [i16]),
    ) -> Option<SoundFinishedCallback> {
        let mut finished_cb = None;

        for slot in out.iter_mut() {
            let mut mix: i32 = 0;

            if self.opl2_enabled {
                let opl2_sample = self.next_opl2_sample(&mut opl2_gen);
                mix += (opl2_sample as i32 * VOL_OPL2) >> 8;
            }

            if let Some(sample) = self.sample.as_mut() {
                let (s, done) = sample.next();
                mix += (s as i32 * VOL_SFX) >> 8;
                if done {
                    self.sample = None;
                    if finished_cb.is_none() {
                        finished_cb = self.sound_finished_cb.clone();
                    }
                }
            }

            mix += (self.pcspeaker.next() as i32 * VOL_PC) >> 8;

            *slot = mix.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }

        finished_cb
    }

    fn next_opl2_sample(&mut self, opl2_gen: &mut impl FnMut(&mut [i16])) -> i16 {
        let idx = self.opl2_cursor_fp >> 16;
        self.ensure_opl2_available(idx + 1, opl2_gen);

        let frac = (self.opl2_cursor_fp & 0xFFFF) as i64;
        let s0 = self.ring.get(idx).unwrap_or(0) as i64;
        let s1 = self.ring.get(idx + 1).map(|v| v as i64).unwrap_or(s0);
        let sample = ((s0 * (65536 - frac) + s1 * frac) >> 16) as i16;

        self.opl2_cursor_fp += self.opl2_step_fp as u64;
        sample
    }

    /// Generates native-rate OPL2 samples into the ring until it covers
    /// `need_abs`, or gives up if the ring is full even after pruning
    /// behind the cursor. Giving up leaves the generated horizon short of
    /// `need_abs`; the caller reads past it and gets silence rather than
    /// blocking or erroring — matching the mixer's no-panics, audio
    /// thread never surfaces errors, policy.
    fn ensure_opl2_available(&mut self, need_abs: u64, opl2_gen: &mut impl FnMut(&mut [i16])) {
        let keep_from = (self.opl2_cursor_fp >> 16).saturating_sub(2);
        self.ring.prune_before(keep_from);

        let mut scratch = [0i16; OPL2_SCRATCH];
        while self.ring.generated_horizon() <= need_abs {
            let free = self.ring.free_slots();
            if free == 0 {
                return;
            }
            let n = free.min(OPL2_SCRATCH);
            opl2_gen(&mut scratch[..n]);
            self.ring.push_generated(&scratch[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RING_CAPACITY;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn silent_opl2(_: &mut [i16]) {}

    #[test]
    fn silence_through_mixer() {
        let mut mixer = Mixer::new(44100);
        mixer.set_opl2_enabled(false);
        mixer.set_pc_divisor(0);

        let mut out = [1i16; 1024]; // non-zero sentinel
        mixer.generate(&mut out, silent_opl2);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn sample_preemption_frees_first_buffer_without_callback() {
        let mut mixer = Mixer::new(44100);
        mixer.set_opl2_enabled(false);
        mixer.set_pc_divisor(0);

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        mixer.set_sound_finished_callback(Some(Arc::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })));

        let buf_a: Box<[i16]> = vec![0x7FFF; 10].into_boxed_slice();
        let buf_b: Box<[i16]> = vec![0; 10].into_boxed_slice();

        mixer.play_pcm16(buf_a, 10, 44100, false);
        mixer.play_pcm16(buf_b, 10, 44100, false);

        let mut out = [0i16; 20];
        mixer.generate(&mut out, silent_opl2);

        assert!(out.iter().all(|&s| s != i16::MAX));
        // Buffer B (all zero) finishes exactly once within 20 host samples
        // at matching rates: expect exactly one completion callback.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completion_callback_fires_exactly_once_and_playing_flag_brackets_it() {
        let mut mixer = Mixer::new(44100);
        mixer.set_opl2_enabled(false);
        mixer.set_pc_divisor(0);

        let buf: Box<[i16]> = vec![100; 5].into_boxed_slice();
        mixer.play_pcm16(buf, 5, 44100, false);
        assert!(mixer.is_sample_playing());

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        mixer.set_sound_finished_callback(Some(Arc::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })));

        let mut out = [0i16; 4];
        let cb = mixer.generate(&mut out, silent_opl2);
        assert!(cb.is_none());
        assert!(mixer.is_sample_playing());

        let mut out2 = [0i16; 1];
        let cb2 = mixer.generate(&mut out2, silent_opl2);
        assert!(cb2.is_some());
        cb2.unwrap()();
        assert!(!mixer.is_sample_playing());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_voc_playing_reflects_current_sample_immediately_after_preemption() {
        let mut mixer = Mixer::new(44100);
        mixer.play_pcm16(vec![0; 10].into_boxed_slice(), 10, 44100, true);
        assert!(mixer.is_voc_playing());
        mixer.play_pcm16(vec![0; 10].into_boxed_slice(), 10, 44100, false);
        assert!(!mixer.is_voc_playing());
    }

    #[test]
    fn exact_rate_step_fp_is_65536() {
        let mut mixer = Mixer::new(44100);
        mixer.play_pcm16(vec![1, 2, 3].into_boxed_slice(), 3, 44100, false);
        let step = mixer.sample.as_ref().unwrap().step_fp;
        assert_eq!(step, 65536);
    }

    #[test]
    fn sample_rate_conversion_frame_count_matches_ratio() {
        let host_rate = 44100u32;
        let src_rate = 11025u32;
        let frames = 100u32;

        let mut mixer = Mixer::new(host_rate);
        mixer.set_opl2_enabled(false);
        mixer.set_pc_divisor(0);
        mixer.play_pcm16(vec![5; frames as usize].into_boxed_slice(), frames, src_rate, false);

        let mut produced = 0u32;
        let mut out = [0i16; 16];
        while mixer.is_sample_playing() && produced < 2_000 {
            mixer.generate(&mut out, silent_opl2);
            produced += out.len() as u32;
        }

        let expected = (frames as u64 * host_rate as u64 / src_rate as u64) as u32;
        let diff = (produced as i64 - expected as i64).unsigned_abs();
        assert!(diff <= out.len() as u64, "produced={produced} expected={expected}");
    }

    #[test]
    fn ring_exhaustion_falls_back_to_silence_without_panicking() {
        let mut mixer = Mixer::new(44100);
        mixer.set_pc_divisor(0);

        // Force a single look-ahead request far beyond what RING_CAPACITY
        // can buffer in one go, with nothing yet generated to prune away.
        // `ensure_opl2_available` fills the ring up to capacity, can't
        // reach the requested index, and gives up rather than looping
        // forever or panicking.
        mixer.opl2_cursor_fp = ((RING_CAPACITY as u64) + 1000) << 16;

        let mut out = [7i16; 1];
        mixer.generate(&mut out, silent_opl2);
        assert_eq!(out[0], 0);
        assert_eq!(mixer.ring.len(), RING_CAPACITY);
    }
}
