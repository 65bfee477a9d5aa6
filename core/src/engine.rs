//! `AudioEngine`: the single process-lifetime owner of the audio
//! subsystem's state. Owns the OPL2 register state behind its own mutex
//! and the mixer (sample channel, OPL2 ring, PC-speaker) behind a
//! second, so the audio thread's `generate` never blocks behind a
//! music-tick register write for longer than the brief OPL2 pull it
//! performs internally.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::mixer::{Mixer, SoundFinishedCallback};
use crate::opl2::Opl2;
use crate::voc::{self, DecodedVoc};

/// Process-lifetime audio engine: the single public entry point.
///
/// Dropping the engine calls `shutdown()` (also callable explicitly),
/// guaranteeing cleanup even if the caller forgets it.
pub struct AudioEngine {
    opl2: Mutex<Opl2>,
    mixer: Mutex<Mixer>,
}

impl AudioEngine {
    /// Creates engine state for a given host device rate. Exactly-once
    /// semantics are structural here: each `AudioEngine` is a fresh
    /// process-lifetime instance: there is no global to double-init.
    pub fn new(host_rate: u32) -> Self {
        Self {
            opl2: Mutex::new(Opl2::new()),
            mixer: Mutex::new(Mixer::new(host_rate)),
        }
    }

    /// Releases all owned buffers and clears state. Called automatically
    /// on `Drop`; exposed directly so callers can shut down deterministically
    /// without waiting for scope exit.
    pub fn shutdown(&self) {
        let mut mixer = self.mixer.lock().unwrap();
        mixer.set_sound_finished_callback(None);
        let _ = mixer.stop_sample(false);
        mixer.set_opl2_enabled(false);
        mixer.set_pc_divisor(0);
    }

    pub fn opl2_write(&self, reg: u8, val: u8) {
        self.opl2.lock().unwrap().write(reg, val);
    }

    pub fn opl2_reset(&self) {
        self.opl2.lock().unwrap().reset();
    }

    pub fn set_opl2_enabled(&self, enabled: bool) {
        self.mixer.lock().unwrap().set_opl2_enabled(enabled);
    }

    pub fn set_pc_divisor(&self, divisor: u16) {
        self.mixer.lock().unwrap().set_pc_divisor(divisor);
    }

    pub fn set_sound_finished_callback(&self, cb: Option<SoundFinishedCallback>) {
        self.mixer.lock().unwrap().set_sound_finished_callback(cb);
    }

    pub fn play_pcm16(&self, pcm: Box<[i16]>, frames: u32, src_rate: u32, is_voc: bool) {
        self.mixer.lock().unwrap().play_pcm16(pcm, frames, src_rate, is_voc);
    }

    pub fn play_silence(&self, frames: u32, src_rate: u32) {
        self.mixer.lock().unwrap().play_silence(frames, src_rate);
    }

    pub fn stop_sample(&self, call_callback: bool) {
        let cb = self.mixer.lock().unwrap().stop_sample(call_callback);
        if let Some(cb) = cb {
            cb();
        }
    }

    pub fn is_sample_playing(&self) -> bool {
        self.mixer.lock().unwrap().is_sample_playing()
    }

    pub fn is_voc_playing(&self) -> bool {
        self.mixer.lock().unwrap().is_voc_playing()
    }

    /// Decodes a VOC buffer and starts it playing, preempting whatever
    /// sample (if any) is currently active. Decode failures are logged
    /// and result in silence for this sound; the engine itself never
    /// surfaces the error to the audio thread.
    pub fn play_voc(&self, data: &[u8]) {
        match voc::decode(data) {
            Ok(DecodedVoc { pcm, rate }) => {
                let frames = pcm.len() as u32;
                self.play_pcm16(pcm, frames, rate, true);
            }
            Err(err) => {
                warn!(error = %err, "VOC decode failed; sound dropped");
            }
        }
    }

    /// Produces `out.len()` host-rate mono samples. This is the real-time
    /// entry point: it locks the OPL2 mutex only for the brief native-rate
    /// pull the mixer performs on demand, never while computing the mix
    /// or while a completion callback runs.
    pub fn generate(&self, out: &mut [i16]) {
        let opl2 = &self.opl2;
        let cb = self
            .mixer
            .lock()
            .unwrap()
            .generate(out, |scratch| {
                opl2.lock().unwrap().generate(scratch);
            });
        if let Some(cb) = cb {
            cb();
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decodes a Creative Voice File. Exposed at the crate root as a free
/// function (`voc_decode(bytes)`); it has no dependency on engine state.
pub fn voc_decode(data: &[u8]) -> crate::error::AudioResult<DecodedVoc> {
    voc::decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn new_engine_generates_silence_with_opl2_disabled() {
        let engine = AudioEngine::new(44100);
        engine.set_opl2_enabled(false);
        engine.set_pc_divisor(0);

        let mut out = [1i16; 512];
        engine.generate(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn opl2_write_is_visible_to_generate() {
        let engine = AudioEngine::new(44100);
        engine.set_pc_divisor(0);
        engine.opl2_write(0x20, 0x01);
        engine.opl2_write(0x40, 0x00);
        engine.opl2_write(0x60, 0xF2);
        engine.opl2_write(0x80, 0x44);
        engine.opl2_write(0x23, 0x01);
        engine.opl2_write(0x43, 0x00);
        engine.opl2_write(0x63, 0xF2);
        engine.opl2_write(0x83, 0x44);
        engine.opl2_write(0xA0, 0xAE);
        engine.opl2_write(0xB0, 0x32);

        let mut out = [0i16; 4096];
        engine.generate(&mut out);
        assert!(out.iter().any(|&s| s != 0));
    }

    #[test]
    fn play_voc_failure_leaves_engine_silent_and_playing_false() {
        let engine = AudioEngine::new(44100);
        engine.set_opl2_enabled(false);
        engine.set_pc_divisor(0);
        engine.play_voc(&[0x00]); // terminator only: decode fails
        assert!(!engine.is_sample_playing());
    }

    #[test]
    fn shutdown_clears_pending_sample_without_callback() {
        let engine = AudioEngine::new(44100);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        engine.set_sound_finished_callback(Some(Arc::new(move || {
            fired_clone.store(true, Ordering::SeqCst);
        })));
        engine.play_pcm16(vec![1; 10].into_boxed_slice(), 10, 44100, false);
        engine.shutdown();
        assert!(!engine.is_sample_playing());
        assert!(!fired.load(Ordering::SeqCst));
    }
}
