//! Host audio device glue: opens a cpal output stream and drives
//! [`dos_audio_core::engine::AudioEngine::generate`] from its callback.
//!
//! Grounded in cpal device-open/stream-build conventions; unlike a
//! stereo float pipeline, the engine already produces mono i16 at a
//! caller-chosen rate, so the callback here only has to pick a supported
//! config and forward the buffer, not mix or convert formats.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use dos_audio_core::engine::AudioEngine;
use tracing::{debug, info, warn};

pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioOutput {
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .context("failed to enumerate output devices")?
            .filter_map(|d| d.name().ok())
            .collect();
        Ok(devices)
    }

    /// Opens the named device (or the default one), preferring 44.1kHz
    /// mono i16 and falling back to the device's own default config.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host.output_devices().context("failed to enumerate output devices")?;
            devices
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or_else(|| anyhow!("output device '{name}' not found"))?
        } else {
            host.default_output_device()
                .ok_or_else(|| anyhow!("no default output device"))?
        };

        info!(device = %device.name().unwrap_or_default(), "opening audio device");

        let config = Self::best_config(&device)?;
        debug!(rate = config.sample_rate.0, channels = config.channels, "selected stream config");

        Ok(Self { device, config, stream: None })
    }

    fn best_config(device: &Device) -> Result<StreamConfig> {
        let mut configs = device
            .supported_output_configs()
            .context("failed to query supported output configs")?;

        if let Some(found) = configs.find(|c| {
            c.channels() == 1
                && c.min_sample_rate().0 <= 44100
                && c.max_sample_rate().0 >= 44100
                && c.sample_format() == cpal::SampleFormat::I16
        }) {
            return Ok(found.with_sample_rate(cpal::SampleRate(44100)).config());
        }

        // No native mono i16 config: fall back to the device default and
        // let `start` adapt per-frame.
        let default = device.default_output_config().context("failed to get default output config")?;
        Ok(default.config())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Starts the stream, pulling mono i16 samples from `engine` on every
    /// callback invocation and replicating across channels if the device
    /// is not mono. Runs for the lifetime of the returned `AudioOutput`.
    pub fn start(&mut self, engine: Arc<AudioEngine>) -> Result<()> {
        let channels = self.config.channels as usize;
        let mut scratch = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    scratch.resize(frames, 0i16);
                    engine.generate(&mut scratch);
                    for (frame, &sample) in data.chunks_mut(channels).zip(scratch.iter()) {
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                    }
                },
                |err| warn!(%err, "audio stream error"),
                None,
            )
            .context("failed to build output stream")?;

        stream.play().context("failed to start output stream")?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
