//! CPAL-based audio device backends.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bl_core::AudioBuffer;
use bl_engine::{Engine, RecordProducer};

use crate::traits::{AudioBackend, AudioError};

/// CPAL output backend. Owns the device stream; the engine itself
/// lives inside the stream callback once `build_stream` runs.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Create an output backend on the default device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // Force stereo output — the stream callback assumes 2-channel interleaving
        config.channels = 2;

        Ok(Self {
            device,
            config,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build and start the stream, moving the engine into the
    /// callback. Per block the callback deinterleaves into a reused
    /// planar buffer, renders, and interleaves back out.
    pub fn build_stream(&mut self, mut engine: Engine) -> Result<(), AudioError> {
        let running = self.running.clone();
        let channels = self.config.channels as usize;
        let sample_rate = self.config.sample_rate.0 as f64;
        let mut scratch = AudioBuffer::<f32>::new(0, 2);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = 0.0;
                        }
                        return;
                    }

                    let frames = data.len() / channels;
                    // Resize only on device renegotiation
                    if scratch.frames() != frames {
                        scratch.resize(frames, true);
                    }
                    engine.process(&mut scratch, sample_rate);

                    for (i, chunk) in data.chunks_mut(channels).enumerate() {
                        for (ch, sample) in chunk.iter_mut().enumerate() {
                            *sample = match ch {
                                0 => scratch.channel(0)[i],
                                1 => scratch.channel(1)[i],
                                _ => 0.0,
                            };
                        }
                    }
                },
                |err| eprintln!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }
}

impl AudioBackend for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

/// CPAL input backend. The callback pushes interleaved capture data
/// straight into a record queue producer.
pub struct CpalInput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalInput {
    /// Create an input backend on the default device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        Ok(Self {
            device,
            config: config.into(),
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Number of input channels.
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Build and start the capture stream, moving the producer into
    /// the callback. While the running flag is clear the callback
    /// discards input instead of filling the ring.
    pub fn build_stream(&mut self, mut producer: RecordProducer) -> Result<(), AudioError> {
        let running = self.running.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    producer.write(data);
                },
                |err| eprintln!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }
}

impl AudioBackend for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
