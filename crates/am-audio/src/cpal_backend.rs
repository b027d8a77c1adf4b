//! CPAL-based audio output backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use am_engine::Frame;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output.
///
/// Frames travel from the producer side (the render thread) to the device
/// callback through a lock-free ring of about 100 ms. Device frames that
/// find the ring empty are played as silence and counted as underruns.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    running: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
}

impl CpalOutput {
    /// Open the default device with `channels` interleaved channels.
    pub fn new(channels: u16) -> Result<(Self, HeapCons<Frame>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        config.channels = channels.max(1);

        let buffer_size = config.sample_rate.0 as usize / 10;
        let rb = HeapRb::<Frame>::new(buffer_size.max(64));
        let (producer, consumer) = rb.split();

        tracing::info!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio device opened"
        );

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            running: Arc::new(AtomicBool::new(false)),
            underruns: Arc::new(AtomicU64::new(0)),
        };
        Ok((output, consumer))
    }

    /// Build and start the device stream, draining `consumer`.
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let running = self.running.clone();
        let underruns = self.underruns.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(channels) {
                        match consumer.try_pop() {
                            Some(frame) => {
                                let active = frame.channels as usize;
                                for (i, sample) in chunk.iter_mut().enumerate() {
                                    *sample = if i < active {
                                        frame.samples[i] as f32 / 32768.0
                                    } else {
                                        0.0
                                    };
                                }
                            }
                            None => {
                                underruns.fetch_add(1, Ordering::Relaxed);
                                chunk.fill(0.0);
                            }
                        }
                    }
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Queue every frame of `frames`, spinning while the ring is full.
    pub fn write_spin(&mut self, mut frames: &[Frame]) {
        while !frames.is_empty() {
            let pushed = self.producer.push_slice(frames);
            frames = &frames[pushed..];
            if pushed == 0 {
                std::hint::spin_loop();
            }
        }
    }

    /// Device frames played as silence because the ring was empty.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        self.producer.push_slice(frames)
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
