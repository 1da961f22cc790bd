//! Native microphone capture via cpal.
//!
//! The cpal callback down-mixes to mono and pushes samples into a lock-free
//! ring buffer. On the render thread, `read_frequency_data` drains the ring
//! into a sliding window, runs a Hann-windowed FFT and converts magnitudes to
//! analyser-style bytes (-100 dB..-30 dB mapped onto 0..=255) with temporal
//! smoothing. All buffers are allocated in `open`.

use std::f32::consts::PI;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::audio::{CaptureDevice, FREQUENCY_BIN_COUNT};
use crate::error::EngineError;

/// FFT size; yields `FREQUENCY_BIN_COUNT` usable bins.
const FFT_SIZE: usize = FREQUENCY_BIN_COUNT * 2;

/// About a quarter second of 48 kHz mono audio.
const RING_CAPACITY: usize = 12_288;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING: f32 = 0.8;

/// Spectrum state owned by the render thread.
struct Analyser {
    consumer: HeapCons<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    drain: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    fn new(consumer: HeapCons<f32>) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch_len = fft.get_inplace_scratch_len();

        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();

        Self {
            consumer,
            fft,
            window,
            history: vec![0.0; FFT_SIZE],
            drain: vec![0.0; FFT_SIZE],
            fft_buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
        }
    }

    /// Pull everything the callback produced, keeping the newest `FFT_SIZE`
    /// samples in `history`.
    fn pull_samples(&mut self) {
        loop {
            let read = self.consumer.pop_slice(&mut self.drain);
            if read == 0 {
                break;
            }
            self.history.copy_within(read.., 0);
            let keep = FFT_SIZE - read;
            self.history[keep..].copy_from_slice(&self.drain[..read]);
        }
    }

    fn analyse(&mut self, bins: &mut [u8]) {
        self.pull_samples();

        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            *slot = Complex::new(self.history[i] * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        let scale = 1.0 / FFT_SIZE as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (i, bin) in bins.iter_mut().enumerate() {
            let Some(smoothed) = self.smoothed.get_mut(i) else {
                *bin = 0;
                continue;
            };
            let magnitude = self.fft_buffer[i].norm() * scale;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
            let db = 20.0 * smoothed.max(1e-12).log10();
            let normalized = ((db - MIN_DECIBELS) / range).clamp(0.0, 1.0);
            *bin = (normalized * 255.0) as u8;
        }
    }
}

/// Default input device captured through cpal.
pub struct CpalMicrophone {
    device_name: Option<String>,
    stream: Option<Stream>,
    analyser: Option<Analyser>,
}

impl CpalMicrophone {
    /// `device_name` of `None` uses the system default input.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: None,
            analyser: None,
        }
    }

    /// List available input device names.
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        if let Ok(devices) = host.input_devices() {
            for dev in devices {
                if let Ok(name) = dev.name() {
                    names.push(name);
                }
            }
        }
        names
    }

    fn resolve_device(&self) -> Result<cpal::Device, EngineError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| classify_error(format!("failed to enumerate input devices: {e}")))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| EngineError::DeviceUnavailable(format!("input device not found: {name}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| EngineError::DeviceUnavailable("no default input device".to_string())),
        }
    }
}

/// Backends report refused microphone access through their error text.
fn classify_error(message: String) -> EngineError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        EngineError::PermissionDenied(message)
    } else {
        EngineError::DeviceUnavailable(message)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: HeapProd<f32>,
    to_f32: fn(T) -> f32,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + 'static,
{
    let channels = config.channels.max(1) as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _info: &cpal::InputCallbackInfo| {
            for frame in data.chunks_exact(channels) {
                let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
                // A full ring drops the newest samples until the reader catches up.
                let _ = producer.try_push(sum / channels as f32);
            }
        },
        |err| log::error!("Audio input stream error: {}", err),
        None,
    )
}

impl CaptureDevice for CpalMicrophone {
    fn open(&mut self) -> Result<(), EngineError> {
        let device = self.resolve_device()?;
        let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

        let default_config = device
            .default_input_config()
            .map_err(|e| classify_error(format!("failed to get default input config: {e}")))?;
        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.into();

        log::info!(
            "Selected input device '{}' ({} Hz, {} channels, {:?})",
            dev_name,
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, |s| s),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, |s| s as f32 / i16::MAX as f32),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, producer, |s| (s as f32 - 32768.0) / 32768.0),
            other => {
                return Err(EngineError::DeviceUnavailable(format!("unsupported sample format {other:?}")));
            }
        }
        .map_err(|e| classify_error(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| classify_error(format!("failed to start input stream: {e}")))?;

        self.stream = Some(stream);
        self.analyser = Some(Analyser::new(consumer));
        Ok(())
    }

    fn read_frequency_data(&mut self, bins: &mut [u8]) {
        match self.analyser.as_mut() {
            Some(analyser) => analyser.analyse(bins),
            None => bins.fill(0),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause input stream: {}", e);
            }
        }
        self.analyser = None;
    }

    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("default microphone")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser_with(samples: &[f32]) -> Analyser {
        let (mut producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        producer.push_slice(samples);
        Analyser::new(consumer)
    }

    #[test]
    fn test_silence_maps_to_zero_bins() {
        let mut analyser = analyser_with(&[0.0; FFT_SIZE]);
        let mut bins = [255u8; FREQUENCY_BIN_COUNT];
        analyser.analyse(&mut bins);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_raises_its_bin() {
        let bin = 16;
        let tone: Vec<f32> = (0..FFT_SIZE * 4)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / FFT_SIZE as f32).sin())
            .collect();
        let mut analyser = analyser_with(&tone);
        let mut bins = [0u8; FREQUENCY_BIN_COUNT];
        for _ in 0..20 {
            analyser.analyse(&mut bins);
        }
        assert!(bins[bin] > 200, "tone bin only reached {}", bins[bin]);
        assert!(bins[bin] > bins[FREQUENCY_BIN_COUNT - 1]);
    }

    #[test]
    fn test_history_keeps_newest_samples() {
        let samples: Vec<f32> = (0..FFT_SIZE + 10).map(|i| i as f32).collect();
        let mut analyser = analyser_with(&samples);
        analyser.pull_samples();
        assert_eq!(analyser.history[FFT_SIZE - 1], (FFT_SIZE + 9) as f32);
        assert_eq!(analyser.history[0], 10.0);
    }

    #[test]
    fn test_permission_errors_are_classified() {
        assert!(matches!(
            classify_error("Permission denied by system".into()),
            EngineError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_error("device disconnected".into()),
            EngineError::DeviceUnavailable(_)
        ));
    }
}
