//! Microphone capture using CPAL
//!
//! `CpalDeviceGate` opens the default input device on a dedicated capture
//! thread (CPAL streams are not `Send` on every platform). Each data callback
//! becomes one PCM16 chunk in the session's sink and is also fed, downmixed
//! to mono, into the stream's visualization tap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, Stream, StreamConfig};
use tokio::sync::oneshot;

use super::artifact::MediaFormat;
use super::chunks::ChunkSink;
use super::gate::{
    CaptureRequest, DeviceError, DeviceGate, InputTrack, LossCallback, MediaStreamHandle,
};
use super::probe::StreamTap;

/// Description of the default input device, for status display.
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
}

/// Device gate backed by the host's default input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceGate;

impl CpalDeviceGate {
    pub fn new() -> Self {
        Self
    }

    /// Look up the default input device without opening a stream.
    pub fn default_device_info() -> Result<InputDeviceInfo, DeviceError> {
        let (device, config) = default_input()?;
        Ok(InputDeviceInfo {
            name: device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            sample_format: format!("{:?}", config.sample_format()),
        })
    }
}

#[async_trait]
impl DeviceGate for CpalDeviceGate {
    async fn acquire(&self, request: CaptureRequest) -> Result<MediaStreamHandle, DeviceError> {
        let CaptureRequest { id, sink, on_lost } = request;
        let tap = StreamTap::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_sink = sink.clone();
        let thread_tap = tap.clone();
        let worker = std::thread::Builder::new()
            .name(format!("capture-{}", id))
            .spawn(move || run_capture_thread(thread_sink, thread_tap, on_lost, ready_tx, stop_rx))
            .map_err(|e| DeviceError::StreamFailed(e.to_string()))?;

        let format = match ready_rx.await {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                // The thread is already on its way out; reap it off the runtime.
                let _ = tokio::task::spawn_blocking(move || worker.join()).await;
                return Err(e);
            }
            Err(_) => {
                return Err(DeviceError::StreamFailed(
                    "capture thread exited before the stream started".to_string(),
                ))
            }
        };

        log::info!("Recording started: {} ({})", id, format);

        let track = CpalTrack {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        };
        Ok(MediaStreamHandle::new(id, format, tap, sink, Box::new(track)))
    }
}

/// Owns the capture thread; stopping it drops the CPAL stream.
struct CpalTrack {
    stop_tx: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl InputTrack for CpalTrack {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }
}

fn run_capture_thread(
    sink: ChunkSink,
    tap: Arc<StreamTap>,
    on_lost: LossCallback,
    ready_tx: oneshot::Sender<Result<MediaFormat, DeviceError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let capturing = Arc::new(AtomicBool::new(true));

    let stream = match open_input_stream(sink, tap, on_lost, capturing.clone()) {
        Ok((stream, format)) => {
            if ready_tx.send(Ok(format)).is_err() {
                log::warn!("Acquisition abandoned before the stream was handed over");
                return;
            }
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Park until released; a dropped sender counts as a release.
    let _ = stop_rx.recv();

    capturing.store(false, Ordering::SeqCst);
    if let Err(e) = stream.pause() {
        log::debug!("Failed to pause stream before drop: {}", e);
    }
    drop(stream);
    log::debug!("Capture thread exiting");
}

fn default_input() -> Result<(Device, cpal::SupportedStreamConfig), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(DeviceError::DeviceUnavailable)?;

    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::DeviceUnavailable,
        cpal::DefaultStreamConfigError::BackendSpecific { err } => classify_backend(&err.description),
        other => DeviceError::StreamFailed(other.to_string()),
    })?;

    Ok((device, supported))
}

fn open_input_stream(
    sink: ChunkSink,
    tap: Arc<StreamTap>,
    on_lost: LossCallback,
    capturing: Arc<AtomicBool>,
) -> Result<(Stream, MediaFormat), DeviceError> {
    let (device, supported) = default_input()?;

    log::info!("Using audio input device: {:?}", device.name());
    log::info!(
        "Audio config: {} Hz, {} channels, {:?}",
        supported.sample_rate().0,
        supported.channels(),
        supported.sample_format()
    );

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let format = MediaFormat::Pcm16 {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let reported = Arc::new(AtomicBool::new(false));
    let err_fn = move |err: cpal::StreamError| {
        let Some(lost) = classify_stream_error(&err) else {
            // Backend hiccups (xruns, poll errors) while the stream keeps running
            log::warn!("Audio stream error: {}", err);
            return;
        };
        log::error!("Audio stream lost: {}", err);
        if !reported.swap(true, Ordering::SeqCst) {
            on_lost(lost);
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, sink, tap, capturing, err_fn),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, sink, tap, capturing, err_fn),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sink, tap, capturing, err_fn),
        other => Err(DeviceError::StreamFailed(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => DeviceError::DeviceUnavailable,
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend(&err.description),
        #[allow(unreachable_patterns)]
        other => DeviceError::StreamFailed(other.to_string()),
    })?;

    Ok((stream, format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: ChunkSink,
    tap: Arc<StreamTap>,
    capturing: Arc<AtomicBool>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, DeviceError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }

                let floats: Vec<f32> = data
                    .iter()
                    .map(|&s| <f32 as cpal::Sample>::from_sample(s))
                    .collect();

                let mut bytes = Vec::with_capacity(floats.len() * 2);
                for &sample in &floats {
                    bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
                }
                sink.push(bytes);

                let mono: Vec<f32> = floats
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                    .collect();
                tap.feed(&mono);
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => DeviceError::DeviceUnavailable,
            cpal::BuildStreamError::BackendSpecific { err } => classify_backend(&err.description),
            other => DeviceError::StreamFailed(other.to_string()),
        })
}

/// Only a vanished device ends the session; other stream errors are transient.
fn classify_stream_error(err: &cpal::StreamError) -> Option<DeviceError> {
    match err {
        cpal::StreamError::DeviceNotAvailable => Some(DeviceError::DeviceDisconnected(
            "input device removed".to_string(),
        )),
        _ => None,
    }
}

/// Backends report permission problems only as free-form text.
fn classify_backend(description: &str) -> DeviceError {
    let lower = description.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        DeviceError::PermissionDenied
    } else {
        DeviceError::StreamFailed(description.to_string())
    }
}

/// Convert a float sample to i16 for PCM chunks.
fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(1.0), i16::MAX);
        assert_eq!(sample_to_i16(-1.0), -i16::MAX);

        assert_eq!(sample_to_i16(2.0), i16::MAX);
        assert_eq!(sample_to_i16(-2.0), -i16::MAX);
    }

    #[test]
    fn permission_text_maps_to_permission_denied() {
        assert_eq!(
            classify_backend("Microphone access Denied by user"),
            DeviceError::PermissionDenied
        );
        assert_eq!(
            classify_backend("app is not authorized to record"),
            DeviceError::PermissionDenied
        );
        assert_eq!(
            classify_backend("ALSA function failed"),
            DeviceError::StreamFailed("ALSA function failed".to_string())
        );
    }

    #[test]
    fn only_a_missing_device_ends_the_stream() {
        assert!(matches!(
            classify_stream_error(&cpal::StreamError::DeviceNotAvailable),
            Some(DeviceError::DeviceDisconnected(_))
        ));

        let xrun = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "`alsa::poll()` spuriously returned".to_string(),
            },
        };
        assert_eq!(classify_stream_error(&xrun), None);
    }
}
