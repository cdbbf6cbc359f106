//! Microphone acquisition
//!
//! A `DeviceGate` turns a `CaptureRequest` into a live `MediaStreamHandle`.
//! The handle is the only owner of the hardware: releasing it stops every
//! track, and dropping an unreleased handle releases it too.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::artifact::MediaFormat;
use super::chunks::{ChunkBuffer, ChunkSink};
use super::probe::StreamTap;

/// Errors raised by the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// User or OS refused microphone access
    PermissionDenied,
    /// No input device exists
    DeviceUnavailable,
    /// Hardware went away while the stream was live
    DeviceDisconnected(String),
    /// The platform refused to open or start the stream
    StreamFailed(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::PermissionDenied => write!(f, "Microphone permission denied"),
            DeviceError::DeviceUnavailable => write!(f, "No audio input device found"),
            DeviceError::DeviceDisconnected(e) => write!(f, "Audio input device disconnected: {}", e),
            DeviceError::StreamFailed(e) => write!(f, "Failed to open audio stream: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Invoked from the capture side when the stream fails after it went live.
pub type LossCallback = Arc<dyn Fn(DeviceError) + Send + Sync + 'static>;

/// Everything a gate needs to start one capture.
#[derive(Clone)]
pub struct CaptureRequest {
    pub id: Uuid,
    pub sink: ChunkSink,
    pub on_lost: LossCallback,
}

impl fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("id", &self.id)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

/// Hardware side of a live stream.
pub trait InputTrack: Send {
    /// Stop the hardware. Called at most once per track; any samples still in
    /// flight must be flushed to the sink before this returns.
    fn stop(&mut self);
}

/// Opaque handle to a live microphone stream.
pub struct MediaStreamHandle {
    id: Uuid,
    format: MediaFormat,
    tap: Arc<StreamTap>,
    sink: ChunkSink,
    track: Option<Box<dyn InputTrack>>,
}

impl MediaStreamHandle {
    pub fn new(
        id: Uuid,
        format: MediaFormat,
        tap: Arc<StreamTap>,
        sink: ChunkSink,
        track: Box<dyn InputTrack>,
    ) -> Self {
        Self {
            id,
            format,
            tap,
            sink,
            track: Some(track),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    /// Fan-out point for visualization probes.
    pub fn tap(&self) -> &StreamTap {
        &self.tap
    }

    pub fn is_live(&self) -> bool {
        self.track.is_some()
    }

    /// Stop all hardware tracks. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        match self.track.take() {
            Some(mut track) => {
                track.stop();
                log::info!("Stream {} released", self.id);
                true
            }
            None => false,
        }
    }

    /// Release the hardware and take every chunk captured, in arrival order.
    pub fn finish(mut self) -> ChunkBuffer {
        self.release();
        self.sink.seal()
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        if self.release() {
            log::warn!("Stream {} was dropped while live", self.id);
        }
    }
}

impl fmt::Debug for MediaStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamHandle")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Source of live microphone streams.
#[async_trait]
pub trait DeviceGate: Send + Sync + 'static {
    /// Request microphone access. May wait on a platform permission prompt.
    async fn acquire(&self, request: CaptureRequest) -> Result<MediaStreamHandle, DeviceError>;
}
