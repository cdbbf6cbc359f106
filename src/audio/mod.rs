//! Audio capture module for Concierge Voice
//!
//! Microphone acquisition, chunk accumulation, artifact assembly, and the
//! live waveform probe. Uses CPAL for capture and hound for WAV framing.

pub mod artifact;
pub mod chunks;
pub mod gate;
pub mod probe;
pub mod recorder;
pub mod waveform;

pub use artifact::{ArtifactError, AudioArtifact, MediaFormat};
pub use chunks::{ChunkBuffer, ChunkSink};
pub use gate::{
    CaptureRequest, DeviceError, DeviceGate, InputTrack, LossCallback, MediaStreamHandle,
};
pub use probe::{AnalysisContext, FrequencyProbe, StreamTap, WaveformFrame, FFT_SIZE, FRAME_LEN};
pub use recorder::{CpalDeviceGate, InputDeviceInfo};
pub use waveform::{
    trace_points, DrawingSurface, RenderStats, Repaint, StrokeStyle, SurfaceError, TextSurface,
    WaveformRenderer,
};
