//! Finished recordings
//!
//! An `AudioArtifact` is built once from the ordered chunks of a completed
//! session and never mutated afterwards.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use hound::{WavSpec, WavWriter};

use super::chunks::ChunkBuffer;

/// Media type negotiated with the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaFormat {
    /// Chunks are already container-encoded; the artifact is their concatenation.
    Encoded { mime_type: String },
    /// Chunks are interleaved little-endian PCM16, framed in a WAV container on assembly.
    Pcm16 { sample_rate: u32, channels: u16 },
}

impl MediaFormat {
    pub fn encoded(mime_type: impl Into<String>) -> Self {
        MediaFormat::Encoded {
            mime_type: mime_type.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            MediaFormat::Encoded { mime_type } => mime_type,
            MediaFormat::Pcm16 { .. } => "audio/wav",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Encoded { mime_type } => write!(f, "{}", mime_type),
            MediaFormat::Pcm16 {
                sample_rate,
                channels,
            } => write!(f, "audio/wav ({} Hz, {} ch, 16-bit)", sample_rate, channels),
        }
    }
}

/// Errors that can occur while assembling an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// PCM payload does not end on a whole frame
    UnalignedPcm { bytes: usize, frame_bytes: usize },
    /// WAV container could not be written
    Encoding(String),
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::UnalignedPcm { bytes, frame_bytes } => write!(
                f,
                "PCM payload of {} bytes is not a multiple of the {}-byte frame",
                bytes, frame_bytes
            ),
            ArtifactError::Encoding(e) => write!(f, "Failed to encode WAV: {}", e),
        }
    }
}

impl std::error::Error for ArtifactError {}

/// The terminal value of a completed recording session.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    data: Vec<u8>,
    mime_type: String,
    duration_secs: u64,
    recorded_at: DateTime<Utc>,
}

impl AudioArtifact {
    /// Join `chunks` in arrival order and tag the result with `format`'s media type.
    pub fn assemble(
        chunks: ChunkBuffer,
        format: &MediaFormat,
        duration_secs: u64,
    ) -> Result<Self, ArtifactError> {
        let data = match format {
            MediaFormat::Encoded { .. } => chunks.concat(),
            MediaFormat::Pcm16 {
                sample_rate,
                channels,
            } => encode_wav(&chunks.concat(), *sample_rate, *channels)?,
        };

        Ok(Self {
            data,
            mime_type: format.mime_type().to_string(),
            duration_secs,
            recorded_at: Utc::now(),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// File extension matching the media type, used for upload filenames.
    pub fn file_extension(&self) -> &'static str {
        let essence = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match essence {
            "audio/webm" => "webm",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            _ => "bin",
        }
    }

    /// Timestamped name for saving locally.
    /// Format: recording_YYYYMMDD_HHMMSS.<ext>
    pub fn default_file_name(&self) -> String {
        format!(
            "recording_{}.{}",
            self.recorded_at.format("%Y%m%d_%H%M%S"),
            self.file_extension()
        )
    }

    /// Write the payload to `path` exactly as it would be uploaded.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.data)?;
        log::info!("Saved {} bytes to {:?}", self.data.len(), path);
        Ok(())
    }
}

impl fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("duration_secs", &self.duration_secs)
            .field("recorded_at", &self.recorded_at)
            .finish()
    }
}

fn encode_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>, ArtifactError> {
    let frame_bytes = 2 * channels.max(1) as usize;
    if pcm.len() % frame_bytes != 0 {
        return Err(ArtifactError::UnalignedPcm {
            bytes: pcm.len(),
            frame_bytes,
        });
    }

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| ArtifactError::Encoding(e.to_string()))?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| ArtifactError::Encoding(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| ArtifactError::Encoding(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
