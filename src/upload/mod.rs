//! Upload module for Concierge Voice
//!
//! Hands finished recordings to the conversational backend and returns its
//! reply. The session loop only depends on the `UploadCollaborator` trait.

mod backend;

use async_trait::async_trait;

use crate::audio::AudioArtifact;

pub use backend::{resolve_audio_reference, BackendClient, UploadError};

/// Backend reply to one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Where the spoken reply can be fetched
    pub audio_reference: String,
}

#[async_trait]
pub trait UploadCollaborator: Send + Sync + 'static {
    /// Deliver one artifact. Called once per completed session, and again
    /// only when the user explicitly retries.
    async fn upload(&self, artifact: &AudioArtifact) -> Result<Reply, UploadError>;
}
