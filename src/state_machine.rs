//! State machine for a recording session
//!
//! This module implements the core state machine using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute.

use std::fmt;

use uuid::Uuid;

use crate::audio::{AudioArtifact, ChunkBuffer, DeviceError, MediaFormat};

/// Log a reminder once a recording gets long.
const LONG_RECORDING_SECS: u64 = 30;

/// Error signal surfaced by a session, tagged with a stable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    PermissionDenied,
    DeviceUnavailable,
    DeviceDisconnected(String),
    /// Stream could not be opened for a reason other than permission
    Capture(String),
    /// Chunks could not be assembled into an artifact
    Encoding(String),
    /// `Start` arrived while a session was still active
    AlreadyActive,
    UploadFailed(String),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied => "permission_denied",
            SessionError::DeviceUnavailable => "device_unavailable",
            SessionError::DeviceDisconnected(_) => "device_disconnected",
            SessionError::Capture(_) => "capture",
            SessionError::Encoding(_) => "encoding",
            SessionError::AlreadyActive => "already_active",
            SessionError::UploadFailed(_) => "upload_failed",
        }
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::PermissionDenied => "Microphone access denied.".to_string(),
            SessionError::DeviceUnavailable => "No microphone found.".to_string(),
            SessionError::DeviceDisconnected(_) => {
                "Microphone disconnected. Recording discarded.".to_string()
            }
            SessionError::Capture(e) => format!("Could not start recording: {}", e),
            SessionError::Encoding(e) => format!("Could not save recording: {}", e),
            SessionError::AlreadyActive => "A recording is already in progress.".to_string(),
            SessionError::UploadFailed(_) => "Failed to connect to backend.".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied => write!(f, "Microphone permission denied"),
            SessionError::DeviceUnavailable => write!(f, "No audio input device found"),
            SessionError::DeviceDisconnected(e) => write!(f, "Device disconnected: {}", e),
            SessionError::Capture(e) => write!(f, "Capture error: {}", e),
            SessionError::Encoding(e) => write!(f, "Encoding error: {}", e),
            SessionError::AlreadyActive => write!(f, "A session is already active"),
            SessionError::UploadFailed(e) => write!(f, "Upload failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied => SessionError::PermissionDenied,
            DeviceError::DeviceUnavailable => SessionError::DeviceUnavailable,
            DeviceError::DeviceDisconnected(e) => SessionError::DeviceDisconnected(e),
            DeviceError::StreamFailed(e) => SessionError::Capture(e),
        }
    }
}

/// Summary of the artifact a completed session produced. The artifact
/// itself leaves the state machine with `Effect::DeliverArtifact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub bytes: usize,
    pub mime_type: String,
    pub duration_secs: u64,
}

impl From<&AudioArtifact> for ArtifactSummary {
    fn from(artifact: &AudioArtifact) -> Self {
        Self {
            bytes: artifact.len(),
            mime_type: artifact.mime_type().to_string(),
            duration_secs: artifact.duration_secs(),
        }
    }
}

/// Internal state of the recording session.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Acquiring {
        session_id: Uuid,
    },
    Recording {
        session_id: Uuid,
        format: MediaFormat,
        elapsed_secs: u64,
    },
    Stopping {
        session_id: Uuid,
        format: MediaFormat,
        duration_secs: u64,
    },
    Completed {
        session_id: Uuid,
        summary: ArtifactSummary,
    },
    Failed {
        session_id: Uuid,
        error: SessionError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Acquiring,
    Recording,
    Stopping,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Acquiring => "acquiring",
            Status::Recording => "recording",
            Status::Stopping => "stopping",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl State {
    pub fn status(&self) -> Status {
        match self {
            State::Idle => Status::Idle,
            State::Acquiring { .. } => Status::Acquiring,
            State::Recording { .. } => Status::Recording,
            State::Stopping { .. } => Status::Stopping,
            State::Completed { .. } => Status::Completed,
            State::Failed { .. } => Status::Failed,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Acquiring { session_id }
            | State::Recording { session_id, .. }
            | State::Stopping { session_id, .. }
            | State::Completed { session_id, .. }
            | State::Failed { session_id, .. } => Some(*session_id),
        }
    }

    /// A session holds (or is about to hold) the microphone.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            State::Acquiring { .. } | State::Recording { .. } | State::Stopping { .. }
        )
    }

    /// Display timer. Zero outside `Recording`.
    pub fn elapsed_secs(&self) -> u64 {
        match self {
            State::Recording { elapsed_secs, .. } => *elapsed_secs,
            _ => 0,
        }
    }
}

/// Events that can trigger state transitions.
/// These are sent from the shell, the device runner, and the upload task.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start recording
    Start,
    /// User asked to stop and keep the recording
    Stop,
    /// Abort without an artifact (user abort or shell teardown)
    Cancel,
    /// Application exit requested
    Exit,

    // Device events
    AcquireOk {
        id: Uuid,
        format: MediaFormat,
    },
    AcquireFail {
        id: Uuid,
        error: DeviceError,
    },
    /// Stream failed after it went live
    DeviceLost {
        id: Uuid,
        error: DeviceError,
    },
    /// Stream released; every chunk it produced, in arrival order
    CaptureFlushed {
        id: Uuid,
        chunks: ChunkBuffer,
    },

    // Timer events (id prevents stale ticks)
    RecordingTick {
        id: Uuid,
    },
    MaxDurationReached {
        id: Uuid,
    },

    // Conversation events, handled by the session loop
    UploadOk {
        id: Uuid,
        reply: crate::upload::Reply,
    },
    UploadFail {
        id: Uuid,
        error: crate::upload::UploadError,
    },
    RetryUpload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Keep captured chunks and report them with `CaptureFlushed`
    Flush,
    /// Drop captured chunks
    Discard,
}

/// Effects to be executed after a state transition.
/// The effect runner handles device and timer effects asynchronously;
/// the session loop handles the rest.
#[derive(Debug)]
pub enum Effect {
    AcquireDevice {
        id: Uuid,
    },
    ReleaseDevice {
        id: Uuid,
        mode: ReleaseMode,
    },
    /// Start sending RecordingTick events every second while recording
    StartRecordingTick {
        id: Uuid,
    },
    StopRecordingTick {
        id: Uuid,
    },
    StartVisualizer {
        id: Uuid,
    },
    StopVisualizer {
        id: Uuid,
    },
    /// Hand the finished artifact to the upload collaborator (exactly once)
    DeliverArtifact {
        id: Uuid,
        artifact: AudioArtifact,
    },
    /// Report a rejected request without changing state
    Reject {
        error: SessionError,
    },
    /// Signal to publish a fresh snapshot
    EmitUi,
}

fn teardown(id: Uuid, mode: ReleaseMode) -> Vec<Effect> {
    vec![
        Effect::StopRecordingTick { id },
        Effect::StopVisualizer { id },
        Effect::ReleaseDevice { id, mode },
        Effect::EmitUi,
    ]
}

fn begin_session() -> (State, Vec<Effect>) {
    let id = Uuid::new_v4();
    log::info!("Session {} acquiring microphone", id);
    (
        State::Acquiring { session_id: id },
        vec![Effect::AcquireDevice { id }, Effect::EmitUi],
    )
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale session IDs
/// - Always emit EmitUi after state changes
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id = state.session_id();

    // Helper: check if event's ID is stale (doesn't match current session)
    let is_stale = |eid: Uuid| current_id != Some(eid);

    match (state, event) {
        // -----------------
        // Start
        // -----------------
        (Idle | Completed { .. } | Failed { .. }, Start) => begin_session(),
        (Acquiring { .. } | Recording { .. } | Stopping { .. }, Start) => {
            log::warn!("Start rejected: session {:?} still active", current_id);
            (
                state.clone(),
                vec![Reject {
                    error: SessionError::AlreadyActive,
                }],
            )
        }

        // -----------------
        // Acquiring
        // -----------------
        (Acquiring { session_id }, AcquireOk { id, format }) if *session_id == id => {
            log::info!("Session {} recording ({})", id, format);
            (
                Recording {
                    session_id: id,
                    format,
                    elapsed_secs: 0,
                },
                vec![StartRecordingTick { id }, StartVisualizer { id }, EmitUi],
            )
        }
        // Nothing was acquired, so nothing is released.
        (Acquiring { session_id }, AcquireFail { id, error }) if *session_id == id => {
            log::error!("Session {} failed to acquire microphone: {}", id, error);
            (
                Failed {
                    session_id: id,
                    error: error.into(),
                },
                vec![EmitUi],
            )
        }
        // Acquisition may still resolve; the runner releases the stream when it does.
        (Acquiring { session_id }, Stop | Cancel) => {
            log::info!("Session {} abandoned during acquisition", session_id);
            (
                Idle,
                vec![
                    ReleaseDevice {
                        id: *session_id,
                        mode: ReleaseMode::Discard,
                    },
                    EmitUi,
                ],
            )
        }

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                session_id,
                format,
                elapsed_secs,
            },
            Stop,
        ) => {
            log::info!("Session {} stopping after {}s", session_id, elapsed_secs);
            (
                Stopping {
                    session_id: *session_id,
                    format: format.clone(),
                    duration_secs: *elapsed_secs,
                },
                teardown(*session_id, ReleaseMode::Flush),
            )
        }
        (
            Recording {
                session_id,
                format,
                elapsed_secs,
            },
            MaxDurationReached { id },
        ) if *session_id == id => {
            log::warn!(
                "Session {} auto-stopped after {}s (max duration reached)",
                id,
                elapsed_secs
            );
            (
                Stopping {
                    session_id: id,
                    format: format.clone(),
                    duration_secs: *elapsed_secs,
                },
                teardown(id, ReleaseMode::Flush),
            )
        }
        (
            Recording {
                session_id,
                format,
                elapsed_secs,
            },
            RecordingTick { id },
        ) if *session_id == id => {
            let elapsed_secs = elapsed_secs + 1;
            if elapsed_secs == LONG_RECORDING_SECS {
                log::info!(
                    "Session {} at {} seconds (consider stopping soon)",
                    id,
                    elapsed_secs
                );
            }
            (
                Recording {
                    session_id: id,
                    format: format.clone(),
                    elapsed_secs,
                },
                vec![EmitUi],
            )
        }
        // Cancel during recording aborts without an artifact
        (Recording { session_id, .. }, Cancel) => {
            log::info!("Session {} cancelled", session_id);
            (Idle, teardown(*session_id, ReleaseMode::Discard))
        }

        // -----------------
        // Device loss (any active state)
        // -----------------
        (
            Acquiring { session_id } | Recording { session_id, .. } | Stopping { session_id, .. },
            DeviceLost { id, error },
        ) if *session_id == id => {
            log::error!("Session {} lost its device: {}", id, error);
            let error = match error {
                DeviceError::DeviceDisconnected(e) => SessionError::DeviceDisconnected(e),
                other => SessionError::DeviceDisconnected(other.to_string()),
            };
            (
                Failed {
                    session_id: id,
                    error,
                },
                teardown(id, ReleaseMode::Discard),
            )
        }

        // -----------------
        // Stopping
        // -----------------
        (
            Stopping {
                session_id,
                format,
                duration_secs,
            },
            CaptureFlushed { id, chunks },
        ) if *session_id == id => {
            let chunk_count = chunks.len();
            match AudioArtifact::assemble(chunks, format, *duration_secs) {
                Ok(artifact) => {
                    if artifact.is_empty() {
                        log::warn!("Session {} completed without any audio data", id);
                    }
                    log::info!(
                        "Session {} completed: {} bytes from {} chunks, {}s",
                        id,
                        artifact.len(),
                        chunk_count,
                        duration_secs
                    );
                    let summary = ArtifactSummary::from(&artifact);
                    (
                        Completed {
                            session_id: id,
                            summary,
                        },
                        vec![DeliverArtifact { id, artifact }, EmitUi],
                    )
                }
                Err(e) => {
                    log::error!("Session {} could not assemble artifact: {}", id, e);
                    (
                        Failed {
                            session_id: id,
                            error: SessionError::Encoding(e.to_string()),
                        },
                        vec![EmitUi],
                    )
                }
            }
        }
        (Stopping { session_id, .. }, Cancel) => {
            log::info!("Session {} cancelled while stopping", session_id);
            (
                Idle,
                vec![
                    ReleaseDevice {
                        id: *session_id,
                        mode: ReleaseMode::Discard,
                    },
                    EmitUi,
                ],
            )
        }

        // -----------------
        // Terminal states
        // -----------------
        (Completed { .. } | Failed { .. }, Cancel) => (Idle, vec![EmitUi]),
        (Idle, Cancel | Stop | Exit) => (Idle, vec![]),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, AcquireOk { id, .. }) if is_stale(id) => {
            log::debug!("Dropping stale AcquireOk for {}", id);
            (state.clone(), vec![])
        }
        (_, AcquireFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, DeviceLost { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFlushed { id, .. }) if is_stale(id) => {
            log::debug!("Dropping stale CaptureFlushed for {}", id);
            (state.clone(), vec![])
        }
        (_, RecordingTick { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, MaxDurationReached { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webm() -> MediaFormat {
        MediaFormat::encoded("audio/webm")
    }

    fn recording(id: Uuid, elapsed_secs: u64) -> State {
        State::Recording {
            session_id: id,
            format: webm(),
            elapsed_secs,
        }
    }

    fn has_release(effects: &[Effect], want: ReleaseMode) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::ReleaseDevice { mode, .. } if *mode == want))
    }

    #[test]
    fn idle_start_transitions_to_acquiring() {
        let (next, effects) = reduce(&State::Idle, Event::Start);
        assert!(matches!(next, State::Acquiring { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::AcquireDevice { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::EmitUi)));
    }

    #[test]
    fn acquire_ok_starts_timer_at_zero() {
        let id = Uuid::new_v4();
        let state = State::Acquiring { session_id: id };
        let (next, effects) = reduce(&state, Event::AcquireOk { id, format: webm() });

        assert_eq!(next, recording(id, 0));
        assert_eq!(next.elapsed_secs(), 0);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartRecordingTick { .. })));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartVisualizer { .. })));
    }

    #[test]
    fn permission_denied_fails_without_release() {
        let id = Uuid::new_v4();
        let state = State::Acquiring { session_id: id };
        let (next, effects) = reduce(
            &state,
            Event::AcquireFail {
                id,
                error: DeviceError::PermissionDenied,
            },
        );

        match &next {
            State::Failed { error, .. } => {
                assert_eq!(*error, SessionError::PermissionDenied);
                assert_eq!(error.kind(), "permission_denied");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::ReleaseDevice { .. })));
    }

    #[test]
    fn stale_event_is_ignored() {
        let id = Uuid::new_v4();
        let state = State::Acquiring { session_id: id };
        let (next, effects) = reduce(
            &state,
            Event::AcquireOk {
                id: Uuid::new_v4(),
                format: webm(),
            },
        );
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn start_while_active_is_rejected() {
        let id = Uuid::new_v4();
        for state in [
            State::Acquiring { session_id: id },
            recording(id, 5),
            State::Stopping {
                session_id: id,
                format: webm(),
                duration_secs: 5,
            },
        ] {
            let (next, effects) = reduce(&state, Event::Start);
            assert_eq!(next, state);
            assert!(matches!(
                effects.as_slice(),
                [Effect::Reject {
                    error: SessionError::AlreadyActive
                }]
            ));
        }
    }

    #[test]
    fn start_from_terminal_states_begins_fresh_session() {
        let old = Uuid::new_v4();
        for state in [
            State::Completed {
                session_id: old,
                summary: ArtifactSummary {
                    bytes: 3,
                    mime_type: "audio/webm".into(),
                    duration_secs: 1,
                },
            },
            State::Failed {
                session_id: old,
                error: SessionError::DeviceUnavailable,
            },
        ] {
            let (next, _) = reduce(&state, Event::Start);
            assert!(matches!(next, State::Acquiring { session_id } if session_id != old));
        }
    }

    #[test]
    fn stop_during_acquisition_returns_to_idle_and_releases() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&State::Acquiring { session_id: id }, Event::Stop);
        assert_eq!(next, State::Idle);
        assert!(has_release(&effects, ReleaseMode::Discard));

        // A late AcquireOk must not enter Recording.
        let (after, effects) = reduce(&next, Event::AcquireOk { id, format: webm() });
        assert_eq!(after, State::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn ticks_increment_only_while_recording() {
        let id = Uuid::new_v4();
        let mut state = recording(id, 0);
        for _ in 0..3 {
            state = reduce(&state, Event::RecordingTick { id }).0;
        }
        assert_eq!(state.elapsed_secs(), 3);

        let (stopping, effects) = reduce(&state, Event::Stop);
        assert!(matches!(
            stopping,
            State::Stopping {
                duration_secs: 3,
                ..
            }
        ));
        assert_eq!(stopping.elapsed_secs(), 0);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopRecordingTick { .. })));
        assert!(has_release(&effects, ReleaseMode::Flush));

        // A tick scheduled before stop must not count.
        let (after, effects) = reduce(&stopping, Event::RecordingTick { id });
        assert_eq!(after, stopping);
        assert!(effects.is_empty());
    }

    #[test]
    fn max_duration_forces_stop() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&recording(id, 120), Event::MaxDurationReached { id });
        assert!(matches!(
            next,
            State::Stopping {
                duration_secs: 120,
                ..
            }
        ));
        assert!(has_release(&effects, ReleaseMode::Flush));
    }

    #[test]
    fn flush_assembles_artifact_in_order() {
        let id = Uuid::new_v4();
        let state = State::Stopping {
            session_id: id,
            format: webm(),
            duration_secs: 2,
        };
        let mut chunks = ChunkBuffer::new();
        chunks.push(vec![1; 10]);
        chunks.push(vec![2; 20]);
        chunks.push(vec![3; 5]);

        let (next, effects) = reduce(&state, Event::CaptureFlushed { id, chunks });
        match &next {
            State::Completed { summary, .. } => {
                assert_eq!(summary.bytes, 35);
                assert_eq!(summary.duration_secs, 2);
                assert_eq!(summary.mime_type, "audio/webm");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        let delivered: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::DeliverArtifact { artifact, .. } => Some(artifact),
                _ => None,
            })
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(&delivered[0].data()[..10], &[1u8; 10][..]);
        assert_eq!(&delivered[0].data()[30..], &[3u8; 5][..]);
    }

    #[test]
    fn unaligned_pcm_flush_fails_with_encoding_error() {
        let id = Uuid::new_v4();
        let state = State::Stopping {
            session_id: id,
            format: MediaFormat::Pcm16 {
                sample_rate: 16_000,
                channels: 1,
            },
            duration_secs: 1,
        };
        let mut chunks = ChunkBuffer::new();
        chunks.push(vec![0; 3]);
        let (next, _) = reduce(&state, Event::CaptureFlushed { id, chunks });
        assert!(matches!(
            next,
            State::Failed {
                error: SessionError::Encoding(_),
                ..
            }
        ));
    }

    #[test]
    fn device_lost_fails_and_discards() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            &recording(id, 4),
            Event::DeviceLost {
                id,
                error: DeviceError::DeviceDisconnected("unplugged".into()),
            },
        );
        assert!(matches!(
            next,
            State::Failed {
                error: SessionError::DeviceDisconnected(_),
                ..
            }
        ));
        assert!(has_release(&effects, ReleaseMode::Discard));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::DeliverArtifact { .. })));
    }

    // =========================================================================
    // Cancel semantics tests
    // =========================================================================

    #[test]
    fn cancel_during_recording_aborts_without_artifact() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(&recording(id, 2), Event::Cancel);
        assert_eq!(next, State::Idle);
        assert!(has_release(&effects, ReleaseMode::Discard));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopVisualizer { .. })));
    }

    #[test]
    fn cancel_while_stopping_drops_late_flush() {
        let id = Uuid::new_v4();
        let state = State::Stopping {
            session_id: id,
            format: webm(),
            duration_secs: 1,
        };
        let (next, _) = reduce(&state, Event::Cancel);
        assert_eq!(next, State::Idle);

        let (after, effects) = reduce(
            &next,
            Event::CaptureFlushed {
                id,
                chunks: ChunkBuffer::new(),
            },
        );
        assert_eq!(after, State::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn cancel_from_terminal_returns_to_idle() {
        let state = State::Failed {
            session_id: Uuid::new_v4(),
            error: SessionError::DeviceUnavailable,
        };
        let (next, effects) = reduce(&state, Event::Cancel);
        assert_eq!(next, State::Idle);
        assert!(matches!(effects.as_slice(), [Effect::EmitUi]));
    }

    #[test]
    fn user_messages_match_error_kinds() {
        assert_eq!(
            SessionError::PermissionDenied.user_message(),
            "Microphone access denied."
        );
        assert_eq!(
            SessionError::DeviceUnavailable.user_message(),
            "No microphone found."
        );
        assert_eq!(
            SessionError::UploadFailed("500".into()).user_message(),
            "Failed to connect to backend."
        );
        assert_eq!(
            SessionError::from(DeviceError::StreamFailed("busy".into())),
            SessionError::Capture("busy".into())
        );
    }
}
