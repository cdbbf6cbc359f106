pub mod audio;
pub mod effects;
pub mod ripple;
pub mod settings;
pub mod state_machine;
pub mod upload;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use uuid::Uuid;

use audio::AudioArtifact;
use effects::EffectRunner;
use ripple::RippleEmitter;
use settings::AppSettings;
use state_machine::{reduce, Effect, Event, SessionError, State, Status};
use upload::{Reply, UploadCollaborator, UploadError};

/// Session state published to the shell.
/// Uses tagged union format: { "status": "idle" } or { "status": "recording", "elapsedSecs": 5, ... }
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    #[default]
    Idle,
    Acquiring,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
        #[serde(rename = "timerLabel")]
        timer_label: String,
    },
    Stopping,
    Completed {
        bytes: usize,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(rename = "durationSecs")]
        duration_secs: u64,
    },
    Failed {
        kind: String,
        message: String,
    },
}

/// Format a timer value as `m:ss`.
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Convert internal State to UiState for the shell
fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Acquiring { .. } => UiState::Acquiring,
        State::Recording { elapsed_secs, .. } => UiState::Recording {
            elapsed_secs: *elapsed_secs,
            timer_label: format_elapsed(*elapsed_secs),
        },
        State::Stopping { .. } => UiState::Stopping,
        State::Completed { summary, .. } => UiState::Completed {
            bytes: summary.bytes,
            mime_type: summary.mime_type.clone(),
            duration_secs: summary.duration_secs,
        },
        State::Failed { error, .. } => UiState::Failed {
            kind: error.kind().to_string(),
            message: error.user_message(),
        },
    }
}

/// What the shell shows around the recording: the backend reply and any
/// error or notice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub loading: bool,
    pub reply_text: Option<String>,
    pub reply_audio: Option<String>,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub can_retry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub session: UiState,
    /// Recording indicator; off in every state but `Recording`
    pub recording: bool,
    pub ripples: usize,
    pub conversation: ConversationView,
}

/// An artifact that was handed to the uploader, kept until the backend accepts it.
struct PendingUpload {
    session_id: Uuid,
    artifact: Arc<AudioArtifact>,
}

struct SessionLoop {
    state: State,
    runner: Arc<dyn EffectRunner>,
    uploader: Arc<dyn UploadCollaborator>,
    tx: mpsc::Sender<Event>,
    snapshots: watch::Sender<Snapshot>,
    /// Latest completed recording, kept for local replay
    recordings: watch::Sender<Option<Arc<AudioArtifact>>>,
    ripples: RippleEmitter,
    conversation: ConversationView,
    pending: Option<PendingUpload>,
}

impl SessionLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<Event>, ripple_cadence: std::time::Duration) {
        self.publish();
        log::info!("Session loop started");

        let mut ripple_tick = interval(ripple_cadence.max(std::time::Duration::from_millis(1)));
        ripple_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    log::debug!("Received event: {:?}", event);

                    // Handle Exit at the edge
                    if matches!(event, Event::Exit) {
                        log::info!("Exit requested, shutting down session loop");
                        break;
                    }
                    self.handle(event);
                }
                _ = ripple_tick.tick(), if self.ripples.is_running() => self.publish(),
            }
        }

        self.shutdown();
        log::info!("Session loop ended");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::UploadOk { id, reply } => self.upload_succeeded(id, reply),
            Event::UploadFail { id, error } => self.upload_failed(id, error),
            Event::RetryUpload => self.retry_upload(),
            other => self.apply(other),
        }
    }

    fn apply(&mut self, event: Event) {
        let old_status = self.state.status();
        let old_id = self.state.session_id();
        let (next, effects) = reduce(&self.state, event);
        let new_status = next.status();

        if old_status != new_status {
            log::info!(
                "State transition: {} -> {}",
                old_status.as_str(),
                new_status.as_str()
            );
            self.conversation.notice = None;

            if new_status == Status::Recording {
                self.ripples.start(Instant::now());
            } else if old_status == Status::Recording {
                self.ripples.stop();
            }
        }
        if new_status == Status::Acquiring && next.session_id() != old_id {
            self.clear_conversation();
        }

        self.state = next;

        // Execute effects
        for eff in effects {
            match eff {
                Effect::EmitUi => self.publish(),
                Effect::DeliverArtifact { id, artifact } => self.deliver(id, artifact),
                Effect::Reject { error } => {
                    self.conversation.notice = Some(error.user_message());
                    self.publish();
                }
                other => self.runner.spawn(other, self.tx.clone()),
            }
        }
    }

    /// A new recording clears the previous reply. An upload still in flight
    /// is left to finish.
    fn clear_conversation(&mut self) {
        self.conversation.reply_text = None;
        self.conversation.reply_audio = None;
        self.conversation.error = None;
        self.conversation.can_retry = false;
        if !self.conversation.loading {
            self.pending = None;
        }
    }

    fn deliver(&mut self, session_id: Uuid, artifact: AudioArtifact) {
        let artifact = Arc::new(artifact);
        self.recordings.send_replace(Some(artifact.clone()));
        self.pending = Some(PendingUpload {
            session_id,
            artifact: artifact.clone(),
        });
        self.spawn_upload(session_id, artifact);
    }

    fn spawn_upload(&mut self, id: Uuid, artifact: Arc<AudioArtifact>) {
        self.conversation.loading = true;
        self.conversation.error = None;
        self.conversation.can_retry = false;
        self.publish();

        let uploader = self.uploader.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match uploader.upload(&artifact).await {
                Ok(reply) => Event::UploadOk { id, reply },
                Err(error) => Event::UploadFail { id, error },
            };
            let _ = tx.send(event).await;
        });
    }

    fn is_pending(&self, id: Uuid) -> bool {
        self.pending.as_ref().map(|p| p.session_id) == Some(id)
    }

    fn upload_succeeded(&mut self, id: Uuid, reply: Reply) {
        if !self.is_pending(id) {
            log::debug!("Dropping stale UploadOk for {}", id);
            return;
        }
        log::info!("Upload for session {} succeeded", id);
        self.pending = None;
        self.conversation.loading = false;
        self.conversation.can_retry = false;
        self.conversation.reply_text = Some(reply.text);
        self.conversation.reply_audio = Some(reply.audio_reference);
        self.publish();
    }

    fn upload_failed(&mut self, id: Uuid, error: UploadError) {
        if !self.is_pending(id) {
            log::debug!("Dropping stale UploadFail for {}", id);
            return;
        }
        log::error!("Upload for session {} failed: {}", id, error);
        let error = SessionError::UploadFailed(error.to_string());
        self.conversation.loading = false;
        self.conversation.error = Some(error.user_message());
        self.conversation.can_retry = true;
        self.publish();
    }

    fn retry_upload(&mut self) {
        if self.conversation.loading {
            log::debug!("RetryUpload ignored: upload already in flight");
            return;
        }
        match &self.pending {
            Some(pending) => {
                let (id, artifact) = (pending.session_id, pending.artifact.clone());
                log::info!("Retrying upload for session {}", id);
                self.spawn_upload(id, artifact);
            }
            None => {
                self.conversation.notice = Some("There is no recording to resend.".to_string());
                self.publish();
            }
        }
    }

    /// Tear down an active session as if it were cancelled.
    fn shutdown(&mut self) {
        if self.state.is_active() {
            log::info!("Cancelling active session before exit");
            self.apply(Event::Cancel);
        }
        self.ripples.stop();
        self.publish();
    }

    fn snapshot(&mut self) -> Snapshot {
        self.ripples.advance(Instant::now());
        Snapshot {
            session: state_to_ui(&self.state),
            recording: self.state.status() == Status::Recording,
            ripples: self.ripples.len(),
            conversation: self.conversation.clone(),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        log::debug!("Publishing snapshot: {:?}", serde_json::to_string(&snapshot));
        self.snapshots.send_replace(snapshot);
    }
}

/// Handle used by the shell to drive a running session loop.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Event>,
    snapshots: watch::Receiver<Snapshot>,
    recordings: watch::Receiver<Option<Arc<AudioArtifact>>>,
}

impl SessionHandle {
    /// Send an event to the state machine
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(event).await
    }

    pub async fn start(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::Start).await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::Stop).await
    }

    pub async fn cancel(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::Cancel).await
    }

    pub async fn retry_upload(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::RetryUpload).await
    }

    pub async fn exit(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::Exit).await
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// The artifact of the most recent completed session, whether or not
    /// the backend accepted it.
    pub fn last_recording(&self) -> Option<Arc<AudioArtifact>> {
        self.recordings.borrow().clone()
    }
}

/// Spawn the session loop on the current tokio runtime.
pub fn spawn_session(
    runner: Arc<dyn EffectRunner>,
    uploader: Arc<dyn UploadCollaborator>,
    settings: &AppSettings,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Event>(32);
    let (snapshots, snapshot_rx) = watch::channel(Snapshot::default());
    let (recordings, recording_rx) = watch::channel(None);

    let session = SessionLoop {
        state: State::default(),
        runner,
        uploader,
        tx: tx.clone(),
        snapshots,
        recordings,
        ripples: RippleEmitter::new(settings.ripple_cadence(), settings.ripple_lifetime()),
        conversation: ConversationView::default(),
        pending: None,
    };
    let task = tokio::spawn(session.run(rx, settings.ripple_cadence()));

    (
        SessionHandle {
            tx,
            snapshots: snapshot_rx,
            recordings: recording_rx,
        },
        task,
    )
}
