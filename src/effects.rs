//! Effect runner for Concierge Voice
//!
//! This module handles executing effects produced by the state machine:
//! device acquisition and release, the one-second recording tick, and the
//! waveform visualizer. Completion events are sent back to the session loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::{
    CaptureRequest, ChunkBuffer, ChunkSink, DeviceError, DeviceGate, DrawingSurface,
    FrequencyProbe, LossCallback, MediaStreamHandle, WaveformRenderer,
};
use crate::settings::AppSettings;
use crate::state_machine::{Effect, Event, ReleaseMode};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Force a stop after this many ticks
    pub max_recording_secs: Option<u64>,
    pub refresh_interval: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

impl RunnerOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            max_recording_secs: settings.max_recording(),
            refresh_interval: settings.refresh_interval(),
        }
    }
}

/// Per-session device ownership.
enum CaptureSlot {
    /// Acquisition in flight
    Pending,
    /// Released before acquisition resolved; the stream is stopped on arrival
    Abandoned,
    Active(MediaStreamHandle),
}

type SurfaceSlot = Arc<Mutex<Option<Box<dyn DrawingSurface>>>>;

/// Effect runner backed by a `DeviceGate`.
pub struct DeviceEffectRunner {
    gate: Arc<dyn DeviceGate>,
    options: RunnerOptions,
    captures: Arc<Mutex<HashMap<Uuid, CaptureSlot>>>,
    tickers: Mutex<HashMap<Uuid, CancellationToken>>,
    visualizers: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
    surface: SurfaceSlot,
}

impl DeviceEffectRunner {
    /// Without a surface the visualizer effects are no-ops; recording is unaffected.
    pub fn new(
        gate: Arc<dyn DeviceGate>,
        options: RunnerOptions,
        surface: Option<Box<dyn DrawingSurface>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gate,
            options,
            captures: Arc::new(Mutex::new(HashMap::new())),
            tickers: Mutex::new(HashMap::new()),
            visualizers: Mutex::new(HashMap::new()),
            surface: Arc::new(Mutex::new(surface)),
        })
    }

    fn acquire(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        // Registered before the task starts so a release can never miss it.
        self.captures.lock().insert(id, CaptureSlot::Pending);

        let gate = self.gate.clone();
        let captures = self.captures.clone();
        let runtime = tokio::runtime::Handle::current();
        let lost_tx = tx.clone();
        let on_lost: LossCallback = Arc::new(move |error: DeviceError| {
            let tx = lost_tx.clone();
            runtime.spawn(async move {
                let _ = tx.send(Event::DeviceLost { id, error }).await;
            });
        });
        let request = CaptureRequest {
            id,
            sink: ChunkSink::new(),
            on_lost,
        };

        tokio::spawn(async move {
            let result = gate.acquire(request).await;

            match result {
                Ok(handle) => {
                    let format = handle.format().clone();
                    let unwanted = {
                        let mut guard = captures.lock();
                        match guard.remove(&id) {
                            Some(CaptureSlot::Pending) => {
                                guard.insert(id, CaptureSlot::Active(handle));
                                None
                            }
                            _ => Some(handle),
                        }
                    };
                    match unwanted {
                        None => {
                            let _ = tx.send(Event::AcquireOk { id, format }).await;
                        }
                        Some(handle) => {
                            log::info!("Acquisition {} resolved after release; stopping stream", id);
                            discard_off_runtime(id, handle);
                        }
                    }
                }
                Err(error) => {
                    let was_pending = matches!(
                        captures.lock().remove(&id),
                        Some(CaptureSlot::Pending)
                    );
                    if was_pending {
                        log::error!("Microphone acquisition failed: {}", error);
                        let _ = tx.send(Event::AcquireFail { id, error }).await;
                    } else {
                        log::debug!("Abandoned acquisition {} failed: {}", id, error);
                    }
                }
            }
        });
    }

    fn release(&self, id: Uuid, mode: ReleaseMode, tx: mpsc::Sender<Event>) {
        let handle = {
            let mut guard = self.captures.lock();
            match guard.remove(&id) {
                Some(CaptureSlot::Active(handle)) => Some(handle),
                Some(CaptureSlot::Pending) | Some(CaptureSlot::Abandoned) => {
                    guard.insert(id, CaptureSlot::Abandoned);
                    None
                }
                None => None,
            }
        };

        // Stopping a track joins its capture thread, so it never runs on the loop's task.
        match (handle, mode) {
            (Some(handle), ReleaseMode::Flush) => {
                tokio::spawn(async move {
                    let chunks = match tokio::task::spawn_blocking(move || handle.finish()).await {
                        Ok(chunks) => chunks,
                        Err(e) => {
                            log::error!("Flushing capture {} failed: {}", id, e);
                            ChunkBuffer::new()
                        }
                    };
                    log::info!(
                        "Capture {} flushed: {} chunks, {} bytes",
                        id,
                        chunks.len(),
                        chunks.total_bytes()
                    );
                    let _ = tx.send(Event::CaptureFlushed { id, chunks }).await;
                });
            }
            (Some(handle), ReleaseMode::Discard) => discard_off_runtime(id, handle),
            (None, ReleaseMode::Flush) => {
                log::warn!("ReleaseDevice: no live stream for id={}", id);
                tokio::spawn(async move {
                    let _ = tx
                        .send(Event::CaptureFlushed {
                            id,
                            chunks: ChunkBuffer::new(),
                        })
                        .await;
                });
            }
            (None, ReleaseMode::Discard) => {
                log::debug!("ReleaseDevice: {} has no live stream yet", id);
            }
        }
    }

    fn start_tick(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.tickers.lock().insert(id, token.clone()) {
            previous.cancel();
        }
        let max_secs = self.options.max_recording_secs;

        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval = interval_at(Instant::now() + period, period);
            let mut elapsed: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log::debug!("Recording tick stopping - session {} stopped", id);
                        break;
                    }
                    _ = interval.tick() => {
                        elapsed += 1;
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            log::debug!("Recording tick stopping - channel closed");
                            break;
                        }
                        if max_secs.is_some_and(|max| elapsed >= max) {
                            let _ = tx.send(Event::MaxDurationReached { id }).await;
                            break;
                        }
                    }
                }
            }
        });
    }

    fn stop_tick(&self, id: Uuid) {
        if let Some(token) = self.tickers.lock().remove(&id) {
            token.cancel();
        }
    }

    fn start_visualizer(&self, id: Uuid) {
        let probe = match self.captures.lock().get(&id) {
            Some(CaptureSlot::Active(handle)) => FrequencyProbe::attach(handle.tap()),
            _ => {
                log::warn!("StartVisualizer: no live stream for id={}", id);
                return;
            }
        };

        let Some(surface) = self.surface.lock().take() else {
            log::debug!("StartVisualizer: no drawing surface available, skipping");
            return;
        };

        let (listening_tx, listening_rx) = watch::channel(true);
        if let Some(previous) = self.visualizers.lock().insert(id, listening_tx) {
            let _ = previous.send(false);
        }

        let slot = self.surface.clone();
        let refresh = self.options.refresh_interval;
        tokio::spawn(async move {
            let (renderer, stats) = WaveformRenderer::new(surface)
                .run(probe, listening_rx, refresh)
                .await;
            log::debug!("Visualizer {} finished after {} repaints", id, stats.painted);
            *slot.lock() = Some(renderer.into_surface());
        });
    }

    fn stop_visualizer(&self, id: Uuid) {
        if let Some(listening) = self.visualizers.lock().remove(&id) {
            let _ = listening.send(false);
        }
    }
}

fn discard_off_runtime(id: Uuid, mut handle: MediaStreamHandle) {
    tokio::task::spawn_blocking(move || {
        handle.release();
        log::info!("Capture {} discarded", id);
    });
}

impl EffectRunner for DeviceEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::AcquireDevice { id } => self.acquire(id, tx),
            Effect::ReleaseDevice { id, mode } => self.release(id, mode, tx),
            Effect::StartRecordingTick { id } => self.start_tick(id, tx),
            Effect::StopRecordingTick { id } => self.stop_tick(id),
            Effect::StartVisualizer { id } => self.start_visualizer(id),
            Effect::StopVisualizer { id } => self.stop_visualizer(id),
            other @ (Effect::DeliverArtifact { .. } | Effect::Reject { .. } | Effect::EmitUi) => {
                log::error!("{:?} should be handled in the session loop", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{InputTrack, MediaFormat, StreamTap};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Track {
        released: Arc<AtomicUsize>,
        /// Time the hardware takes to wind down
        stop_delay: Duration,
    }

    impl InputTrack for Track {
        fn stop(&mut self) {
            std::thread::sleep(self.stop_delay);
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SlowGate {
        released: Arc<AtomicUsize>,
        delay: Duration,
        stop_delay: Duration,
    }

    #[async_trait]
    impl DeviceGate for SlowGate {
        async fn acquire(&self, request: CaptureRequest) -> Result<MediaStreamHandle, DeviceError> {
            tokio::time::sleep(self.delay).await;
            Ok(MediaStreamHandle::new(
                request.id,
                MediaFormat::encoded("audio/webm"),
                StreamTap::new(),
                request.sink,
                Box::new(Track {
                    released: self.released.clone(),
                    stop_delay: self.stop_delay,
                }),
            ))
        }
    }

    fn runner(released: &Arc<AtomicUsize>, max: Option<u64>) -> Arc<DeviceEffectRunner> {
        DeviceEffectRunner::new(
            Arc::new(SlowGate {
                released: released.clone(),
                delay: Duration::from_millis(500),
                stop_delay: Duration::ZERO,
            }),
            RunnerOptions {
                max_recording_secs: max,
                refresh_interval: Duration::from_millis(16),
            },
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn release_before_acquisition_stops_stream_on_arrival() {
        let released = Arc::new(AtomicUsize::new(0));
        let runner = runner(&released, None);
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();

        runner.spawn(Effect::AcquireDevice { id }, tx.clone());
        runner.spawn(
            Effect::ReleaseDevice {
                id,
                mode: ReleaseMode::Discard,
            },
            tx.clone(),
        );
        assert_eq!(released.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
        drop(tx);
        assert!(rx.recv().await.is_none(), "no AcquireOk after abandonment");
    }

    #[tokio::test(start_paused = true)]
    async fn tick_stops_at_max_duration() {
        let released = Arc::new(AtomicUsize::new(0));
        let runner = runner(&released, Some(3));
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();

        runner.spawn(Effect::StartRecordingTick { id }, tx);
        let mut ticks = 0;
        loop {
            match rx.recv().await {
                Some(Event::RecordingTick { .. }) => ticks += 1,
                Some(Event::MaxDurationReached { .. }) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_tick_cancels_pending_ticks() {
        let released = Arc::new(AtomicUsize::new(0));
        let runner = runner(&released, None);
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();

        runner.spawn(Effect::StartRecordingTick { id }, tx);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        runner.spawn(Effect::StopRecordingTick { id }, mpsc::channel(1).0);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, Event::RecordingTick { .. }));
            ticks += 1;
        }
        assert_eq!(ticks, 2);
    }

    #[tokio::test]
    async fn flush_waits_for_hardware_off_the_calling_task() {
        let released = Arc::new(AtomicUsize::new(0));
        let runner = DeviceEffectRunner::new(
            Arc::new(SlowGate {
                released: released.clone(),
                delay: Duration::ZERO,
                stop_delay: Duration::from_millis(300),
            }),
            RunnerOptions::default(),
            None,
        );
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();

        runner.spawn(Effect::AcquireDevice { id }, tx.clone());
        assert!(matches!(rx.recv().await, Some(Event::AcquireOk { .. })));

        let started = std::time::Instant::now();
        runner.spawn(
            Effect::ReleaseDevice {
                id,
                mode: ReleaseMode::Flush,
            },
            tx.clone(),
        );
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(released.load(Ordering::SeqCst), 0);

        match rx.recv().await {
            Some(Event::CaptureFlushed { id: flushed, chunks }) => {
                assert_eq!(flushed, id);
                assert!(chunks.is_empty());
            }
            other => panic!("expected CaptureFlushed, got {:?}", other),
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
