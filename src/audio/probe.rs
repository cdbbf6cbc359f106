//! Time-domain probes for live visualization
//!
//! A `StreamTap` lives on every live stream and fans the capture callback's
//! samples out to whatever probes are attached. Each `FrequencyProbe` keeps a
//! small rolling window and turns it into a `WaveformFrame` only when asked,
//! so a consumer that stops polling never builds up a backlog.
//!
//! Probes share one process-wide `AnalysisContext`: it is created on first
//! attach and torn down when the last probe detaches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Analysis window size in samples
pub const FFT_SIZE: usize = 128;

/// Bytes per frame (half the window, like an analyser's bin count)
pub const FRAME_LEN: usize = FFT_SIZE / 2;

static CONTEXT: Lazy<Mutex<Weak<AnalysisContext>>> = Lazy::new(|| Mutex::new(Weak::new()));
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// Shared analysis state. Reference-counted through `Arc`; never constructed directly.
#[derive(Debug)]
pub struct AnalysisContext {
    fft_size: usize,
    generation: u64,
}

impl AnalysisContext {
    /// Get the live context, creating it if no probe currently holds one.
    pub fn shared() -> Arc<Self> {
        let mut slot = CONTEXT.lock();
        if let Some(ctx) = slot.upgrade() {
            return ctx;
        }

        let ctx = Arc::new(Self {
            fft_size: FFT_SIZE,
            generation: GENERATION.fetch_add(1, Ordering::Relaxed) + 1,
        });
        *slot = Arc::downgrade(&ctx);
        log::debug!("Analysis context #{} created", ctx.generation);
        ctx
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frame_len(&self) -> usize {
        self.fft_size / 2
    }
}

impl Drop for AnalysisContext {
    fn drop(&mut self) {
        log::debug!("Analysis context #{} torn down", self.generation);
    }
}

/// One time-domain amplitude snapshot. 128 means silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformFrame {
    samples: Vec<u8>,
}

impl WaveformFrame {
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest deviation from the baseline, 0..=128.
    pub fn peak(&self) -> u8 {
        self.samples
            .iter()
            .map(|&s| (s as i16 - 128).unsigned_abs() as u8)
            .max()
            .unwrap_or(0)
    }
}

/// Rolling window of the most recent samples fed to one probe.
struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    fed: bool,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            fed: false,
        }
    }

    fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        self.fed = true;
        let len = samples.len();

        if len >= self.capacity {
            self.samples.clear();
            self.samples.extend(&samples[len - self.capacity..]);
            return;
        }

        let to_remove = (self.samples.len() + len).saturating_sub(self.capacity);
        if to_remove > 0 {
            self.samples.drain(0..to_remove);
        }
        self.samples.extend(samples);
    }

    /// Latest `frame_len` samples as unsigned bytes, zero-padded (silence) at the front.
    fn snapshot(&self, frame_len: usize) -> Option<WaveformFrame> {
        if !self.fed {
            return None;
        }
        let available = self.samples.len().min(frame_len);
        let mut out = vec![128u8; frame_len - available];
        out.extend(
            self.samples
                .iter()
                .skip(self.samples.len() - available)
                .map(|&s| sample_to_byte(s)),
        );
        Some(WaveformFrame { samples: out })
    }
}

fn sample_to_byte(sample: f32) -> u8 {
    let scaled = (sample.clamp(-1.0, 1.0) + 1.0) * 128.0;
    scaled.clamp(0.0, 255.0) as u8
}

/// Fan-out point on a live stream. Feeding copies samples into every attached
/// probe; the stream's other consumers are unaffected.
#[derive(Default)]
pub struct StreamTap {
    windows: Mutex<Vec<Weak<Mutex<SampleWindow>>>>,
}

impl StreamTap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver mono samples in -1.0..=1.0. Detached probes are pruned here.
    pub fn feed(&self, samples: &[f32]) {
        let mut windows = self.windows.lock();
        windows.retain(|weak| match weak.upgrade() {
            Some(window) => {
                window.lock().push_samples(samples);
                true
            }
            None => false,
        });
    }

    pub fn listener_count(&self) -> usize {
        self.windows
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn register(&self, window: &Arc<Mutex<SampleWindow>>) {
        self.windows.lock().push(Arc::downgrade(window));
    }
}

/// Pull-based view of a stream's waveform.
pub struct FrequencyProbe {
    window: Option<Arc<Mutex<SampleWindow>>>,
    context: Option<Arc<AnalysisContext>>,
}

impl FrequencyProbe {
    pub fn attach(tap: &StreamTap) -> Self {
        let context = AnalysisContext::shared();
        let window = Arc::new(Mutex::new(SampleWindow::new(context.fft_size())));
        tap.register(&window);
        Self {
            window: Some(window),
            context: Some(context),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.window.is_some()
    }

    pub fn context(&self) -> Option<&Arc<AnalysisContext>> {
        self.context.as_ref()
    }

    /// Sample the stream now. `None` while detached or before any audio arrived.
    pub fn next_frame(&self) -> Option<WaveformFrame> {
        let window = self.window.as_ref()?;
        let frame_len = self.context.as_ref()?.frame_len();
        let guard = window.lock();
        guard.snapshot(frame_len)
    }

    /// Stop sampling and give back this probe's share of the analysis context.
    pub fn detach(&mut self) {
        if self.window.take().is_some() {
            self.context = None;
            log::debug!("Waveform probe detached");
        }
    }
}

impl Drop for FrequencyProbe {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_frame_before_audio_arrives() {
        let tap = StreamTap::new();
        let probe = FrequencyProbe::attach(&tap);
        assert!(probe.next_frame().is_none());
    }

    #[test]
    fn frame_maps_amplitude_around_center() {
        let tap = StreamTap::new();
        let probe = FrequencyProbe::attach(&tap);
        tap.feed(&[0.0; FFT_SIZE]);
        let silent = probe.next_frame().unwrap();
        assert_eq!(silent.len(), FRAME_LEN);
        assert!(silent.samples().iter().all(|&s| s == 128));
        assert_eq!(silent.peak(), 0);

        tap.feed(&[1.0, -1.0]);
        let frame = probe.next_frame().unwrap();
        let tail = &frame.samples()[FRAME_LEN - 2..];
        assert_eq!(tail, &[255, 0]);
        assert_eq!(frame.peak(), 128);
    }

    #[test]
    fn short_feed_is_padded_with_silence() {
        let tap = StreamTap::new();
        let probe = FrequencyProbe::attach(&tap);
        tap.feed(&[0.5; 4]);
        let frame = probe.next_frame().unwrap();
        assert_eq!(frame.len(), FRAME_LEN);
        assert!(frame.samples()[..FRAME_LEN - 4].iter().all(|&s| s == 128));
        assert!(frame.samples()[FRAME_LEN - 4..].iter().all(|&s| s == 192));
    }

    #[test]
    fn frames_are_snapshots_not_a_queue() {
        let tap = StreamTap::new();
        let probe = FrequencyProbe::attach(&tap);
        for i in 0..10 {
            tap.feed(&[i as f32 / 10.0; 8]);
        }
        // Only the latest state is visible; intermediate feeds are not replayed.
        let first = probe.next_frame().unwrap();
        let second = probe.next_frame().unwrap();
        assert_eq!(first, second);
        assert_eq!(*first.samples().last().unwrap(), sample_to_byte(0.9));
    }

    #[test]
    fn probes_tap_without_stealing_samples() {
        let tap = StreamTap::new();
        let a = FrequencyProbe::attach(&tap);
        let b = FrequencyProbe::attach(&tap);
        assert_eq!(tap.listener_count(), 2);

        tap.feed(&[0.25; 16]);
        assert_eq!(a.next_frame(), b.next_frame());
        assert!(a.next_frame().is_some());
    }

    #[test]
    fn detach_stops_sampling_immediately() {
        let tap = StreamTap::new();
        let mut probe = FrequencyProbe::attach(&tap);
        tap.feed(&[0.1; 16]);
        assert!(probe.next_frame().is_some());

        probe.detach();
        assert!(!probe.is_attached());
        assert!(probe.next_frame().is_none());
        assert!(probe.context().is_none());

        tap.feed(&[0.1; 16]);
        assert_eq!(tap.listener_count(), 0);
        probe.detach();
    }

    #[test]
    fn concurrent_probes_share_one_context() {
        let tap = StreamTap::new();
        let a = FrequencyProbe::attach(&tap);
        let b = FrequencyProbe::attach(&tap);
        let ctx_a = a.context().unwrap();
        let ctx_b = b.context().unwrap();
        assert!(Arc::ptr_eq(ctx_a, ctx_b));
        assert_eq!(ctx_a.fft_size(), FFT_SIZE);
        assert_eq!(ctx_a.frame_len(), FRAME_LEN);
    }

    #[test]
    fn window_is_bounded() {
        let mut window = SampleWindow::new(FFT_SIZE);
        window.push_samples(&vec![0.0; FFT_SIZE * 3]);
        assert_eq!(window.samples.len(), FFT_SIZE);
        window.push_samples(&[0.5; 10]);
        assert_eq!(window.samples.len(), FFT_SIZE);
    }
}
