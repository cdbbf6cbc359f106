//! Live waveform rendering
//!
//! `WaveformRenderer` pulls the latest frame from a `FrequencyProbe` once per
//! refresh tick and strokes it as a line plot on a `DrawingSurface`. The loop
//! stops as soon as the listening flag goes false, clearing the surface once
//! on the way out.

use std::fmt;
use std::io::Write;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::probe::{FrequencyProbe, WaveformFrame};

/// Default refresh interval (~60fps)
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(16);

/// Error reported by a drawing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceError(pub String);

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Drawing surface error: {}", self.0)
    }
}

impl std::error::Error for SurfaceError {}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub line_width: f32,
    pub color: String,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            line_width: 2.0,
            color: "#3b82f6".to_string(),
        }
    }
}

/// A 2D surface of known pixel size. Only clear and stroke are ever issued.
pub trait DrawingSurface: Send {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self) -> Result<(), SurfaceError>;
    fn stroke_path(&mut self, points: &[(f32, f32)], style: &StrokeStyle)
        -> Result<(), SurfaceError>;
}

/// Map a frame onto a `width` x `height` surface: samples spread evenly
/// left to right, 128 on the vertical center, then a closing point at the
/// right edge's center.
pub fn trace_points(frame: &WaveformFrame, width: u32, height: u32) -> Vec<(f32, f32)> {
    let width = width as f32;
    let height = height as f32;
    let samples = frame.samples();
    let mut points = Vec::with_capacity(samples.len() + 1);

    if !samples.is_empty() {
        let slice_width = width / samples.len() as f32;
        for (i, &sample) in samples.iter().enumerate() {
            let v = sample as f32 / 128.0;
            points.push((i as f32 * slice_width, v * height / 2.0));
        }
    }
    points.push((width, height / 2.0));
    points
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repaint {
    Painted,
    /// Probe had no frame yet
    NoFrame,
    /// Surface rejected the draw; rendering carries on
    SurfaceFailed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    pub painted: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct WaveformRenderer {
    surface: Box<dyn DrawingSurface>,
    style: StrokeStyle,
}

impl WaveformRenderer {
    pub fn new(surface: Box<dyn DrawingSurface>) -> Self {
        Self {
            surface,
            style: StrokeStyle::default(),
        }
    }

    pub fn into_surface(self) -> Box<dyn DrawingSurface> {
        self.surface
    }

    /// Paint the probe's current frame, or skip if it has none yet.
    pub fn repaint(&mut self, probe: &FrequencyProbe) -> Repaint {
        let Some(frame) = probe.next_frame() else {
            return Repaint::NoFrame;
        };

        let (width, height) = self.surface.size();
        let points = trace_points(&frame, width, height);
        let result = self
            .surface
            .clear()
            .and_then(|_| self.surface.stroke_path(&points, &self.style));

        match result {
            Ok(()) => Repaint::Painted,
            Err(e) => {
                log::warn!("Waveform repaint failed: {}", e);
                Repaint::SurfaceFailed
            }
        }
    }

    pub fn clear(&mut self) {
        if let Err(e) = self.surface.clear() {
            log::warn!("Waveform clear failed: {}", e);
        }
    }

    /// Repaint every `refresh` while `listening` is true.
    ///
    /// The flag is checked when each tick fires, so a flip to false (or a
    /// dropped sender) stops painting before the next refresh. The probe is
    /// detached and the surface cleared exactly once before returning.
    pub async fn run(
        mut self,
        mut probe: FrequencyProbe,
        mut listening: watch::Receiver<bool>,
        refresh: Duration,
    ) -> (Self, RenderStats) {
        let mut stats = RenderStats::default();
        let mut tick = interval(refresh);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::debug!("Waveform renderer started");

        loop {
            tokio::select! {
                changed = listening.changed() => {
                    if changed.is_err() || !*listening.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    if !*listening.borrow() || !probe.is_attached() {
                        break;
                    }
                    match self.repaint(&probe) {
                        Repaint::Painted => stats.painted += 1,
                        Repaint::NoFrame => stats.skipped += 1,
                        Repaint::SurfaceFailed => stats.failed += 1,
                    }
                }
            }
        }

        probe.detach();
        self.clear();

        log::debug!(
            "Waveform renderer stopped: {} painted, {} skipped, {} failed",
            stats.painted,
            stats.skipped,
            stats.failed
        );
        (self, stats)
    }
}

/// Terminal surface: a single-row sparkline redrawn in place on stderr.
pub struct TextSurface {
    columns: u32,
    rows: u32,
    out: Box<dyn Write + Send>,
}

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

impl TextSurface {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            out: Box::new(std::io::stderr()),
        }
    }

    pub fn with_writer(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = out;
        self
    }

    /// One character per column; height is the deviation from the center line.
    pub fn sparkline(points: &[(f32, f32)], columns: u32, rows: u32) -> String {
        let center = rows as f32 / 2.0;
        let mut levels = vec![0usize; columns as usize];
        if center > 0.0 {
            for &(x, y) in points {
                let col = (x.max(0.0) as usize).min(levels.len().saturating_sub(1));
                let level = (((y - center).abs() / center) * 8.0).round() as usize;
                if let Some(slot) = levels.get_mut(col) {
                    *slot = (*slot).max(level.min(8));
                }
            }
        }
        levels.into_iter().map(|l| LEVELS[l]).collect()
    }
}

impl DrawingSurface for TextSurface {
    fn size(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn clear(&mut self) -> Result<(), SurfaceError> {
        write!(self.out, "\r\x1b[2K")
            .and_then(|_| self.out.flush())
            .map_err(|e| SurfaceError(e.to_string()))
    }

    fn stroke_path(
        &mut self,
        points: &[(f32, f32)],
        _style: &StrokeStyle,
    ) -> Result<(), SurfaceError> {
        let line = Self::sparkline(points, self.columns, self.rows);
        write!(self.out, "\r{}", line)
            .and_then(|_| self.out.flush())
            .map_err(|e| SurfaceError(e.to_string()))
    }
}
