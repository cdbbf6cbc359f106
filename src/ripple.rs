//! Pulsing record indicator
//!
//! Ripples are emitted on a fixed cadence while recording and expire after a
//! fixed lifetime. Instead of one timer per ripple, the queue is brought up to
//! date lazily whenever it is observed: due ripples are appended with their
//! scheduled timestamps, expired ones are pruned from the front.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ripple {
    pub id: u64,
    pub created_at: Instant,
}

#[derive(Debug)]
pub struct RippleEmitter {
    cadence: Duration,
    lifetime: Duration,
    ripples: VecDeque<Ripple>,
    /// Scheduled time of the next ripple; `None` while stopped
    next_due: Option<Instant>,
    emitted: u64,
}

impl RippleEmitter {
    pub fn new(cadence: Duration, lifetime: Duration) -> Self {
        Self {
            cadence: cadence.max(Duration::from_millis(1)),
            lifetime,
            ripples: VecDeque::new(),
            next_due: None,
            emitted: 0,
        }
    }

    /// Begin emitting. The first ripple is due immediately.
    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now);
            self.advance(now);
        }
    }

    /// Discard every pending ripple at once and reset ids.
    pub fn stop(&mut self) {
        self.next_due = None;
        self.ripples.clear();
        self.emitted = 0;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Emit ripples due by `now` and prune the expired ones.
    pub fn advance(&mut self, now: Instant) {
        let Some(mut due) = self.next_due else {
            return;
        };

        while due <= now {
            // Ripples that would already have expired are never queued.
            if now.saturating_duration_since(due) < self.lifetime {
                self.ripples.push_back(Ripple {
                    id: self.emitted,
                    created_at: due,
                });
            }
            self.emitted += 1;
            due += self.cadence;
        }
        self.next_due = Some(due);

        while let Some(front) = self.ripples.front() {
            if now.saturating_duration_since(front.created_at) >= self.lifetime {
                self.ripples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn ripples(&self) -> impl Iterator<Item = &Ripple> {
        self.ripples.iter()
    }

    pub fn len(&self) -> usize {
        self.ripples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ripples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter() -> RippleEmitter {
        RippleEmitter::new(Duration::from_millis(400), Duration::from_millis(1000))
    }

    #[test]
    fn idle_emitter_has_no_ripples() {
        let mut e = emitter();
        e.advance(Instant::now());
        assert!(e.is_empty());
        assert!(!e.is_running());
    }

    #[test]
    fn ripples_overlap_until_they_expire() {
        let t0 = Instant::now();
        let mut e = emitter();
        e.start(t0);
        assert_eq!(e.len(), 1);

        e.advance(t0 + Duration::from_millis(900));
        // Emitted at 0, 400, 800; none expired yet.
        assert_eq!(e.len(), 3);

        e.advance(t0 + Duration::from_millis(1000));
        // The first hits its lifetime.
        let ids: Vec<u64> = e.ripples().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);

        e.advance(t0 + Duration::from_millis(5000));
        // Steady state: at most ceil(lifetime / cadence) alive.
        assert!(e.len() <= 3);
        assert!(e
            .ripples()
            .all(|r| t0 + Duration::from_millis(5000) - r.created_at < Duration::from_millis(1000)));
    }

    #[test]
    fn stop_discards_immediately_and_resets_ids() {
        let t0 = Instant::now();
        let mut e = emitter();
        e.start(t0);
        e.advance(t0 + Duration::from_millis(500));
        assert_eq!(e.len(), 2);

        e.stop();
        assert!(e.is_empty());
        e.advance(t0 + Duration::from_millis(600));
        assert!(e.is_empty());

        let t1 = t0 + Duration::from_millis(700);
        e.start(t1);
        assert_eq!(e.ripples().next().map(|r| r.id), Some(0));
    }

    #[test]
    fn late_observation_catches_up_without_timers() {
        let t0 = Instant::now();
        let mut e = emitter();
        e.start(t0);
        e.advance(t0 + Duration::from_millis(2100));
        // Due at 1200, 1600, 2000 are still alive.
        let ids: Vec<u64> = e.ripples().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn long_recordings_keep_a_steady_cadence() {
        let t0 = Instant::now();
        let mut e = emitter();
        e.start(t0);

        // Eleven hours observed once per cadence.
        let steps: u64 = 100_000;
        let mut now = t0;
        for _ in 0..steps {
            now += Duration::from_millis(400);
            e.advance(now);
        }

        let live: Vec<Ripple> = e.ripples().copied().collect();
        assert_eq!(
            live.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![steps - 2, steps - 1, steps]
        );
        for ripple in live {
            assert_eq!(ripple.created_at, t0 + Duration::from_millis(400 * ripple.id));
        }
    }
}
