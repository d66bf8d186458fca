//! Page-number HUD shown briefly after every page change.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Fade timings, all measured from the triggering page change.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayTiming {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "fade_in_ms")]
    pub fade_in: Duration,
    /// Delay between the trigger and the start of the fade-out.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "hold_ms")]
    pub hold: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "fade_out_ms")]
    pub fade_out: Duration,
}

impl Default for OverlayTiming {
    fn default() -> Self {
        Self {
            fade_in: Duration::from_millis(300),
            hold: Duration::from_secs(1),
            fade_out: Duration::from_millis(300),
        }
    }
}

impl OverlayTiming {
    /// Time from trigger until the overlay is hidden again.
    pub fn cycle_length(&self) -> Duration {
        self.hold.max(self.fade_in) + self.fade_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Hidden,
    FadingIn,
    Visible,
    FadingOut,
}

#[derive(Debug, Clone, Copy)]
struct FadeCycle {
    triggered_at: Instant,
    from_opacity: f32,
}

/// Transient, debounced page readout. Not persisted.
///
/// A trigger while a cycle is running restarts the timeline instead of
/// starting a second cycle, so a burst of page changes yields one fade-in and
/// one fade-out that ends after the last change.
#[derive(Debug, Clone)]
pub struct PageOverlay {
    timing: OverlayTiming,
    page: Option<usize>,
    cycle: Option<FadeCycle>,
    cycles: u64,
}

impl PageOverlay {
    pub fn new(timing: OverlayTiming) -> Self {
        Self {
            timing,
            page: None,
            cycle: None,
            cycles: 0,
        }
    }

    pub fn timing(&self) -> OverlayTiming {
        self.timing
    }

    /// Page currently shown by the overlay.
    pub fn page(&self) -> Option<usize> {
        self.page
    }

    /// Number of fade cycles started from a hidden overlay.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Records the current page; triggers the overlay when it differs from
    /// the last observed page, including the very first observation.
    pub fn observe(&mut self, page: usize, now: Instant) -> bool {
        if self.page == Some(page) {
            return false;
        }
        self.page = Some(page);
        self.trigger(now);
        true
    }

    pub fn trigger(&mut self, now: Instant) {
        let from_opacity = self.opacity(now);
        if from_opacity <= 0.0 {
            self.cycles += 1;
        }
        self.cycle = Some(FadeCycle {
            triggered_at: now,
            from_opacity,
        });
    }

    pub fn phase(&self, now: Instant) -> OverlayPhase {
        let Some(cycle) = self.cycle else {
            return OverlayPhase::Hidden;
        };
        let elapsed = now.saturating_duration_since(cycle.triggered_at);
        let fade_out_start = self.timing.hold.max(self.timing.fade_in);
        if elapsed < self.timing.fade_in {
            OverlayPhase::FadingIn
        } else if elapsed < fade_out_start {
            OverlayPhase::Visible
        } else if elapsed < fade_out_start + self.timing.fade_out {
            OverlayPhase::FadingOut
        } else {
            OverlayPhase::Hidden
        }
    }

    pub fn opacity(&self, now: Instant) -> f32 {
        let Some(cycle) = self.cycle else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(cycle.triggered_at);
        let fade_out_start = self.timing.hold.max(self.timing.fade_in);
        match self.phase(now) {
            OverlayPhase::Hidden => 0.0,
            OverlayPhase::Visible => 1.0,
            OverlayPhase::FadingIn => {
                let t = progress(elapsed, self.timing.fade_in);
                cycle.from_opacity + (1.0 - cycle.from_opacity) * t
            }
            OverlayPhase::FadingOut => {
                let t = progress(elapsed - fade_out_start, self.timing.fade_out);
                1.0 - t
            }
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        self.opacity(now) > 0.0
    }

    /// When the UI must redraw next for the animation, `None` once hidden.
    pub fn next_frame(&self, now: Instant) -> Option<Instant> {
        let cycle = self.cycle?;
        let fade_out_start = cycle.triggered_at + self.timing.hold.max(self.timing.fade_in);
        match self.phase(now) {
            OverlayPhase::Hidden => None,
            OverlayPhase::FadingIn | OverlayPhase::FadingOut => Some(now + FRAME_INTERVAL),
            OverlayPhase::Visible => Some(fade_out_start),
        }
    }

    /// Drops a finished cycle.
    pub fn tick(&mut self, now: Instant) {
        if self.cycle.is_some() && self.phase(now) == OverlayPhase::Hidden {
            self.cycle = None;
        }
    }
}

impl Default for PageOverlay {
    fn default() -> Self {
        Self::new(OverlayTiming::default())
    }
}

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn progress(elapsed: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
}
