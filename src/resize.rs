//! Gesture-to-time quantization for calendar events.
//!
//! Dragging an event's bottom edge resizes it; dragging its body reschedules
//! it. Both map a vertical pixel delta linearly onto minutes
//! (`unit_pixel_height` px = `unit_minutes` min) and snap the result to
//! `snap_minutes`. A resized duration is never shorter than one snap unit.
//! A resize that ends where it began keeps the anchor duration untouched.
//! Neither gesture persists anything: the caller stores the committed value.

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::ItemId;

/// Keeps minute arithmetic far away from `Duration`'s range.
const MAX_MINUTES: i64 = 1 << 40;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeConfig {
    /// Pixel height of one time unit (default: 60 px).
    pub unit_pixel_height: f64,
    /// Minutes in one time unit (default: 60).
    pub unit_minutes: i64,
    /// Snap granularity and minimum duration in minutes (default: 30).
    pub snap_minutes: i64,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            unit_pixel_height: 60.0,
            unit_minutes: 60,
            snap_minutes: 30,
        }
    }
}

impl ResizeConfig {
    /// Replace unusable values with defaults.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            unit_pixel_height: if self.unit_pixel_height.is_finite() && self.unit_pixel_height > 0.0 {
                self.unit_pixel_height
            } else {
                d.unit_pixel_height
            },
            unit_minutes: if self.unit_minutes > 0 { self.unit_minutes } else { d.unit_minutes },
            snap_minutes: if self.snap_minutes > 0 { self.snap_minutes } else { d.snap_minutes },
        }
    }

    fn pixels_to_minutes(&self, delta_pixels: f64) -> f64 {
        delta_pixels / self.unit_pixel_height * self.unit_minutes as f64
    }
}

/// Round `raw` minutes to the nearest multiple of `snap`.
fn round_to_snap(raw: f64, snap: i64) -> i64 {
    let limit = MAX_MINUTES / snap;
    let steps = (raw / snap as f64).round();
    let steps = if steps.is_nan() {
        0
    } else {
        (steps as i64).clamp(-limit, limit)
    };
    steps * snap
}

/// A duration in minutes, snapped and clamped to at least one snap unit.
pub fn snap_duration(raw_minutes: f64, snap_minutes: i64) -> i64 {
    let snap = snap_minutes.max(1);
    round_to_snap(raw_minutes.max(snap as f64), snap).max(snap)
}

/// Produces resize and reschedule gestures with one configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizeController {
    config: ResizeConfig,
}

impl ResizeController {
    pub fn new(config: ResizeConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &ResizeConfig {
        &self.config
    }

    /// Start dragging the end edge of an event that starts at `start` and
    /// currently lasts `anchor_duration`. Until the pointer moves, the
    /// proposal is the anchor itself, unsnapped.
    pub fn begin(
        &self,
        event_id: ItemId,
        start: NaiveTime,
        anchor_duration: Duration,
        origin_pixels: f64,
    ) -> ResizeGesture {
        ResizeGesture {
            config: self.config,
            state: ResizeState {
                event_id,
                anchor_start: start,
                anchor_duration,
                origin_pixels,
                current_pixels: origin_pixels,
            },
            proposed: anchor_duration,
        }
    }

    /// Start dragging a whole event to a new start time.
    pub fn begin_reschedule(
        &self,
        event_id: ItemId,
        start: NaiveTime,
        duration: Duration,
        origin_pixels: f64,
    ) -> RescheduleGesture {
        RescheduleGesture {
            config: self.config,
            event_id,
            anchor_start: start,
            duration,
            origin_pixels,
            offset_minutes: 0,
        }
    }
}

// ── Resize ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeState {
    pub event_id: ItemId,
    pub anchor_start: NaiveTime,
    pub anchor_duration: Duration,
    pub origin_pixels: f64,
    pub current_pixels: f64,
}

/// One resize gesture. Dropping it cancels; `commit` consumes it.
#[derive(Debug, Clone)]
pub struct ResizeGesture {
    config: ResizeConfig,
    state: ResizeState,
    proposed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeCommit {
    pub event_id: ItemId,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub duration: Duration,
    /// Whole days the end rolled past midnight.
    pub days_rolled: i64,
    /// False when the committed duration equals the anchor.
    pub changed: bool,
}

impl ResizeCommit {
    pub fn wraps_midnight(&self) -> bool {
        self.days_rolled != 0
    }
}

impl ResizeGesture {
    pub fn state(&self) -> &ResizeState {
        &self.state
    }

    /// Feed the current pointer position; returns the proposed duration.
    /// A pointer back at the origin proposes the anchor again.
    pub fn update(&mut self, current_pixels: f64) -> Duration {
        self.state.current_pixels = current_pixels;
        if current_pixels == self.state.origin_pixels {
            self.proposed = self.state.anchor_duration;
            return self.proposed;
        }
        let anchor = self.state.anchor_duration.num_minutes() as f64;
        let delta = self
            .config
            .pixels_to_minutes(current_pixels - self.state.origin_pixels);
        self.proposed = Duration::minutes(snap_duration(anchor + delta, self.config.snap_minutes));
        self.proposed
    }

    pub fn proposed(&self) -> Duration {
        self.proposed
    }

    /// Turn the last proposed duration into a wall-clock end time.
    pub fn commit(self) -> ResizeCommit {
        let duration = self.proposed();
        let start = self.state.anchor_start;
        let (end, wrapped_secs) = start.overflowing_add_signed(duration);
        ResizeCommit {
            event_id: self.state.event_id,
            start,
            end,
            duration,
            days_rolled: wrapped_secs / 86_400,
            changed: duration != self.state.anchor_duration,
        }
    }
}

// ── Reschedule ───────────────────────────────────────────────────

/// One reschedule gesture: the duration is kept, the start shifts by the
/// snapped pointer delta (earlier when negative).
#[derive(Debug, Clone)]
pub struct RescheduleGesture {
    config: ResizeConfig,
    event_id: ItemId,
    anchor_start: NaiveTime,
    duration: Duration,
    origin_pixels: f64,
    offset_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescheduleCommit {
    pub event_id: ItemId,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub offset: Duration,
}

impl RescheduleGesture {
    /// Feed the current pointer position; returns the proposed start.
    pub fn update(&mut self, current_pixels: f64) -> NaiveTime {
        let delta = self.config.pixels_to_minutes(current_pixels - self.origin_pixels);
        self.offset_minutes = round_to_snap(delta, self.config.snap_minutes);
        self.proposed_start()
    }

    pub fn proposed_start(&self) -> NaiveTime {
        self.anchor_start
            .overflowing_add_signed(Duration::minutes(self.offset_minutes))
            .0
    }

    pub fn commit(self) -> RescheduleCommit {
        let start = self.proposed_start();
        let (end, _) = start.overflowing_add_signed(self.duration);
        RescheduleCommit {
            event_id: self.event_id,
            start,
            end,
            offset: Duration::minutes(self.offset_minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ulid::Ulid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn forty_pixels_snaps_to_ninety_minutes() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(60), 100.0);
        // 60 + 40 = 100 minutes raw, nearest multiple of 30 is 90.
        assert_eq!(g.update(140.0), Duration::minutes(90));
        let commit = g.commit();
        assert_eq!(commit.duration, Duration::minutes(90));
        assert_eq!(commit.end, t(10, 30));
        assert!(!commit.wraps_midnight());
        assert!(commit.changed);
    }

    #[test]
    fn shrinking_below_one_unit_clamps_to_minimum() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(60), 0.0);
        // 60 - 50 = 10 minutes raw.
        assert_eq!(g.update(-50.0), Duration::minutes(30));
        // Far past zero is still one unit, never zero or negative.
        assert_eq!(g.update(-10_000.0), Duration::minutes(30));
    }

    #[test]
    fn tap_on_handle_keeps_anchor() {
        let ctl = ResizeController::default();
        // 45 minutes is off the 30-minute grid; a tap must not snap it.
        let g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(45), 0.0);
        let commit = g.commit();
        assert_eq!(commit.duration, Duration::minutes(45));
        assert_eq!(commit.end, t(9, 45));
        assert!(!commit.changed);
    }

    #[test]
    fn returning_to_origin_restores_anchor() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(45), 100.0);
        assert_eq!(g.update(160.0), Duration::minutes(90));
        assert_eq!(g.update(100.0), Duration::minutes(45));
        assert!(!g.commit().changed);
    }

    #[test]
    fn any_travel_snaps() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(45), 0.0);
        // 45 + 1 = 46 raw, nearest 30 is 60.
        assert_eq!(g.update(1.0), Duration::minutes(60));
        assert!(g.commit().changed);
    }

    #[test]
    fn end_wraps_past_midnight() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(23, 0), Duration::minutes(60), 0.0);
        g.update(60.0); // +1h
        let commit = g.commit();
        assert_eq!(commit.duration, Duration::minutes(120));
        assert_eq!(commit.end, t(1, 0));
        assert_eq!(commit.days_rolled, 1);
        assert!(commit.wraps_midnight());
    }

    #[test]
    fn state_tracks_pointer() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(60), 10.0);
        g.update(42.0);
        assert_eq!(g.state().origin_pixels, 10.0);
        assert_eq!(g.state().current_pixels, 42.0);
    }

    #[test]
    fn bad_config_falls_back_to_defaults() {
        let ctl = ResizeController::new(ResizeConfig {
            unit_pixel_height: 0.0,
            unit_minutes: -5,
            snap_minutes: 0,
        });
        assert_eq!(ctl.config(), &ResizeConfig::default());
    }

    #[test]
    fn custom_snap_granularity() {
        let ctl = ResizeController::new(ResizeConfig {
            unit_pixel_height: 40.0,
            unit_minutes: 60,
            snap_minutes: 15,
        });
        let mut g = ctl.begin(Ulid::new(), t(8, 0), Duration::minutes(30), 0.0);
        // 30 + 10/40*60 = 45.
        assert_eq!(g.update(10.0), Duration::minutes(45));
    }

    #[test]
    fn non_finite_pointer_stays_valid() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin(Ulid::new(), t(9, 0), Duration::minutes(60), 0.0);
        assert_eq!(g.update(f64::NAN), Duration::minutes(30));
        let huge = g.update(f64::INFINITY).num_minutes();
        assert!(huge > 0);
        assert_eq!(huge % 30, 0);
    }

    #[test]
    fn reschedule_shifts_start_by_snapped_offset() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin_reschedule(Ulid::new(), t(9, 0), Duration::minutes(60), 200.0);
        // +50px = +50min → nearest 30 is 60.
        assert_eq!(g.update(250.0), t(10, 0));
        // -20px = -20min → nearest 30 is -30.
        assert_eq!(g.update(180.0), t(8, 30));
        let commit = g.commit();
        assert_eq!(commit.start, t(8, 30));
        assert_eq!(commit.end, t(9, 30));
        assert_eq!(commit.offset, Duration::minutes(-30));
    }

    #[test]
    fn reschedule_wraps_before_midnight() {
        let ctl = ResizeController::default();
        let mut g = ctl.begin_reschedule(Ulid::new(), t(0, 30), Duration::minutes(30), 0.0);
        assert_eq!(g.update(-60.0), t(23, 30));
        assert_eq!(g.commit().end, t(0, 0));
    }

    proptest! {
        #[test]
        fn snapped_duration_is_positive_multiple(
            anchor in 0i64..2_000,
            origin in -5_000.0f64..5_000.0,
            current in -5_000.0f64..5_000.0,
            snap in 1i64..120,
        ) {
            let ctl = ResizeController::new(ResizeConfig {
                unit_pixel_height: 60.0,
                unit_minutes: 60,
                snap_minutes: snap,
            });
            prop_assume!(current != origin);
            let mut g = ctl.begin(Ulid::new(), t(12, 0), Duration::minutes(anchor), origin);
            let minutes = g.update(current).num_minutes();
            prop_assert!(minutes >= snap);
            prop_assert_eq!(minutes % snap, 0);
        }
    }
}
