//! Time resolution engine: bar/tempo bookkeeping and event placement.
//!
//! Bars are expanded by their repeat counts and timed beat by beat: each beat
//! uses the tempo of the latest mark at or before it, so a mark placed in the
//! middle of a bar only changes the beats from its anchor on. The start of
//! every bar is cached as a prefix sum and refreshed by
//! [`TimeLine::calc_bar_durations`] whenever bars or tempo marks change.
//!
//! Lookups always reflect the bars and tempo marks declared *so far*. A later
//! `bar` or `tempo` statement never moves occurrences that were already placed.

use std::fmt;

use log::debug;

use super::tempo::Tempo;
use super::types::{
    Action, BarSignature, Duration, EventDefinition, ScheduledEvent, TempoMark, TimeLineBar,
    VarDef,
};
use super::TimeLine;

/// Upper bound on the number of expanded bars a timeline may declare.
pub const MAX_BARS: u32 = 100_000;

/// A rejected timeline mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineError {
    UnknownEvent(String),
    DuplicateEvent(String),
    DuplicateVariable(String),
    /// A resolved absolute time that is negative or not finite.
    InvalidTime(f64),
    /// A pickup measure declared after regular bars.
    PickupAfterBars,
    /// More than [`MAX_BARS`] bars once repeat counts are expanded.
    TooManyBars,
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineError::UnknownEvent(name) => write!(f, "event '{name}' not found"),
            TimelineError::DuplicateEvent(name) => write!(f, "event '{name}' already declared"),
            TimelineError::DuplicateVariable(name) => {
                write!(f, "variable '{name}' already declared")
            }
            TimelineError::InvalidTime(ms) => write!(f, "invalid event time: {ms}ms"),
            TimelineError::PickupAfterBars => {
                f.write_str("pickup bar must come before any other bar")
            }
            TimelineError::TooManyBars => write!(f, "more than {MAX_BARS} bars declared"),
        }
    }
}

impl std::error::Error for TimelineError {}

impl TimeLine {
    /// Recompute bar start offsets and, unless set explicitly, the duration.
    ///
    /// With `unbounded` the duration becomes [`Duration::Unbounded`]; the
    /// declared bars are still timed normally.
    pub(crate) fn calc_bar_durations(&mut self, unbounded: bool) {
        self.unbounded = unbounded;

        let mut starts = Vec::with_capacity(self.bar_count() as usize + 1);
        let mut t = self.pickup_duration_ms();
        let mut bar = 0;
        for segment in &self.bars {
            for _ in 0..segment.count {
                starts.push(t);
                t += self.bar_duration_ms(bar, segment.signature);
                bar += 1;
            }
        }
        starts.push(t);
        self.bar_starts = starts;

        if !self.explicit_duration {
            self.duration = if unbounded {
                Duration::Unbounded
            } else {
                Duration::Finite(t)
            };
        }
        debug!("bars: {bar}, total {t}ms, duration {}", self.duration);
    }

    /// Absolute time of `bar.beat` plus a fraction of that beat.
    ///
    /// Returns `None` when no bars are declared, when `bar` lies past the
    /// declared bars, or when `beat` is not a beat of that bar. The position
    /// right after the last bar (`bar == bar_count`, beat 0) is the end of the
    /// bars. On unbounded timelines the last signature repeats forever.
    pub fn find_bar_time(&self, bar: u32, beat: u32, beat_fraction: f64) -> Option<f64> {
        if self.bars.is_empty() {
            return None;
        }

        let declared = self.bar_count();
        let end = self.bar_starts.last().copied().unwrap_or(0.0);

        let (start, signature) = if bar < declared {
            (self.bar_starts[bar as usize], self.signature_of(bar)?)
        } else if self.unbounded {
            let last = self.bars.last()?.signature;
            (self.tail_bar_start(bar, last, end), last)
        } else if bar == declared && beat == 0 && beat_fraction == 0.0 {
            return Some(end);
        } else {
            return None;
        };

        if beat >= signature.numerator {
            return None;
        }

        let mut t = start;
        for b in 0..beat {
            t += self.beat_duration_ms(bar, b, signature.denominator);
        }
        t += beat_fraction * self.beat_duration_ms(bar, beat, signature.denominator);
        Some(t)
    }

    /// Every time `name` has been scheduled at so far, in time order.
    pub fn find_event_times(&self, name: &str) -> Vec<f64> {
        self.find_event(name)
            .map(|idx| self.schedule.times_of(idx))
            .unwrap_or_default()
    }

    /// Time of the latest scheduled occurrence.
    pub fn last_scheduled_time(&self) -> Option<f64> {
        self.schedule.latest().map(|e| e.time_ms)
    }

    /// Tempo in effect at `bar.beat`.
    pub fn tempo_at(&self, bar: u32, beat: u32) -> Tempo {
        self.tempo_marks
            .iter()
            .rev()
            .find(|m| m.position() <= (bar, beat))
            .map_or(self.default_tempo, |m| m.tempo)
    }

    /// Declare an event with no actions.
    pub(crate) fn add_event(&mut self, name: &str) -> Result<usize, TimelineError> {
        if self.event_names.contains_key(name) {
            return Err(TimelineError::DuplicateEvent(name.to_string()));
        }
        let idx = self.event_defs.len();
        self.event_defs.push(EventDefinition::new(name));
        self.event_names.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Append an action to a declared event.
    pub(crate) fn add_event_action(
        &mut self,
        name: &str,
        action: Action,
    ) -> Result<(), TimelineError> {
        let idx = self
            .find_event(name)
            .ok_or_else(|| TimelineError::UnknownEvent(name.to_string()))?;
        self.event_defs[idx].actions.push(action);
        Ok(())
    }

    /// Schedule an occurrence of `name` and return its absolute time.
    ///
    /// With `relative`, `time` is an offset from the latest occurrence in time;
    /// the very first occurrence is placed absolutely.
    pub(crate) fn add_event_at(
        &mut self,
        name: &str,
        time: f64,
        relative: bool,
    ) -> Result<f64, TimelineError> {
        let event_index = self
            .find_event(name)
            .ok_or_else(|| TimelineError::UnknownEvent(name.to_string()))?;

        let time_ms = match self.last_scheduled_time() {
            Some(last) if relative => last + time,
            _ => time,
        };
        if !time_ms.is_finite() || time_ms < 0.0 {
            return Err(TimelineError::InvalidTime(time_ms));
        }

        self.schedule.insert(ScheduledEvent {
            time_ms,
            event_index,
        });
        debug!("scheduled '{name}' at {time_ms}ms");
        Ok(time_ms)
    }

    /// Append bar segments, or with `unbounded` replace all bars with them.
    ///
    /// Nothing changes when the expanded total would exceed [`MAX_BARS`].
    pub(crate) fn declare_bars(
        &mut self,
        pickup: Option<BarSignature>,
        segments: &[TimeLineBar],
        unbounded: bool,
    ) -> Result<(), TimelineError> {
        let kept = if unbounded { 0 } else { self.bar_count() };
        segments
            .iter()
            .try_fold(kept, |total, s| total.checked_add(s.count))
            .filter(|&total| total <= MAX_BARS)
            .ok_or(TimelineError::TooManyBars)?;

        if unbounded {
            self.bars.clear();
            self.pickup = None;
        }
        if pickup.is_some() {
            if !self.bars.is_empty() || self.pickup.is_some() {
                return Err(TimelineError::PickupAfterBars);
            }
            self.pickup = pickup;
        }
        self.bars.extend_from_slice(segments);
        self.explicit_duration = false;
        self.calc_bar_durations(self.unbounded || unbounded);
        Ok(())
    }

    /// Set the tempo from `bar.beat` on, replacing a mark at the same position.
    pub(crate) fn set_tempo(&mut self, bar: u32, beat: u32, tempo: Tempo) {
        let mark = TempoMark { bar, beat, tempo };
        match self
            .tempo_marks
            .binary_search_by(|m| m.position().cmp(&mark.position()))
        {
            Ok(i) => self.tempo_marks[i] = mark,
            Err(i) => self.tempo_marks.insert(i, mark),
        }
        self.calc_bar_durations(self.unbounded);
    }

    /// Set the duration directly; it sticks until bars are redeclared.
    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
        self.explicit_duration = true;
    }

    pub(crate) fn add_var(&mut self, var: VarDef) -> Result<(), TimelineError> {
        if self.find_var(&var.name).is_some() {
            return Err(TimelineError::DuplicateVariable(var.name));
        }
        self.var_defs.push(var);
        Ok(())
    }

    fn signature_of(&self, bar: u32) -> Option<BarSignature> {
        let mut first: u32 = 0;
        for segment in &self.bars {
            first = first.saturating_add(segment.count);
            if bar < first {
                return Some(segment.signature);
            }
        }
        None
    }

    fn beat_duration_ms(&self, bar: u32, beat: u32, denominator: u32) -> f64 {
        self.tempo_at(bar, beat).signature_beat_ms(denominator)
    }

    fn bar_duration_ms(&self, bar: u32, signature: BarSignature) -> f64 {
        (0..signature.numerator)
            .map(|beat| self.beat_duration_ms(bar, beat, signature.denominator))
            .sum()
    }

    fn pickup_duration_ms(&self) -> f64 {
        self.pickup.map_or(0.0, |sig| {
            f64::from(sig.numerator) * self.tempo_at(0, 0).signature_beat_ms(sig.denominator)
        })
    }

    /// Start of a bar in the repeating tail of an unbounded timeline.
    ///
    /// Only bars holding a tempo mark are timed individually. A run of bars
    /// without marks all share the length of its first bar.
    fn tail_bar_start(&self, bar: u32, signature: BarSignature, end: f64) -> f64 {
        let mut t = end;
        let mut b = self.bar_count();
        for marked in self.tempo_marks.iter().map(|m| m.bar) {
            if marked >= bar {
                break;
            }
            if marked < b {
                continue;
            }
            t += f64::from(marked - b) * self.bar_duration_ms(b, signature);
            t += self.bar_duration_ms(marked, signature);
            b = marked + 1;
        }
        if b < bar {
            t += f64::from(bar - b) * self.bar_duration_ms(b, signature);
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tempo::BeatUnit;
    use assert_approx_eq::assert_approx_eq;

    fn sig(num: u32, den: u32) -> BarSignature {
        BarSignature::new(num, den).unwrap()
    }

    fn bars(count: u32, num: u32, den: u32) -> TimeLineBar {
        TimeLineBar {
            count,
            signature: sig(num, den),
        }
    }

    fn bpm(value: f64) -> Tempo {
        Tempo::new(value, BeatUnit::QUARTER).unwrap()
    }

    fn timeline_120(segments: &[TimeLineBar]) -> TimeLine {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, segments, false).unwrap();
        tl.set_tempo(0, 0, bpm(120.0));
        tl
    }

    #[test]
    fn second_bar_starts_after_four_beats_at_120() {
        let tl = timeline_120(&[bars(2, 4, 4)]);
        assert_approx_eq!(tl.find_bar_time(0, 0, 0.0).unwrap(), 0.0);
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 2000.0);
        assert_eq!(tl.duration(), Duration::Finite(4000.0));
    }

    #[test]
    fn end_of_last_bar_is_addressable() {
        let tl = timeline_120(&[bars(1, 4, 4)]);
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 2000.0);
        assert!(tl.find_bar_time(1, 1, 0.0).is_none());
        assert!(tl.find_bar_time(2, 0, 0.0).is_none());
    }

    #[test]
    fn beats_and_fractions() {
        let tl = timeline_120(&[bars(1, 4, 4)]);
        assert_approx_eq!(tl.find_bar_time(0, 2, 0.0).unwrap(), 1000.0);
        assert_approx_eq!(tl.find_bar_time(0, 2, 0.5).unwrap(), 1250.0);
        assert!(tl.find_bar_time(0, 4, 0.0).is_none());
    }

    #[test]
    fn no_bars_means_no_positions() {
        let mut tl = TimeLine::new();
        tl.set_tempo(0, 0, bpm(120.0));
        assert!(tl.find_bar_time(0, 0, 0.0).is_none());
    }

    #[test]
    fn mixed_signatures() {
        // 1 bar 3/4 (1500ms) then 2 bars 6/8 (6 × 250ms each)
        let tl = timeline_120(&[bars(1, 3, 4), bars(2, 6, 8)]);
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 1500.0);
        assert_approx_eq!(tl.find_bar_time(2, 0, 0.0).unwrap(), 3000.0);
        assert_approx_eq!(tl.find_bar_time(2, 3, 0.0).unwrap(), 3750.0);
        assert_eq!(tl.duration(), Duration::Finite(4500.0));
    }

    #[test]
    fn default_tempo_is_sixty() {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, &[bars(2, 4, 4)], false).unwrap();
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 4000.0);
    }

    #[test]
    fn later_tempo_mark_leaves_earlier_bars_alone() {
        let mut tl = timeline_120(&[bars(3, 4, 4)]);
        tl.set_tempo(2, 0, bpm(60.0));
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 2000.0);
        assert_approx_eq!(tl.find_bar_time(2, 0, 0.0).unwrap(), 4000.0);
        assert_approx_eq!(tl.find_bar_time(2, 1, 0.0).unwrap(), 5000.0);
        assert_eq!(tl.duration(), Duration::Finite(8000.0));
    }

    #[test]
    fn mid_bar_tempo_change_applies_from_its_beat() {
        let mut tl = timeline_120(&[bars(2, 4, 4)]);
        tl.set_tempo(0, 2, bpm(60.0));
        // beats 0-1 at 500ms, beats 2-3 at 1000ms
        assert_approx_eq!(tl.find_bar_time(0, 3, 0.0).unwrap(), 2000.0);
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 3000.0);
    }

    #[test]
    fn tempo_mark_at_same_position_is_replaced() {
        let mut tl = timeline_120(&[bars(1, 4, 4)]);
        tl.set_tempo(0, 0, bpm(240.0));
        assert_eq!(tl.tempo_marks().len(), 1);
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 1000.0);
    }

    #[test]
    fn tempo_marks_stay_sorted() {
        let mut tl = TimeLine::new();
        tl.set_tempo(4, 0, bpm(90.0));
        tl.set_tempo(0, 0, bpm(120.0));
        tl.set_tempo(2, 1, bpm(100.0));
        let positions: Vec<(u32, u32)> = tl.tempo_marks().iter().map(|m| m.position()).collect();
        assert_eq!(positions, vec![(0, 0), (2, 1), (4, 0)]);
    }

    #[test]
    fn pickup_shifts_bar_zero() {
        let mut tl = TimeLine::new();
        tl.declare_bars(Some(sig(1, 4)), &[bars(1, 4, 4)], false)
            .unwrap();
        tl.set_tempo(0, 0, bpm(120.0));
        assert_approx_eq!(tl.find_bar_time(0, 0, 0.0).unwrap(), 500.0);
        assert_eq!(tl.duration(), Duration::Finite(2500.0));
    }

    #[test]
    fn empty_pickup_takes_no_time() {
        let mut tl = TimeLine::new();
        tl.declare_bars(Some(sig(0, 4)), &[bars(1, 4, 4)], false)
            .unwrap();
        assert_approx_eq!(tl.find_bar_time(0, 0, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn pickup_after_bars_is_rejected() {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, &[bars(1, 4, 4)], false).unwrap();
        assert_eq!(
            tl.declare_bars(Some(sig(1, 4)), &[], false),
            Err(TimelineError::PickupAfterBars)
        );
    }

    #[test]
    fn unbounded_repeats_last_signature() {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, &[bars(1, 4, 4), bars(1, 3, 4)], true)
            .unwrap();
        tl.set_tempo(0, 0, bpm(120.0));
        assert_eq!(tl.duration(), Duration::Unbounded);
        assert_approx_eq!(tl.find_bar_time(1, 0, 0.0).unwrap(), 2000.0);
        assert_approx_eq!(tl.find_bar_time(2, 0, 0.0).unwrap(), 3500.0);
        assert_approx_eq!(tl.find_bar_time(10, 1, 0.0).unwrap(), 2000.0 + 9.0 * 1500.0 + 500.0);
    }

    #[test]
    fn unbounded_tail_honours_later_tempo_marks() {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, &[bars(1, 4, 4)], true).unwrap();
        tl.set_tempo(0, 0, bpm(120.0));
        tl.set_tempo(3, 0, bpm(60.0));
        // bars 0-2 at 2000ms, bar 3 onwards at 4000ms
        assert_approx_eq!(tl.find_bar_time(3, 0, 0.0).unwrap(), 6000.0);
        assert_approx_eq!(tl.find_bar_time(5, 0, 0.0).unwrap(), 14000.0);
    }

    #[test]
    fn tempo_mark_on_last_addressable_bar() {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, &[bars(1, 4, 4)], true).unwrap();
        tl.set_tempo(u32::MAX, 0, bpm(120.0));
        assert_approx_eq!(tl.find_bar_time(3, 0, 0.0).unwrap(), 12000.0);
        assert_eq!(
            tl.find_bar_time(u32::MAX, 0, 0.0),
            Some(f64::from(u32::MAX) * 4000.0)
        );
        assert_eq!(
            tl.find_bar_time(u32::MAX, 1, 0.0),
            Some(f64::from(u32::MAX) * 4000.0 + 500.0)
        );
    }

    #[test]
    fn far_tail_lookups_skip_unmarked_bars() {
        let mut tl = TimeLine::new();
        tl.declare_bars(None, &[bars(1, 4, 4)], true).unwrap();
        tl.set_tempo(3_000_000_000, 0, bpm(120.0));
        tl.set_tempo(3_000_000_000, 2, bpm(60.0));
        // 4000ms bars up to the mark, then 2 × 500 + 2 × 1000 in the marked bar
        let marked = 3_000_000_000.0 * 4000.0;
        assert_eq!(tl.find_bar_time(3_000_000_000, 0, 0.0), Some(marked));
        assert_eq!(
            tl.find_bar_time(3_000_000_000, 3, 0.0),
            Some(marked + 2000.0)
        );
        assert_eq!(
            tl.find_bar_time(3_000_000_002, 0, 0.0),
            Some(marked + 3000.0 + 4000.0)
        );
    }

    #[test]
    fn oversized_bar_declarations_are_rejected() {
        let mut tl = timeline_120(&[bars(2, 4, 4)]);
        assert_eq!(
            tl.declare_bars(
                None,
                &[bars(3_000_000_000, 1, 4), bars(3_000_000_000, 1, 4)],
                false
            ),
            Err(TimelineError::TooManyBars)
        );
        assert_eq!(
            tl.declare_bars(None, &[bars(u32::MAX, 1, 4)], false),
            Err(TimelineError::TooManyBars)
        );
        assert_eq!(
            tl.declare_bars(None, &[bars(MAX_BARS - 1, 1, 4)], false),
            Err(TimelineError::TooManyBars)
        );
        assert_eq!(tl.bars(), &[bars(2, 4, 4)]);
        assert_eq!(tl.duration(), Duration::Finite(4000.0));

        // replacing the bars only counts the new ones
        tl.declare_bars(None, &[bars(MAX_BARS, 1, 4)], true).unwrap();
        assert_eq!(tl.bar_count(), MAX_BARS);
    }

    #[test]
    fn unbounded_clears_previous_bars() {
        let mut tl = TimeLine::new();
        tl.declare_bars(Some(sig(2, 4)), &[bars(8, 4, 4)], false)
            .unwrap();
        tl.declare_bars(None, &[bars(1, 3, 4)], true).unwrap();
        assert_eq!(tl.bars(), &[bars(1, 3, 4)]);
        assert!(tl.pickup().is_none());
    }

    #[test]
    fn explicit_duration_survives_tempo_changes() {
        let mut tl = timeline_120(&[bars(1, 4, 4)]);
        tl.set_duration(Duration::Finite(10_000.0));
        tl.set_tempo(0, 0, bpm(60.0));
        assert_eq!(tl.duration(), Duration::Finite(10_000.0));

        tl.declare_bars(None, &[bars(1, 4, 4)], false).unwrap();
        assert_eq!(tl.duration(), Duration::Finite(8000.0));
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let mut tl = TimeLine::new();
        assert_eq!(tl.add_event("a"), Ok(0));
        assert_eq!(
            tl.add_event("a"),
            Err(TimelineError::DuplicateEvent("a".into()))
        );
        tl.add_var(VarDef::new("x")).unwrap();
        assert_eq!(
            tl.add_var(VarDef::new("x")),
            Err(TimelineError::DuplicateVariable("x".into()))
        );
    }

    #[test]
    fn add_event_at_requires_declared_name() {
        let mut tl = TimeLine::new();
        assert_eq!(
            tl.add_event_at("nosuch", 0.0, false),
            Err(TimelineError::UnknownEvent("nosuch".into()))
        );
        assert!(tl.events().is_empty());
    }

    #[test]
    fn relative_placement_uses_most_recent() {
        let mut tl = TimeLine::new();
        tl.add_event("a").unwrap();
        // first occurrence is absolute even when relative
        assert_eq!(tl.add_event_at("a", 300.0, true), Ok(300.0));
        assert_eq!(tl.add_event_at("a", 100.0, false), Ok(100.0));
        assert_eq!(tl.add_event_at("a", 50.0, true), Ok(350.0));
        assert_eq!(tl.find_event_times("a"), vec![100.0, 300.0, 350.0]);
    }

    #[test]
    fn negative_times_are_rejected() {
        let mut tl = TimeLine::new();
        tl.add_event("a").unwrap();
        tl.add_event_at("a", 100.0, false).unwrap();
        assert_eq!(
            tl.add_event_at("a", -200.0, true),
            Err(TimelineError::InvalidTime(-100.0))
        );
        assert_eq!(tl.events().len(), 1);
    }

    #[test]
    fn actions_accumulate_in_order() {
        let mut tl = TimeLine::new();
        tl.add_event("a").unwrap();
        tl.add_event_action("a", Action::Preset { index: 1 }).unwrap();
        tl.add_event_action("a", Action::Out { args: vec![] }).unwrap();
        assert_eq!(
            tl.event_defs()[0].actions,
            vec![Action::Preset { index: 1 }, Action::Out { args: vec![] }]
        );
        assert_eq!(
            tl.add_event_action("b", Action::Preset { index: 0 }),
            Err(TimelineError::UnknownEvent("b".into()))
        );
    }
}
