//! TimeLine: the compiled, time-resolved result of a TDL source.
//!
//! A [`TimeLine`] owns the declared bars and tempo map, the event definitions
//! with their actions, the variables, and the [`Schedule`] of occurrences.
//! The parser builds it statement by statement through the resolution engine
//! in [`resolve`]; once handed out it is read-only.
//!
//! Playback is not part of this crate: a consumer walks [`TimeLine::events`]
//! (or windows of it via [`TimeLine::events_between`]) and runs each
//! occurrence's actions.

pub mod resolve;
pub mod schedule;
pub mod tempo;
pub mod types;

pub use resolve::{TimelineError, MAX_BARS};
pub use schedule::Schedule;
pub use tempo::{BeatUnit, Tempo, DEFAULT_BPM};
pub use types::{
    Action, BarSignature, Duration, EventDefinition, ScheduledEvent, TempoMark, TimeLineBar,
    Value, VarDef, SIGNATURE_DENOMINATORS,
};

use std::collections::HashMap;
use std::fmt;

/// The compiled timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeLine {
    bars: Vec<TimeLineBar>,
    pickup: Option<BarSignature>,
    tempo_marks: Vec<TempoMark>,
    event_defs: Vec<EventDefinition>,
    event_names: HashMap<String, usize>,
    var_defs: Vec<VarDef>,
    schedule: Schedule,
    duration: Duration,
    /// Set by a `duration` statement; cleared when bars are redeclared.
    explicit_duration: bool,
    unbounded: bool,
    default_tempo: Tempo,
    /// Start of every expanded bar, followed by the end of the last one.
    bar_starts: Vec<f64>,
}

impl TimeLine {
    /// Create an empty timeline that uses `1/4 = 60` where no tempo is set.
    pub fn new() -> Self {
        Self::with_default_tempo(Tempo::default())
    }

    /// Create an empty timeline with a custom fallback tempo.
    pub fn with_default_tempo(default_tempo: Tempo) -> Self {
        Self {
            bars: Vec::new(),
            pickup: None,
            tempo_marks: Vec::new(),
            event_defs: Vec::new(),
            event_names: HashMap::new(),
            var_defs: Vec::new(),
            schedule: Schedule::new(),
            duration: Duration::default(),
            explicit_duration: false,
            unbounded: false,
            default_tempo,
            bar_starts: vec![0.0],
        }
    }

    /// Declared bar segments, in order.
    pub fn bars(&self) -> &[TimeLineBar] {
        &self.bars
    }

    /// Pickup measure played before bar 0, if declared.
    pub fn pickup(&self) -> Option<BarSignature> {
        self.pickup
    }

    /// Tempo marks sorted by position.
    pub fn tempo_marks(&self) -> &[TempoMark] {
        &self.tempo_marks
    }

    pub fn event_defs(&self) -> &[EventDefinition] {
        &self.event_defs
    }

    pub fn var_defs(&self) -> &[VarDef] {
        &self.var_defs
    }

    /// All occurrences in time order.
    pub fn events(&self) -> &[ScheduledEvent] {
        self.schedule.as_slice()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Index of the event definition with the given name.
    pub fn find_event(&self, name: &str) -> Option<usize> {
        self.event_names.get(name).copied()
    }

    /// Definition referenced by an occurrence.
    pub fn definition_of(&self, event: &ScheduledEvent) -> Option<&EventDefinition> {
        self.event_defs.get(event.event_index)
    }

    pub fn find_var(&self, name: &str) -> Option<&VarDef> {
        self.var_defs.iter().find(|v| v.name == name)
    }

    /// Occurrences in `[from_ms, to_ms)` paired with their definitions.
    pub fn events_between(
        &self,
        from_ms: f64,
        to_ms: f64,
    ) -> impl Iterator<Item = (&ScheduledEvent, &EventDefinition)> + '_ {
        self.schedule
            .between(from_ms, to_ms)
            .iter()
            .filter_map(|e| self.event_defs.get(e.event_index).map(|def| (e, def)))
    }

    /// Number of bars after expanding repeat counts.
    pub fn bar_count(&self) -> u32 {
        self.bars
            .iter()
            .fold(0u32, |n, b| n.saturating_add(b.count))
    }

    /// Whether the last bar segment repeats forever.
    pub fn is_unbounded(&self) -> bool {
        self.unbounded
    }
}

impl Default for TimeLine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bars:")?;
        if let Some(pickup) = self.pickup {
            writeln!(f, " - pickup {pickup}")?;
        }
        let mut index = 0;
        for bar in &self.bars {
            let start = self.bar_starts.get(index as usize).copied().unwrap_or(0.0);
            writeln!(f, " - #{index}: {}*{} ({start}ms)", bar.count, bar.signature)?;
            index += bar.count;
        }
        if self.unbounded {
            writeln!(f, " - ... repeats")?;
        }

        writeln!(f, "bpm:")?;
        for mark in &self.tempo_marks {
            writeln!(f, " - {}.{}: {}", mark.bar, mark.beat, mark.tempo)?;
        }

        writeln!(f, "def events:")?;
        for def in &self.event_defs {
            if def.actions.is_empty() {
                writeln!(f, " - {:>12}:", def.name)?;
            }
            for action in &def.actions {
                writeln!(f, " - {:>12}: {action}", def.name)?;
            }
        }

        writeln!(f, "vars:")?;
        for var in &self.var_defs {
            writeln!(
                f,
                " - {}: @default {} @preset {}",
                var.name, var.default, var.preset
            )?;
        }

        writeln!(f, "timeline:")?;
        for event in self.events() {
            let name = self
                .definition_of(event)
                .map_or("?", |def| def.name.as_str());
            writeln!(
                f,
                " - {:>10}ms: '{name}'[{}]",
                event.time_ms, event.event_index
            )?;
        }

        write!(f, "duration: {}", self.duration)
    }
}
