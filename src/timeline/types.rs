//! TimeLine data model: bars, tempo marks, event definitions and variables.
//!
//! These are the value types a compiled [`TimeLine`](super::TimeLine) is made
//! of. An [`EventDefinition`] bundles the [`Action`]s that a playback consumer
//! runs each time a [`ScheduledEvent`] referencing it comes due.

use std::fmt;

use super::tempo::Tempo;

/// Denominators a bar signature may use.
pub const SIGNATURE_DENOMINATORS: [u32; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// A time signature such as `3/4` or `7/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl BarSignature {
    /// Create a signature; `None` unless the denominator is a supported power of two.
    pub fn new(numerator: u32, denominator: u32) -> Option<Self> {
        if !Self::is_valid_denominator(denominator) {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    pub fn is_valid_denominator(denominator: u32) -> bool {
        SIGNATURE_DENOMINATORS.contains(&denominator)
    }
}

impl fmt::Display for BarSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// One declared bar segment: `count` consecutive bars sharing a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLineBar {
    pub count: u32,
    pub signature: BarSignature,
}

/// A tempo anchored at a bar.beat position, effective from there on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoMark {
    pub bar: u32,
    pub beat: u32,
    pub tempo: Tempo,
}

impl TempoMark {
    /// Position key used to keep marks ordered.
    pub fn position(&self) -> (u32, u32) {
        (self.bar, self.beat)
    }
}

/// An action argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Symbol(String),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Symbol(s) => f.write_str(s),
            Value::Str(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    if ch == '"' || ch == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// Something an event does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send `args` to the named receiver on the message bus.
    Send { target: String, args: Vec<Value> },
    /// Emit `args` on the primary output.
    Out { args: Vec<Value> },
    /// Recall the stored preset `index`.
    Preset { index: u32 },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send { target, args } => {
                write!(f, "!send {target}")?;
                write_args(f, args)
            }
            Action::Out { args } => {
                f.write_str("!out")?;
                write_args(f, args)
            }
            Action::Preset { index } => write!(f, "!preset {index}"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Value]) -> fmt::Result {
    for arg in args {
        write!(f, " {arg}")?;
    }
    Ok(())
}

/// A named bundle of actions.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub name: String,
    pub actions: Vec<Action>,
}

impl EventDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }
}

/// One concrete occurrence of an event definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    /// Absolute time from the start of the timeline.
    pub time_ms: f64,
    /// Index into the timeline's event definitions.
    pub event_index: usize,
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub default: f64,
    pub preset: f64,
}

impl VarDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: 0.0,
            preset: 0.0,
        }
    }
}

/// Total length of a timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Duration {
    Finite(f64),
    /// The bars repeat forever.
    Unbounded,
}

impl Duration {
    pub fn is_unbounded(self) -> bool {
        matches!(self, Duration::Unbounded)
    }

    /// Length in milliseconds; `f64::INFINITY` when unbounded.
    pub fn as_ms(self) -> f64 {
        match self {
            Duration::Finite(ms) => ms,
            Duration::Unbounded => f64::INFINITY,
        }
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::Finite(0.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Duration::Finite(ms) => write!(f, "{ms}ms"),
            Duration::Unbounded => f.write_str("inf"),
        }
    }
}
