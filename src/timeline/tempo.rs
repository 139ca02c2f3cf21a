//! Tempo math: converts BPM and beat units into millisecond durations.
//!
//! A tempo is a BPM value bound to a beat unit (a fraction of a whole note,
//! optionally dotted). Everything the resolution engine needs is derived from
//! the whole-note duration: a beat of a `N/D` bar lasts `whole_note_ms / D`.

use std::fmt;

/// BPM used when no tempo mark covers a position (1/4 = 60).
pub const DEFAULT_BPM: f64 = 60.0;

/// Milliseconds in one minute.
const MS_PER_MINUTE: f64 = 60_000.0;

/// The note value one tempo beat refers to, e.g. `1/4` or a dotted `1/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatUnit {
    pub numerator: u32,
    pub denominator: u32,
    pub dots: u32,
}

impl BeatUnit {
    /// A quarter note.
    pub const QUARTER: BeatUnit = BeatUnit {
        numerator: 1,
        denominator: 4,
        dots: 0,
    };

    /// Create a beat unit; `None` when either part is zero.
    pub fn new(numerator: u32, denominator: u32, dots: u32) -> Option<Self> {
        if numerator == 0 || denominator == 0 {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
            dots,
        })
    }

    /// Length of the unit as a fraction of a whole note, dots applied.
    ///
    /// One dot adds half the value, two dots add three quarters, and so on.
    pub fn fraction(self) -> f64 {
        let base = f64::from(self.numerator) / f64::from(self.denominator);
        let dotted = 2.0 - 0.5_f64.powi(self.dots as i32);
        base * dotted
    }
}

impl Default for BeatUnit {
    fn default() -> Self {
        Self::QUARTER
    }
}

impl fmt::Display for BeatUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)?;
        for _ in 0..self.dots {
            f.write_str(".")?;
        }
        Ok(())
    }
}

/// A BPM value together with the beat unit it counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    pub bpm: f64,
    pub beat_unit: BeatUnit,
}

impl Tempo {
    /// Create a tempo; `None` unless `bpm` is finite and positive.
    pub fn new(bpm: f64, beat_unit: BeatUnit) -> Option<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return None;
        }
        Some(Self { bpm, beat_unit })
    }

    /// Duration of one tempo beat in milliseconds.
    pub fn beat_ms(self) -> f64 {
        MS_PER_MINUTE / self.bpm
    }

    /// Duration of a whole note in milliseconds.
    pub fn whole_note_ms(self) -> f64 {
        self.beat_ms() / self.beat_unit.fraction()
    }

    /// Duration of one beat of a bar whose signature denominator is `denominator`.
    pub fn signature_beat_ms(self, denominator: u32) -> f64 {
        self.whole_note_ms() / f64::from(denominator)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beat_unit: BeatUnit::QUARTER,
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}bpm", self.bpm, self.beat_unit)
    }
}
