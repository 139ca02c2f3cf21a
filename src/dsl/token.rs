//! Lexeme types produced by the scanner.

use std::fmt;

/// A decimal literal kept exactly: `int + sign * num / den`.
///
/// The sign is carried separately so that `-0.5` keeps its sign even though
/// its integer part is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub int: i64,
    pub sign: i8,
    pub num: u64,
    pub den: u64,
}

impl Decimal {
    pub fn integer(value: i64) -> Self {
        Self {
            int: value,
            sign: if value < 0 { -1 } else { 1 },
            num: 0,
            den: 1,
        }
    }

    pub fn to_f64(self) -> f64 {
        self.int as f64 + f64::from(self.sign) * self.num as f64 / self.den as f64
    }
}

/// Unit suffix of a plain time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    #[default]
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl TimeUnit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "ms" => Some(TimeUnit::Millisecond),
            "s" | "sec" => Some(TimeUnit::Second),
            "m" | "min" => Some(TimeUnit::Minute),
            "h" | "hour" => Some(TimeUnit::Hour),
            _ => None,
        }
    }

    pub fn factor_ms(self) -> f64 {
        match self {
            TimeUnit::Millisecond => 1.0,
            TimeUnit::Second => 1_000.0,
            TimeUnit::Minute => 60_000.0,
            TimeUnit::Hour => 3_600_000.0,
        }
    }
}

/// `[+-]HH:MM:SS[.FF]` timecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smpte {
    pub negative: bool,
    pub hour: u32,
    pub min: u32,
    pub sec: u32,
    pub frame: u32,
}

impl Smpte {
    /// Milliseconds at the given frame rate; the sign applies to every field.
    pub fn to_ms(self, fps: f64) -> f64 {
        let secs = f64::from(self.hour) * 3600.0 + f64::from(self.min) * 60.0 + f64::from(self.sec);
        let ms = secs * 1000.0 + f64::from(self.frame) * 1000.0 / fps;
        if self.negative {
            -ms
        } else {
            ms
        }
    }
}

/// A time literal that does not depend on the timeline state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    Plain { value: Decimal, unit: TimeUnit },
    Smpte(Smpte),
}

impl TimeValue {
    pub fn to_ms(self, fps: f64) -> f64 {
        match self {
            TimeValue::Plain { value, unit } => value.to_f64() * unit.factor_ms(),
            TimeValue::Smpte(tc) => tc.to_ms(fps),
        }
    }
}

/// `#BAR[.BEAT[.FRAC]]`; `FRAC` digits give `frac_num / frac_den` of a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarPos {
    pub bar: u32,
    pub beat: u32,
    pub frac_num: u64,
    pub frac_den: u64,
}

impl BarPos {
    pub fn fraction(self) -> f64 {
        self.frac_num as f64 / self.frac_den as f64
    }
}

impl fmt::Display for BarPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.bar, self.beat)?;
        if self.frac_num > 0 {
            write!(f, "+{}/{}", self.frac_num, self.frac_den)?;
        }
        Ok(())
    }
}

/// What a `#...` reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    Bar(BarPos),
    Event(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn decimal_keeps_sign_of_fraction() {
        let d = Decimal {
            int: 0,
            sign: -1,
            num: 5,
            den: 10,
        };
        assert_approx_eq!(d.to_f64(), -0.5);

        let d = Decimal {
            int: -2,
            sign: -1,
            num: 25,
            den: 100,
        };
        assert_approx_eq!(d.to_f64(), -2.25);
        assert_approx_eq!(Decimal::integer(7).to_f64(), 7.0);
    }

    #[test]
    fn unit_suffixes() {
        assert_eq!(TimeUnit::from_suffix("sec"), Some(TimeUnit::Second));
        assert_eq!(TimeUnit::from_suffix("m"), Some(TimeUnit::Minute));
        assert_eq!(TimeUnit::from_suffix("hour"), Some(TimeUnit::Hour));
        assert_eq!(TimeUnit::from_suffix("bpm"), None);
    }

    #[test]
    fn smpte_to_ms() {
        let tc = Smpte {
            negative: false,
            hour: 1,
            min: 2,
            sec: 3,
            frame: 0,
        };
        assert_approx_eq!(tc.to_ms(25.0), 3_723_000.0);

        let tc = Smpte {
            negative: true,
            hour: 0,
            min: 0,
            sec: 1,
            frame: 5,
        };
        assert_approx_eq!(tc.to_ms(25.0), -1200.0);
    }

    #[test]
    fn plain_values_scale_by_unit() {
        let v = TimeValue::Plain {
            value: Decimal {
                int: 1,
                sign: 1,
                num: 5,
                den: 10,
            },
            unit: TimeUnit::Second,
        };
        assert_approx_eq!(v.to_ms(25.0), 1500.0);
    }
}
