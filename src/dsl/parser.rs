//! Statement parser for TDL.
//!
//! Single pass, one statement per line. The first lexeme of a line picks the
//! statement form; each recognized statement is applied to the [`TimeLine`]
//! right away, so later statements see the bars, tempo marks and occurrences
//! declared before them. The first error stops the parse.

use log::{debug, warn};

use super::error::CompileError;
use super::scanner::Scanner;
use super::token::{BarPos, Position, TimeValue};
use crate::timeline::{
    Action, BarSignature, BeatUnit, Duration, Tempo, TimeLine, TimeLineBar, TimelineError, VarDef,
};

/// Words that cannot name events or variables.
const RESERVED: &[&str] = &[
    "bar", "bpm", "duration", "event", "inf", "out", "preset", "send", "tempo", "var",
];

const ACTIONS: &[&str] = &["out", "send", "preset"];

/// Knobs that change how a source is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// Frame rate used to fold SMPTE frames into milliseconds.
    pub smpte_fps: f64,
    /// When false, bar positions that do not exist and `#NAME` references
    /// without occurrences are skipped with a warning instead of failing.
    pub strict: bool,
    /// Tempo used where no tempo mark applies.
    pub default_tempo: Tempo,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            smpte_fps: 25.0,
            strict: true,
            default_tempo: Tempo::default(),
        }
    }
}

/// When a scheduling statement fires.
enum When {
    At(f64),
    Bar { pos: BarPos, offset: f64 },
    After { event: String, offset: f64 },
    Relative(f64),
}

/// What a scheduling statement fires.
enum Target {
    Named(String),
    Action(Action),
    Empty,
}

enum Resolved {
    Absolute(Vec<f64>),
    Relative(f64),
    Missing(String),
}

pub struct Parser {
    scanner: Scanner,
    options: ParseOptions,
    timeline: TimeLine,
    anon_count: usize,
    // start of the current statement
    line: usize,
    col: usize,
}

impl Parser {
    pub fn new(source: &str, options: ParseOptions) -> Self {
        let timeline = TimeLine::with_default_tempo(options.default_tempo);
        Self {
            scanner: Scanner::new(source),
            options,
            timeline,
            anon_count: 0,
            line: 1,
            col: 1,
        }
    }

    /// Parse every statement, stopping at the first error.
    pub fn parse(&mut self) -> Result<(), CompileError> {
        if self.scanner.is_at_end() {
            return Err(CompileError::grammar("empty source", 1, 1));
        }

        loop {
            self.scanner.skip_empty_lines();
            if self.scanner.is_at_end() {
                break;
            }
            self.statement()?;
        }
        Ok(())
    }

    /// The timeline as built so far.
    pub fn into_timeline(self) -> TimeLine {
        self.timeline
    }

    fn statement(&mut self) -> Result<(), CompileError> {
        (self.line, self.col) = self.scanner.position();

        match self.scanner.peek() {
            Some('#' | '+' | '-') => self.schedule_statement(),
            Some(ch) if ch.is_ascii_digit() => self.schedule_statement(),
            Some('!') => {
                self.scanner.advance();
                let name = self.scanner.expect_word("event name")?;
                self.attach_statement(name)
            }
            Some(_) if self.scanner.at_word() => {
                let word = self.scanner.expect_word("statement")?;
                match word.as_str() {
                    "bar" => self.bar_statement(),
                    "tempo" | "bpm" => self.tempo_statement(),
                    "duration" => self.duration_statement(),
                    "event" => self.event_statement(),
                    "var" => self.var_statement(),
                    _ => self.attach_statement(word),
                }
            }
            Some(ch) => Err(CompileError::lex(
                format!("unexpected character: '{ch}'"),
                self.line,
                self.col,
            )),
            None => Ok(()),
        }
    }

    // bar [inf|*] [#NUM/DEN] ([|] [COUNT*]NUM/DEN)* [|]
    fn bar_statement(&mut self) -> Result<(), CompileError> {
        self.scanner.skip_blank();
        let mut unbounded = false;
        if self.scanner.eat('*') {
            unbounded = true;
        } else if self.scanner.at_word() {
            let word = self.scanner.expect_word("'inf'")?;
            if word != "inf" {
                return Err(self.grammar(format!("unexpected '{word}' in bar declaration")));
            }
            unbounded = true;
        }

        let mut pickup = None;
        let mut segments = Vec::new();
        let mut first = true;
        while !self.scanner.at_line_end() {
            if self.scanner.eat('|') {
                continue;
            }
            let (line, col) = self.scanner.position();
            if self.scanner.eat('#') {
                if !first {
                    return Err(CompileError::grammar(
                        "pickup must be the first item of a bar declaration",
                        line,
                        col,
                    ));
                }
                let (num, den) = self.signature_parts()?;
                pickup = Some(signature(num, den, line, col)?);
            } else {
                let n = self.scanner.scan_uint("bar signature")?;
                let (count, num) = if self.scanner.eat('*') {
                    (n, self.scanner.scan_uint("bar numerator")?)
                } else {
                    (1, n)
                };
                self.scanner.expect('/')?;
                let den = self.scanner.scan_uint("bar denominator")?;
                if count == 0 {
                    return Err(CompileError::semantic("bar count must be at least 1", line, col));
                }
                if num == 0 {
                    return Err(CompileError::semantic(
                        "bar numerator must be at least 1",
                        line,
                        col,
                    ));
                }
                segments.push(TimeLineBar {
                    count,
                    signature: signature(num, den, line, col)?,
                });
            }
            first = false;
        }
        self.scanner.end_line()?;

        if pickup.is_none() && segments.is_empty() {
            return Err(self.grammar("bar declaration without a signature".to_string()));
        }

        debug!(
            "line {}: bar{} pickup {:?} segments {:?}",
            self.line,
            if unbounded { " inf" } else { "" },
            pickup,
            segments
        );
        self.timeline
            .declare_bars(pickup, &segments, unbounded)
            .map_err(|e| self.semantic(e))
    }

    fn signature_parts(&mut self) -> Result<(u32, u32), CompileError> {
        let num = self.scanner.scan_uint("bar numerator")?;
        self.scanner.expect('/')?;
        let den = self.scanner.scan_uint("bar denominator")?;
        Ok((num, den))
    }

    // tempo #BAR[.BEAT] BPM[.FRAC][|DEN[.]*|NUM/DEN[.]*][[_]bpm]
    fn tempo_statement(&mut self) -> Result<(), CompileError> {
        self.scanner.skip_blank();
        self.scanner.expect('#')?;
        let bar = self.scanner.scan_uint("bar number")?;
        let beat = if self.scanner.eat('.') {
            self.scanner.scan_uint("beat number")?
        } else {
            0
        };

        self.scanner.skip_blank();
        let (line, col) = self.scanner.position();
        let bpm = self.scanner.scan_decimal()?.to_f64();

        let mut unit = (1, 4, 0);
        if self.scanner.eat('|') {
            let n = self.scanner.scan_uint("beat unit")?;
            unit = if self.scanner.eat('/') {
                (n, self.scanner.scan_uint("beat unit denominator")?, 0)
            } else {
                (1, n, 0)
            };
            while self.scanner.eat('.') {
                unit.2 += 1;
            }
        }

        self.scanner.skip_blank();
        self.scanner.eat('_');
        if self.scanner.at_word() {
            let word = self.scanner.expect_word("'bpm'")?;
            if word != "bpm" {
                return Err(self.grammar(format!("unexpected '{word}' after tempo")));
            }
        }
        self.scanner.end_line()?;

        let beat_unit = BeatUnit::new(unit.0, unit.1, unit.2).ok_or_else(|| {
            CompileError::semantic(format!("invalid beat unit {}/{}", unit.0, unit.1), line, col)
        })?;
        let tempo = Tempo::new(bpm, beat_unit)
            .ok_or_else(|| CompileError::semantic(format!("invalid tempo {bpm}"), line, col))?;

        debug!("line {}: tempo #{bar}.{beat} {tempo}", self.line);
        self.timeline.set_tempo(bar, beat, tempo);
        Ok(())
    }

    // duration TIME | duration inf
    fn duration_statement(&mut self) -> Result<(), CompileError> {
        self.scanner.skip_blank();
        let duration = if self.scanner.eat('*') {
            Some(Duration::Unbounded)
        } else if self.scanner.at_word() {
            let word = self.scanner.expect_word("'inf'")?;
            if word != "inf" {
                return Err(self.grammar(format!("unexpected '{word}' in duration")));
            }
            Some(Duration::Unbounded)
        } else if self.scanner.peek() == Some('#') {
            match self.scanner.scan_position()? {
                Position::Bar(pos) => {
                    let offset = self.offset()?;
                    self.timeline
                        .find_bar_time(pos.bar, pos.beat, pos.fraction())
                        .map(|t| Duration::Finite(t + offset))
                }
                Position::Event(name) => {
                    return Err(self.grammar(format!("duration cannot refer to event '{name}'")));
                }
            }
        } else {
            Some(Duration::Finite(self.time_value()?))
        };
        self.scanner.end_line()?;

        let Some(duration) = duration else {
            return self.missing("duration bar position not found".to_string());
        };
        if let Duration::Finite(ms) = duration {
            if ms < 0.0 {
                return Err(self.semantic(TimelineError::InvalidTime(ms)));
            }
        }

        debug!("line {}: duration {duration}", self.line);
        self.timeline.set_duration(duration);
        Ok(())
    }

    // event NAME [ACTION]
    fn event_statement(&mut self) -> Result<(), CompileError> {
        self.scanner.skip_blank();
        let (line, col) = self.scanner.position();
        let name = self.scanner.expect_word("event name")?;
        check_name(&name, line, col)?;
        self.scanner.skip_blank();
        let action = if self.scanner.peek() == Some('!') {
            Some(self.action()?)
        } else {
            None
        };
        self.scanner.end_line()?;

        self.timeline
            .add_event(&name)
            .map_err(|e| CompileError::timeline(e, line, col))?;
        debug!("line {}: event '{name}'", self.line);
        if let Some(action) = action {
            self.add_action(&name, action)?;
        }
        Ok(())
    }

    // [!]NAME ACTION
    fn attach_statement(&mut self, name: String) -> Result<(), CompileError> {
        if ACTIONS.contains(&name.as_str()) {
            return Err(self.grammar(format!("action '!{name}' needs a time or an event name")));
        }
        self.scanner.skip_blank();
        let action = self.action()?;
        self.scanner.end_line()?;
        self.add_action(&name, action)
    }

    // var NAME [@default VALUE] [@preset N]
    fn var_statement(&mut self) -> Result<(), CompileError> {
        self.scanner.skip_blank();
        let (line, col) = self.scanner.position();
        let name = self.scanner.expect_word("variable name")?;
        check_name(&name, line, col)?;

        let mut var = VarDef::new(name);
        while !self.scanner.at_line_end() {
            self.scanner.expect('@')?;
            let (line, col) = self.scanner.position();
            let property = self.scanner.expect_word("property name")?;
            self.scanner.skip_blank();
            let value = self.scanner.scan_decimal()?.to_f64();
            match property.as_str() {
                "default" => var.default = value,
                "preset" => var.preset = value,
                _ => {
                    return Err(CompileError::grammar(
                        format!("unknown property '@{property}'"),
                        line,
                        col,
                    ))
                }
            }
        }
        self.scanner.end_line()?;

        debug!(
            "line {}: var '{}' @default {} @preset {}",
            self.line, var.name, var.default, var.preset
        );
        self.timeline
            .add_var(var)
            .map_err(|e| CompileError::timeline(e, line, col))
    }

    // TIME (!NAME | ACTION | !)
    fn schedule_statement(&mut self) -> Result<(), CompileError> {
        let when = self.when()?;
        self.scanner.skip_blank();
        let target = self.target()?;
        self.scanner.end_line()?;

        if let Target::Named(name) = &target {
            if self.timeline.find_event(name).is_none() {
                return Err(self.semantic(TimelineError::UnknownEvent(name.clone())));
            }
        }

        let placement = self.resolve(when, &target)?;
        if let Resolved::Missing(message) = placement {
            return self.missing(message);
        }

        let name = match target {
            Target::Named(name) => name,
            Target::Action(action) => {
                let name = self.anonymous_event()?;
                self.add_action(&name, action)?;
                name
            }
            Target::Empty => self.anonymous_event()?,
        };

        match placement {
            Resolved::Absolute(times) => {
                for t in times {
                    self.timeline
                        .add_event_at(&name, t, false)
                        .map_err(|e| self.semantic(e))?;
                }
            }
            Resolved::Relative(offset) => {
                self.timeline
                    .add_event_at(&name, offset, true)
                    .map_err(|e| self.semantic(e))?;
            }
            Resolved::Missing(_) => {}
        }
        Ok(())
    }

    fn when(&mut self) -> Result<When, CompileError> {
        match self.scanner.peek() {
            Some('+') => {
                self.scanner.advance();
                Ok(When::Relative(self.time_value()?))
            }
            Some('#') => match self.scanner.scan_position()? {
                Position::Bar(pos) => Ok(When::Bar {
                    pos,
                    offset: self.offset()?,
                }),
                Position::Event(event) => Ok(When::After {
                    event,
                    offset: self.offset()?,
                }),
            },
            _ => Ok(When::At(self.time_value()?)),
        }
    }

    fn target(&mut self) -> Result<Target, CompileError> {
        self.scanner.expect('!')?;
        if self.scanner.at_line_end() {
            return Ok(Target::Empty);
        }
        let word = self.scanner.expect_word("event name or action")?;
        if ACTIONS.contains(&word.as_str()) {
            self.action_body(&word).map(Target::Action)
        } else {
            Ok(Target::Named(word))
        }
    }

    fn resolve(&self, when: When, target: &Target) -> Result<Resolved, CompileError> {
        Ok(match when {
            When::At(t) => Resolved::Absolute(vec![t]),
            When::Bar { pos, offset } => {
                match self
                    .timeline
                    .find_bar_time(pos.bar, pos.beat, pos.fraction())
                {
                    Some(t) => Resolved::Absolute(vec![t + offset]),
                    None => Resolved::Missing(format!("bar position {pos} not found")),
                }
            }
            When::After { event, offset } => {
                if self.timeline.find_event(&event).is_none() {
                    return Err(self.semantic(TimelineError::UnknownEvent(event)));
                }
                let times = self.timeline.find_event_times(&event);
                if times.is_empty() {
                    Resolved::Missing(format!("event '{event}' has not been scheduled yet"))
                } else {
                    Resolved::Absolute(times.into_iter().map(|t| t + offset).collect())
                }
            }
            When::Relative(offset) => {
                let prior = match target {
                    Target::Named(name) => self.timeline.find_event_times(name),
                    _ => Vec::new(),
                };
                if prior.is_empty() {
                    Resolved::Relative(offset)
                } else {
                    Resolved::Absolute(prior.into_iter().map(|t| t + offset).collect())
                }
            }
        })
    }

    /// `!out ARGS`, `!send TARGET ARGS` or `!preset N`.
    fn action(&mut self) -> Result<Action, CompileError> {
        self.scanner.expect('!')?;
        let (line, col) = self.scanner.position();
        let word = self.scanner.expect_word("action")?;
        if !ACTIONS.contains(&word.as_str()) {
            return Err(CompileError::grammar(
                format!("unknown action '!{word}'"),
                line,
                col,
            ));
        }
        self.action_body(&word)
    }

    fn action_body(&mut self, keyword: &str) -> Result<Action, CompileError> {
        self.scanner.skip_blank();
        match keyword {
            "send" => {
                let target = self
                    .scanner
                    .scan_symbol()
                    .ok_or_else(|| self.scanner.unexpected("send target"))?;
                let args = self.scanner.scan_args()?;
                Ok(Action::Send { target, args })
            }
            "preset" => {
                let index = self.scanner.scan_uint("preset index")?;
                Ok(Action::Preset { index })
            }
            _ => Ok(Action::Out {
                args: self.scanner.scan_args()?,
            }),
        }
    }

    fn add_action(&mut self, name: &str, action: Action) -> Result<(), CompileError> {
        debug!("line {}: '{name}' {action}", self.line);
        self.timeline
            .add_event_action(name, action)
            .map_err(|e| self.semantic(e))
    }

    fn anonymous_event(&mut self) -> Result<String, CompileError> {
        let name = format!(".event{}", self.anon_count);
        self.anon_count += 1;
        self.timeline.add_event(&name).map_err(|e| self.semantic(e))?;
        Ok(name)
    }

    /// Optional signed offset after a `#` position, in milliseconds.
    fn offset(&mut self) -> Result<f64, CompileError> {
        if self.scanner.at_offset() {
            self.time_value()
        } else {
            Ok(0.0)
        }
    }

    /// A plain or SMPTE time in milliseconds.
    fn time_value(&mut self) -> Result<f64, CompileError> {
        let (line, col) = self.scanner.position();
        let value = self.scanner.scan_time_value()?;
        if let TimeValue::Smpte(tc) = value {
            if f64::from(tc.frame) >= self.options.smpte_fps {
                return Err(CompileError::lex(
                    format!(
                        "frame {} out of range at {} fps",
                        tc.frame, self.options.smpte_fps
                    ),
                    line,
                    col,
                ));
            }
        }
        Ok(value.to_ms(self.options.smpte_fps))
    }

    /// A lookup that found nothing: an error, or a skipped statement when lenient.
    fn missing(&self, message: String) -> Result<(), CompileError> {
        if self.options.strict {
            return Err(CompileError::semantic(message, self.line, self.col));
        }
        warn!("line {}: {message}, statement skipped", self.line);
        Ok(())
    }

    fn grammar(&self, message: String) -> CompileError {
        CompileError::grammar(message, self.line, self.col)
    }

    fn semantic(&self, err: TimelineError) -> CompileError {
        CompileError::timeline(err, self.line, self.col)
    }
}

fn signature(num: u32, den: u32, line: usize, col: usize) -> Result<BarSignature, CompileError> {
    BarSignature::new(num, den).ok_or_else(|| {
        CompileError::semantic(format!("invalid bar denominator {den}"), line, col)
    })
}

fn check_name(name: &str, line: usize, col: usize) -> Result<(), CompileError> {
    if RESERVED.contains(&name) {
        return Err(CompileError::semantic(
            format!("'{name}' is a reserved word"),
            line,
            col,
        ));
    }
    Ok(())
}
