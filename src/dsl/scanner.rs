//! Character-level scanner for TDL.
//!
//! TDL literals are context dependent (`4/4`, `#1.2.5`, `00:01:30.12`,
//! `120|8.bpm` all share digits and dots), so there is no separate token
//! stream. The parser asks the scanner for the lexical class it expects next
//! and the scanner reads exactly that.
//!
//! Only blanks (space, tab, CR) are skipped implicitly, and only where the
//! parser calls [`Scanner::skip_blank`]. Newlines end statements.

use super::error::CompileError;
use super::token::{BarPos, Decimal, Position, Smpte, TimeUnit, TimeValue};
use crate::timeline::Value;

pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Current `(line, col)`, both 1-based.
    pub fn position(&self) -> (usize, usize) {
        (self.line, self.col)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    /// Consume `expected` if it is the next character.
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: char) -> Result<(), CompileError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{expected}'")))
        }
    }

    pub fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        if self.peek() == Some('/') && self.peek_next() == Some('/') {
            while !matches!(self.peek(), None | Some('\n')) {
                self.advance();
            }
        }
    }

    /// Skip blanks and a trailing comment; true when the statement is over.
    pub fn at_line_end(&mut self) -> bool {
        self.skip_blank();
        self.skip_comment();
        matches!(self.peek(), None | Some('\n'))
    }

    /// Consume the end of the current statement.
    pub fn end_line(&mut self) -> Result<(), CompileError> {
        if !self.at_line_end() {
            return Err(self.unexpected("end of line"));
        }
        self.eat('\n');
        Ok(())
    }

    /// Skip blank and comment-only lines.
    pub fn skip_empty_lines(&mut self) {
        while self.at_line_end() && self.eat('\n') {}
    }

    /// A grammar error describing what was found instead of `expected`.
    pub fn unexpected(&self, expected: &str) -> CompileError {
        let found = match self.peek() {
            None => "end of input".to_string(),
            Some('\n') => "end of line".to_string(),
            Some(ch) => format!("'{ch}'"),
        };
        CompileError::grammar(
            format!("expected {expected}, found {found}"),
            self.line,
            self.col,
        )
    }

    pub fn at_word(&self) -> bool {
        self.peek()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
    }

    pub fn at_digit(&self) -> bool {
        self.peek().is_some_and(|ch| ch.is_ascii_digit())
    }

    fn next_is_digit(&self) -> bool {
        self.peek_next().is_some_and(|ch| ch.is_ascii_digit())
    }

    /// A signed offset (`+250`, `-1s`) follows.
    pub fn at_offset(&self) -> bool {
        matches!(self.peek(), Some('+' | '-')) && self.next_is_digit()
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`
    pub fn scan_word(&mut self) -> Option<String> {
        if !self.at_word() {
            return None;
        }
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Some(word)
    }

    pub fn expect_word(&mut self, what: &str) -> Result<String, CompileError> {
        self.scan_word().ok_or_else(|| self.unexpected(what))
    }

    /// A run of digits as `(value, digit count)`.
    fn scan_digits(&mut self) -> Result<Option<(u64, u32)>, CompileError> {
        if !self.at_digit() {
            return Ok(None);
        }
        let (line, col) = self.position();
        let mut value: u64 = 0;
        let mut len = 0;
        while let Some(digit) = self.peek().and_then(|ch| ch.to_digit(10)) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or_else(|| CompileError::lex("number too large", line, col))?;
            len += 1;
            self.advance();
        }
        Ok(Some((value, len)))
    }

    /// Digits after a decimal point as a fraction `num / 10^len`.
    fn scan_fraction_digits(&mut self) -> Result<(u64, u64), CompileError> {
        let (line, col) = self.position();
        let (num, len) = self.scan_digits()?.ok_or_else(|| self.unexpected("digits"))?;
        let den = 10_u64
            .checked_pow(len)
            .ok_or_else(|| CompileError::lex("too many fraction digits", line, col))?;
        Ok((num, den))
    }

    pub fn scan_uint(&mut self, what: &str) -> Result<u32, CompileError> {
        let (line, col) = self.position();
        let (value, _) = self.scan_digits()?.ok_or_else(|| self.unexpected(what))?;
        u32::try_from(value).map_err(|_| CompileError::lex(format!("{what} too large"), line, col))
    }

    /// `[+-]DIGITS[.DIGITS]`
    pub fn scan_decimal(&mut self) -> Result<Decimal, CompileError> {
        let (line, col) = self.position();
        let negative = self.scan_sign();
        let (int, _) = self.scan_digits()?.ok_or_else(|| self.unexpected("number"))?;
        let int = i64::try_from(int).map_err(|_| CompileError::lex("number too large", line, col))?;

        let (num, den) = if self.peek() == Some('.') && self.next_is_digit() {
            self.advance();
            self.scan_fraction_digits()?
        } else {
            (0, 1)
        };

        Ok(Decimal {
            int: if negative { -int } else { int },
            sign: if negative { -1 } else { 1 },
            num,
            den,
        })
    }

    fn scan_sign(&mut self) -> bool {
        if self.eat('-') {
            true
        } else {
            self.eat('+');
            false
        }
    }

    /// Plain `NUMBER[UNIT]` or SMPTE `[HH:]MM:SS[.FF]`, optionally signed.
    pub fn scan_time_value(&mut self) -> Result<TimeValue, CompileError> {
        let (line, col) = self.position();
        let negative = matches!(self.peek(), Some('-'));
        let value = self.scan_decimal()?;

        if value.den == 1 && self.peek() == Some(':') {
            return self.scan_smpte(negative, value.int.unsigned_abs(), line, col);
        }

        let unit = self.scan_unit();
        Ok(TimeValue::Plain { value, unit })
    }

    fn scan_smpte(
        &mut self,
        negative: bool,
        first: u64,
        line: usize,
        col: usize,
    ) -> Result<TimeValue, CompileError> {
        let mut fields = vec![first];
        while self.eat(':') {
            let (field, _) = self
                .scan_digits()?
                .ok_or_else(|| self.unexpected("timecode field"))?;
            fields.push(field);
        }

        let frame = if self.peek() == Some('.') && self.next_is_digit() {
            self.advance();
            self.scan_digits()?.map_or(0, |(frame, _)| frame)
        } else {
            0
        };

        let (hour, min, sec) = match fields[..] {
            [min, sec] => (0, min, sec),
            [hour, min, sec] => (hour, min, sec),
            _ => {
                return Err(CompileError::lex(
                    "timecode needs two or three fields",
                    line,
                    col,
                ))
            }
        };
        if min >= 60 || sec >= 60 {
            return Err(CompileError::lex(
                format!("invalid timecode {hour:02}:{min:02}:{sec:02}"),
                line,
                col,
            ));
        }

        let field = |v: u64| {
            u32::try_from(v).map_err(|_| CompileError::lex("timecode field too large", line, col))
        };
        Ok(TimeValue::Smpte(Smpte {
            negative,
            hour: field(hour)?,
            min: field(min)?,
            sec: field(sec)?,
            frame: field(frame)?,
        }))
    }

    /// Consume a unit suffix only when the whole letter run is a unit.
    fn scan_unit(&mut self) -> TimeUnit {
        let run: String = self.chars[self.pos..]
            .iter()
            .take_while(|ch| ch.is_ascii_alphabetic())
            .collect();
        let follows_word = self
            .chars
            .get(self.pos + run.len())
            .is_some_and(|ch| ch.is_ascii_digit() || *ch == '_');
        match TimeUnit::from_suffix(&run) {
            Some(unit) if !follows_word => {
                for _ in 0..run.len() {
                    self.advance();
                }
                unit
            }
            _ => TimeUnit::Millisecond,
        }
    }

    /// `#BAR[.BEAT[.FRAC]]` or `#NAME`.
    pub fn scan_position(&mut self) -> Result<Position, CompileError> {
        self.expect('#')?;
        if self.at_word() {
            return self.expect_word("event name").map(Position::Event);
        }
        if !self.at_digit() {
            let (line, col) = self.position();
            return Err(CompileError::lex(
                "expected bar number or event name after '#'",
                line,
                col,
            ));
        }

        let bar = self.scan_uint("bar number")?;
        let mut beat = 0;
        let (mut frac_num, mut frac_den) = (0, 1);
        if self.peek() == Some('.') && self.next_is_digit() {
            self.advance();
            beat = self.scan_uint("beat number")?;
            if self.peek() == Some('.') && self.next_is_digit() {
                self.advance();
                (frac_num, frac_den) = self.scan_fraction_digits()?;
            }
        }
        Ok(Position::Bar(BarPos {
            bar,
            beat,
            frac_num,
            frac_den,
        }))
    }

    /// A run of non-blank characters.
    pub fn scan_symbol(&mut self) -> Option<String> {
        let mut symbol = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                break;
            }
            symbol.push(ch);
            self.advance();
        }
        (!symbol.is_empty()).then_some(symbol)
    }

    fn scan_string(&mut self) -> Result<String, CompileError> {
        let (line, col) = self.position();
        self.expect('"')?;
        let mut s = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(CompileError::lex("unterminated string", line, col));
                }
                Some('"') => {
                    self.advance();
                    return Ok(s);
                }
                Some('\\') if matches!(self.peek_next(), Some('"' | '\\')) => {
                    self.advance();
                    if let Some(ch) = self.advance() {
                        s.push(ch);
                    }
                }
                Some(ch) => {
                    s.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// One action argument: a number, a quoted string or a symbol.
    pub fn scan_value(&mut self) -> Result<Value, CompileError> {
        if self.peek() == Some('"') {
            return self.scan_string().map(Value::Str);
        }
        let symbol = self.scan_symbol().ok_or_else(|| self.unexpected("argument"))?;
        Ok(match parse_number(&symbol) {
            Some(n) => Value::Number(n),
            None => Value::Symbol(symbol),
        })
    }

    /// Arguments up to the end of the line.
    pub fn scan_args(&mut self) -> Result<Vec<Value>, CompileError> {
        let mut args = Vec::new();
        while !self.at_line_end() {
            args.push(self.scan_value()?);
        }
        Ok(args)
    }
}

/// `[+-]DIGITS[.DIGITS]` as a number, anything else is a symbol.
fn parse_number(s: &str) -> Option<f64> {
    let digits = s.strip_prefix(&['-', '+'][..]).unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int) || frac.is_some_and(|f| !all_digits(f)) {
        return None;
    }
    s.parse().ok()
}
