//! Error types for the TDL compiler.

use std::fmt;

use crate::timeline::TimelineError;

/// An error that stopped a TDL parse.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub line: usize,
    pub col: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed literal or unexpected character.
    LexError,
    /// Statement structure not recognized.
    GrammarError,
    /// Well-formed statement the timeline rejects.
    SemanticError,
}

impl CompileError {
    pub fn lex(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            message: message.into(),
            line,
            col,
            kind: ErrorKind::LexError,
        }
    }

    pub fn grammar(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            message: message.into(),
            line,
            col,
            kind: ErrorKind::GrammarError,
        }
    }

    pub fn semantic(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            message: message.into(),
            line,
            col,
            kind: ErrorKind::SemanticError,
        }
    }

    pub(crate) fn timeline(err: TimelineError, line: usize, col: usize) -> Self {
        Self::semantic(err.to_string(), line, col)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}] {:?}: {}",
            self.line, self.col, self.kind, self.message
        )
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = CompileError::grammar("expected '!'", 3, 7);
        assert_eq!(err.to_string(), "[3:7] GrammarError: expected '!'");
    }

    #[test]
    fn timeline_errors_are_semantic() {
        let err = CompileError::timeline(TimelineError::UnknownEvent("x".into()), 1, 1);
        assert_eq!(err.kind, ErrorKind::SemanticError);
        assert_eq!(err.message, "event 'x' not found");
    }
}
