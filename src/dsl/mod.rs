//! TDL compiler: source text → scanner → statement parser → [`TimeLine`].

pub mod error;
pub mod parser;
pub mod scanner;
pub mod token;

pub use error::{CompileError, ErrorKind};
pub use parser::ParseOptions;

use log::error;

use crate::timeline::TimeLine;
use parser::Parser;

/// The TDL compiler.
///
/// Every call starts from an empty timeline, so compiling the same source
/// twice yields equal results.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: ParseOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Compile `source`, returning the timeline only on success.
    pub fn compile(&self, source: &str) -> Result<TimeLine, CompileError> {
        let (result, timeline) = self.run(source);
        result.map(|()| timeline)
    }

    /// Compile `source`, reporting failure through the flag.
    ///
    /// The timeline is returned either way; after a failure it holds every
    /// statement applied before the error. The diagnostic is logged.
    pub fn parse(&self, source: &str) -> (bool, TimeLine) {
        let (result, timeline) = self.run(source);
        match result {
            Ok(()) => (true, timeline),
            Err(e) => {
                error!("{e}");
                (false, timeline)
            }
        }
    }

    fn run(&self, source: &str) -> (Result<(), CompileError>, TimeLine) {
        let mut parser = Parser::new(source, self.options.clone());
        let result = parser.parse();
        (result, parser.into_timeline())
    }
}

/// Compile `source` with default options; see [`Compiler::parse`].
pub fn parse(source: &str) -> (bool, TimeLine) {
    Compiler::new().parse(source)
}
