//! TDL: compiles Timeline Description Language sources into resolved timelines.
//!
//! ```text
//! bar 4*4/4
//! tempo #0 120
//! event kick !out 1
//! #0.0 !kick
//! +500 !kick
//! ```

pub mod config;
pub mod dsl;
pub mod timeline;

pub use dsl::{parse, CompileError, Compiler, ErrorKind, ParseOptions};
pub use timeline::TimeLine;
