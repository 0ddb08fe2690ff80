//! A small interactive shell that runs pipelines of external programs and builtins.
//!
//! A line such as `ls -l | grep rs | wc -l` is split into stages, each stage is
//! either run in-process (the `cd`, `history` and `exit` builtins) or spawned as
//! an external program, and neighbouring stages are connected by pipes. The
//! shell waits for every process it started before prompting again.
//!
//! The main entry point is [`Interpreter`], which owns the session state and
//! delegates each line to the [`PipelineExecutor`]. Lines come from any
//! [`LineSource`]; [`EditorSource`] wraps a rustyline editor for terminals.

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod external;
pub mod history;
pub mod input;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;

pub use config::Config;
pub use error::ShellError;
pub use executor::{ExecutionReport, PipelineExecutor, StageOutcome, StdStreams};
pub use input::{EditorSource, LineSource, ReaderSource};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Interpreter, LineOutcome};
