use crate::builtin::BuiltinRegistry;
use crate::config::Config;
use crate::env::Environment;
use crate::error::ShellError;
use crate::executor::{ExecutionReport, PipelineExecutor, StdStreams};
use crate::input::LineSource;
use crate::{lexer, parser};
use anyhow::{Context, Result};
use std::io::{self, Write};

/// What the interpreter did with one input line.
#[derive(Debug)]
pub enum LineOutcome {
    /// Blank line: nothing recorded, nothing run.
    Blank,
    /// Recorded in history but not runnable.
    Rejected(ShellError),
    /// Recorded and executed.
    Ran(ExecutionReport),
}

/// The session loop: reads lines, records them, runs them as pipelines.
///
/// The interpreter owns the session [`Environment`] and the builtin registry,
/// and hands them to a [`PipelineExecutor`] for every line.
///
/// Example
/// ```no_run
/// use pipeshell::{Config, Interpreter, ReaderSource};
/// let mut sh = Interpreter::new(&Config::default()).unwrap();
/// let mut input = ReaderSource::new(std::io::stdin(), std::io::stdout());
/// sh.repl(&mut input).unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: BuiltinRegistry,
    streams: StdStreams,
    prompt: String,
    diagnostics: Box<dyn Write>,
}

impl Interpreter {
    /// Interpreter bound to this process's standard streams.
    pub fn new(config: &Config) -> Result<Self> {
        let streams = StdStreams::inherit().context("failed to duplicate standard streams")?;
        Ok(Self::with_streams(config, streams, Box::new(io::stderr())))
    }

    /// Interpreter running pipelines against `streams`, reporting to `diagnostics`.
    pub fn with_streams(config: &Config, streams: StdStreams, diagnostics: Box<dyn Write>) -> Self {
        Self {
            env: Environment::new(config.history_size),
            builtins: BuiltinRegistry::default(),
            streams,
            prompt: config.prompt.clone(),
            diagnostics,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Read and run lines until end of input or `exit`.
    pub fn repl(&mut self, source: &mut dyn LineSource) -> Result<()> {
        while !self.env.should_exit {
            let Some(line) = source.next_line(&self.prompt)? else {
                log::debug!("end of input");
                break;
            };
            self.execute_line(&line);
        }
        Ok(())
    }

    /// Record `line` in history and run it. Errors are printed, never returned.
    ///
    /// The line is appended before it runs, so a `history` stage lists it.
    pub fn execute_line(&mut self, line: &str) -> LineOutcome {
        let line = lexer::trim_record(line);
        if line.trim().is_empty() {
            return LineOutcome::Blank;
        }
        self.env.history.push(line);

        let pipeline = match parser::parse(line) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.report(&err);
                return LineOutcome::Rejected(err);
            }
        };

        let report =
            PipelineExecutor::new(&self.streams, &self.builtins, &mut self.env).run(&pipeline);
        for err in report.errors() {
            self.report(err);
        }
        LineOutcome::Ran(report)
    }

    fn report(&mut self, err: &ShellError) {
        log::debug!("reporting {err:?}");
        let _ = writeln!(self.diagnostics, "pipeshell: {err}");
        let _ = self.diagnostics.flush();
    }
}
