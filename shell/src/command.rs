use crate::env::Environment;
use crate::error::ShellError;
use nix::sys::signal::Signal;
use std::fmt;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Outcome of an in-process builtin invocation.
pub type BuiltinResult = Result<(), ShellError>;

/// How a reaped child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitCode),
    Signaled(Signal),
}

impl Termination {
    /// Shell-style status: the exit code, or 128 + signal number.
    pub fn code(self) -> ExitCode {
        match self {
            Termination::Exited(code) => code,
            Termination::Signaled(signal) => 128 + signal as i32,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with status {code}"),
            Termination::Signaled(signal) => write!(f, "killed by {signal}"),
        }
    }
}

/// Object-safe capability behind every entry of the builtin registry.
///
/// Implemented for argh-parsed builtins via [`crate::builtin`]'s factory.
pub trait BuiltinHandler {
    /// Canonical name the handler is registered under.
    fn name(&self) -> &'static str;

    /// Run the builtin in the session's own process.
    ///
    /// `stdin` and `stdout` are the descriptors assigned to the builtin's
    /// pipeline position; `args` excludes the command name.
    fn invoke(
        &self,
        args: &[&str],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> BuiltinResult;
}
