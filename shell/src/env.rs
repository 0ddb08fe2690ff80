use crate::history::History;
use std::env as stdenv;
use std::ffi::OsString;
use std::path::PathBuf;

/// Session-scoped state shared by the interpreter, the executor and builtins.
///
/// The environment contains:
/// - `current_dir`: the working directory children are started in.
/// - `search_path`: the `PATH` value used to resolve external commands.
/// - `history`: the log of accepted lines read by the `history` builtin.
/// - `should_exit`: set by the `exit` builtin; the session loop stops when it is true.
///
/// Note: fields are public for simplicity, there is only ever one writer.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Directories searched for external commands, in `PATH` syntax.
    pub search_path: Option<OsString>,
    /// Lines accepted by the session loop.
    pub history: History,
    /// When set to true, indicates that the session should end.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment`.
    ///
    /// `current_dir` comes from `std::env::current_dir()` and `search_path`
    /// from the `PATH` variable.
    pub fn new(history_capacity: usize) -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            search_path: stdenv::var_os("PATH"),
            history: History::new(history_capacity),
            should_exit: false,
        }
    }

    /// Replace the directories searched for external commands.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }
}
