use std::io;
use thiserror::Error;

/// Errors reported by the shell while parsing or running a line.
///
/// None of them terminates the session: the interpreter prints them and
/// prompts for the next line.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Two consecutive pipes, or a pipe at either end of a non-blank line.
    #[error("syntax error: empty command at pipeline position {position}")]
    EmptyStage { position: usize },

    /// A descriptor or process could not be created because of OS limits.
    #[error("{context}: {source}")]
    ResourceExhaustion {
        context: String,
        #[source]
        source: io::Error,
    },

    /// An external program could not be found or executed.
    #[error("{program}: {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A builtin received a malformed argument list.
    #[error("{command}: {message}")]
    InvalidArguments { command: String, message: String },

    /// An OS operation performed on behalf of the shell failed.
    #[error("{context}: {source}")]
    OsError {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    pub fn invalid_arguments(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn os(context: impl Into<String>, source: io::Error) -> Self {
        Self::OsError {
            context: context.into(),
            source,
        }
    }

    /// Classify a failed pipe, dup or spawn.
    ///
    /// OS-limit errnos become [`ShellError::ResourceExhaustion`]; anything else
    /// is a [`ShellError::SpawnFailure`] for `program`.
    pub fn from_launch(program: &str, source: io::Error) -> Self {
        if is_exhaustion(&source) {
            Self::ResourceExhaustion {
                context: format!("{program}: cannot create process"),
                source,
            }
        } else {
            Self::SpawnFailure {
                program: program.to_owned(),
                source,
            }
        }
    }

    /// Whether the rest of the pipeline must be abandoned.
    pub fn is_fatal_to_pipeline(&self) -> bool {
        matches!(self, Self::ResourceExhaustion { .. })
    }
}

pub(crate) fn is_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::EAGAIN | libc::ENOMEM)
    )
}
