use crate::env::Environment;
use crate::error::ShellError;
use crate::parser::Stage;
use nix::unistd::Pid;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Command that is not a builtin.
#[derive(Debug)]
pub struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    /// Resolve the stage's command name against the session's search path.
    ///
    /// Fails with [`ShellError::SpawnFailure`] (`NotFound`) when nothing matches.
    pub fn resolve(env: &Environment, stage: &Stage) -> Result<Self, ShellError> {
        let search_paths = env.search_path.as_deref().unwrap_or_default();
        let name = stage.name();
        let program = find_command_path(search_paths, Path::new(name))
            .ok_or_else(|| ShellError::SpawnFailure {
                program: name.to_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "command not found"),
            })?
            .into_owned();
        Ok(Self {
            name: name.to_owned(),
            program,
            args: stage.args().to_vec(),
        })
    }

    /// Start the program with `stdin`/`stdout` as its standard streams.
    ///
    /// Both descriptors are consumed: they are closed in this process as soon
    /// as the child has its own copies, whether or not the spawn succeeded.
    /// The typed name is kept as `argv[0]`.
    pub fn spawn(
        self,
        stdin: OwnedFd,
        stdout: OwnedFd,
        env: &Environment,
    ) -> Result<Pid, ShellError> {
        let child = Command::new(&self.program)
            .arg0(&self.name)
            .args(&self.args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .current_dir(&env.current_dir)
            .spawn()
            .map_err(|e| ShellError::from_launch(&self.name, e))?;
        // The `Command` and its stdio handles are gone once we return; the
        // child is reaped by pid, not through `Child`.
        Ok(Pid::from_raw(child.id() as i32))
    }
}

/// Locate the executable a stage names.
///
/// A bare name (one normal component) is looked up in each directory of
/// `search_paths` in order. Anything containing a separator is taken as a path
/// in its own right. Only regular files with an execute bit count.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, _) => None,
        (Some(std::path::Component::Normal(x)), None) => {
            find_in_path(search_paths, x).map(Cow::Owned)
        }
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable(candidate))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
