use crate::command::{BuiltinHandler, BuiltinResult};
use crate::env::Environment;
use crate::error::ShellError;
use crate::history::{self, DISPLAY_LIMIT};
use argh::{EarlyExit, FromArgs};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "history".
    fn name() -> &'static str;

    /// Executes the command using the descriptors of its pipeline position.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> BuiltinResult;
}

/// Factory that turns a [`BuiltinCommand`] type into a registry entry.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand> BuiltinHandler for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn invoke(
        &self,
        args: &[&str],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> BuiltinResult {
        match T::from_args(&[T::name()], args) {
            Ok(cmd) => cmd.execute(stdin, stdout, env),
            // --help
            Err(EarlyExit { output, status: Ok(()) }) => stdout
                .write_all(output.as_bytes())
                .map_err(|e| write_error(T::name(), e)),
            Err(EarlyExit { output, status: Err(()) }) => Err(ShellError::invalid_arguments(
                T::name(),
                output.trim_end(),
            )),
        }
    }
}

fn write_error(command: &str, source: std::io::Error) -> ShellError {
    ShellError::os(format!("{command}: write error"), source)
}

/// Name-indexed set of builtins consulted before any PATH lookup.
pub struct BuiltinRegistry {
    handlers: HashMap<&'static str, Box<dyn BuiltinHandler>>,
}

impl BuiltinRegistry {
    /// A registry with no builtins at all.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Add a handler, replacing any previous one with the same name.
    pub fn register(&mut self, handler: Box<dyn BuiltinHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn BuiltinHandler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }
}

impl Default for BuiltinRegistry {
    /// `cd`, `history` and `exit`.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Factory::<Cd>::default()));
        registry.register(Box::new(Factory::<HistoryCmd>::default()));
        registry.register(Box::new(Factory::<Exit>::default()));
        registry
    }
}

#[derive(FromArgs)]
/// Change the current working directory of the shell.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> BuiltinResult {
        let target = PathBuf::from(&self.target);
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .map_err(|e| ShellError::os(format!("cd: {}", self.target), e))?;
        env::set_current_dir(&canonical)
            .map_err(|e| ShellError::os(format!("cd: {}", self.target), e))?;
        log::debug!("working directory is now {}", canonical.display());
        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Show the most recent command lines, or clear the history.
pub struct HistoryCmd {
    #[argh(switch, short = 'c')]
    /// clear the history instead of showing it.
    pub clear: bool,

    #[argh(positional)]
    /// how many of the most recent entries to show (at most 10).
    pub count: Option<String>,
}

impl BuiltinCommand for HistoryCmd {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> BuiltinResult {
        if self.clear {
            if let Some(extra) = self.count {
                return Err(ShellError::invalid_arguments(
                    "history",
                    format!("unexpected argument with -c: {extra}"),
                ));
            }
            env.history.clear();
            return Ok(());
        }

        let count = match self.count {
            None => DISPLAY_LIMIT,
            Some(arg) => arg.parse::<usize>().map_err(|_| {
                ShellError::invalid_arguments("history", format!("{arg}: expected -c or a count"))
            })?,
        };

        for (ordinal, line) in env.history.tail(count) {
            writeln!(stdout, "{}", history::format_entry(ordinal, line))
                .map_err(|e| write_error("history", e))?;
        }
        stdout.flush().map_err(|e| write_error("history", e))
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> BuiltinResult {
        env.should_exit = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Cursor;

    fn run(name: &str, args: &[&str], env: &mut Environment) -> (BuiltinResult, String) {
        let registry = BuiltinRegistry::default();
        let handler = registry.resolve(name).expect("builtin registered");
        let mut out = Vec::new();
        let res = handler.invoke(args, &mut Cursor::new(Vec::new()), &mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    fn env_with_history(lines: &[&str]) -> Environment {
        let mut env = Environment::new(100);
        for line in lines {
            env.history.push(*line);
        }
        env
    }

    #[test]
    fn test_registry_resolves_only_builtins() {
        let registry = BuiltinRegistry::default();
        assert!(registry.resolve("cd").is_some());
        assert!(registry.resolve("history").is_some());
        assert!(registry.resolve("exit").is_some());
        assert!(registry.resolve("ls").is_none());
        assert_eq!(registry.resolve("history").map(|h| h.name()), Some("history"));
    }

    #[test]
    fn test_history_default_shows_last_ten() {
        let lines: Vec<String> = (1..=12).map(|i| format!("cmd{i}")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut env = env_with_history(&refs);

        let (res, out) = run("history", &[], &mut env);
        assert!(res.is_ok());
        let shown: Vec<&str> = out.lines().collect();
        assert_eq!(shown.len(), 10);
        assert_eq!(shown[0], "003 cmd3");
        assert_eq!(shown[9], "012 cmd12");
    }

    #[test]
    fn test_history_count_numbers_from_log_start() {
        let mut env = env_with_history(&["a", "b", "c", "d", "e", "f", "g"]);
        let (res, out) = run("history", &["3"], &mut env);
        assert!(res.is_ok());
        assert_eq!(out, "005 e\n006 f\n007 g\n");
    }

    #[test]
    fn test_history_count_above_limit_matches_default() {
        let lines: Vec<String> = (1..=20).map(|i| format!("l{i}")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut env = env_with_history(&refs);

        let (_, big) = run("history", &["25"], &mut env);
        let (_, ten) = run("history", &["10"], &mut env);
        let (_, default) = run("history", &[], &mut env);
        assert_eq!(big, ten);
        assert_eq!(big, default);
    }

    #[test]
    fn test_history_clear() {
        let mut env = env_with_history(&["a", "b"]);
        let (res, out) = run("history", &["-c"], &mut env);
        assert!(res.is_ok());
        assert!(out.is_empty());
        assert!(env.history.is_empty());

        let (res, out) = run("history", &[], &mut env);
        assert!(res.is_ok());
        assert!(out.is_empty());
    }

    #[test]
    fn test_history_rejects_bad_arguments() {
        let mut env = env_with_history(&["a"]);
        for args in [&["abc"][..], &["1", "2"], &["-c", "3"], &["-x"], &["-5"]] {
            let (res, out) = run("history", args, &mut env);
            assert!(
                matches!(res, Err(ShellError::InvalidArguments { .. })),
                "args {args:?} should be rejected"
            );
            assert!(out.is_empty());
        }
        assert_eq!(env.history.len(), 1);
    }

    #[test]
    fn test_help_goes_to_stdout() {
        let mut env = Environment::new(10);
        let (res, out) = run("history", &["--help"], &mut env);
        assert!(res.is_ok());
        assert!(out.contains("history"));
    }

    #[test]
    fn test_exit_sets_flag() {
        let mut env = Environment::new(10);
        let (res, _) = run("exit", &[], &mut env);
        assert!(res.is_ok());
        assert!(env.should_exit);
    }

    #[test]
    #[serial]
    fn test_cd_to_absolute_path() {
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");
        let orig = env::current_dir().unwrap();

        let mut env = Environment::new(10);
        let target = canonical_temp.to_string_lossy().to_string();
        let (res, _) = run("cd", &[target.as_str()], &mut env);
        let new_cwd = env::current_dir().unwrap();
        env::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    #[serial]
    fn test_cd_relative_to_session_dir() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("inner")).unwrap();
        let orig = env::current_dir().unwrap();

        let mut env = Environment::new(10);
        env.current_dir = fs::canonicalize(temp.path()).unwrap();
        let (res, _) = run("cd", &["inner"], &mut env);
        env::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert!(env.current_dir.ends_with("inner"));
    }

    #[test]
    #[serial]
    fn test_cd_nonexistent_path_errors() {
        let orig = env::current_dir().unwrap();
        let mut env = Environment::new(10);
        let before = env.current_dir.clone();

        let (res, _) = run("cd", &["/nonexistent/for/pipeshell/tests"], &mut env);

        assert!(matches!(res, Err(ShellError::OsError { .. })));
        assert_eq!(env::current_dir().unwrap(), orig);
        assert_eq!(env.current_dir, before);
    }

    #[test]
    #[serial]
    fn test_cd_requires_exactly_one_argument() {
        let orig = env::current_dir().unwrap();
        let mut env = Environment::new(10);

        let (res, _) = run("cd", &[], &mut env);
        assert!(matches!(res, Err(ShellError::InvalidArguments { .. })));

        let (res, _) = run("cd", &["/tmp", "/"], &mut env);
        assert!(matches!(res, Err(ShellError::InvalidArguments { .. })));

        assert_eq!(env::current_dir().unwrap(), orig);
    }
}
