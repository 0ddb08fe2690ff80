//! Turns a parsed [`Pipeline`] into connected, running stages and reaps them.
//!
//! Every descriptor the executor handles is an [`OwnedFd`]: it has exactly one
//! owner at any time and is closed when that owner is dropped. The launch
//! phase runs in its own scope, so by the time the reap loop starts this
//! process no longer holds any pipe end and every reader can observe EOF.
//!
//! A builtin that is not the last stage writes into a buffer. The buffer is
//! delivered to its pipe only after every stage has been launched, when the
//! reading side exists.

use crate::builtin::BuiltinRegistry;
use crate::command::{BuiltinResult, Termination};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::ExternalCommand;
use crate::parser::{Pipeline, Stage};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid, waitpid};
use nix::unistd::{Pid, pipe2};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, OwnedFd};

/// The session's own standard streams.
///
/// Pipelines only ever receive duplicates of these, so the originals are
/// never consumed or closed by pipeline machinery.
#[derive(Debug)]
pub struct StdStreams {
    stdin: OwnedFd,
    stdout: OwnedFd,
}

impl StdStreams {
    pub fn new(stdin: impl Into<OwnedFd>, stdout: impl Into<OwnedFd>) -> Self {
        Self {
            stdin: stdin.into(),
            stdout: stdout.into(),
        }
    }

    /// Duplicates of the process's fd 0 and fd 1.
    pub fn inherit() -> io::Result<Self> {
        Ok(Self {
            stdin: io::stdin().as_fd().try_clone_to_owned()?,
            stdout: io::stdout().as_fd().try_clone_to_owned()?,
        })
    }

    fn dup_stdin(&self) -> Result<OwnedFd, ShellError> {
        dup(&self.stdin, "duplicate standard input")
    }

    fn dup_stdout(&self) -> Result<OwnedFd, ShellError> {
        dup(&self.stdout, "duplicate standard output")
    }
}

fn dup(fd: &OwnedFd, context: &str) -> Result<OwnedFd, ShellError> {
    fd.try_clone().map_err(|source| exhaustion(context, source))
}

fn exhaustion(context: &str, source: io::Error) -> ShellError {
    ShellError::ResourceExhaustion {
        context: context.to_owned(),
        source,
    }
}

/// What happened to one stage of a pipeline.
#[derive(Debug)]
pub enum StageOutcome {
    /// Ran in-process.
    Builtin(BuiltinResult),
    /// Spawned as `pid`; `status` is filled in once the process is reaped.
    Process {
        pid: Pid,
        status: Option<Termination>,
    },
    /// Could not be started; neighbours saw their pipe ends closed.
    LaunchFailed(ShellError),
    /// Never attempted because the pipeline was aborted or exit was requested.
    Skipped,
}

#[derive(Debug)]
pub struct StageReport {
    pub name: String,
    pub outcome: StageOutcome,
}

/// Everything [`PipelineExecutor::run`] observed, in stage order.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub stages: Vec<StageReport>,
    /// Failures that belong to the pipeline as a whole rather than a stage.
    pub pipeline_errors: Vec<ShellError>,
    /// Stage indices of spawned processes in the order they were reaped.
    pub completion_order: Vec<usize>,
    /// An `exit` builtin ran.
    pub exit_requested: bool,
}

impl ExecutionReport {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of external processes that were actually started.
    pub fn spawned(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s.outcome, StageOutcome::Process { .. }))
            .count()
    }

    /// Final status of stage `index`, if it was a reaped process.
    pub fn status(&self, index: usize) -> Option<Termination> {
        match self.stages.get(index)?.outcome {
            StageOutcome::Process { status, .. } => status,
            _ => None,
        }
    }

    /// Every error, stage errors first in stage order, then pipeline errors.
    pub fn errors(&self) -> impl Iterator<Item = &ShellError> {
        self.stages
            .iter()
            .filter_map(|s| match &s.outcome {
                StageOutcome::Builtin(Err(e)) | StageOutcome::LaunchFailed(e) => Some(e),
                _ => None,
            })
            .chain(self.pipeline_errors.iter())
    }
}

/// Runs pipelines against one session's streams, builtins and environment.
pub struct PipelineExecutor<'s> {
    streams: &'s StdStreams,
    builtins: &'s BuiltinRegistry,
    env: &'s mut Environment,
}

impl<'s> PipelineExecutor<'s> {
    pub fn new(
        streams: &'s StdStreams,
        builtins: &'s BuiltinRegistry,
        env: &'s mut Environment,
    ) -> Self {
        Self {
            streams,
            builtins,
            env,
        }
    }

    /// Launch every stage left to right, then wait for all spawned processes.
    ///
    /// Returns only once no process started by this call remains unreaped.
    pub fn run(&mut self, pipeline: &Pipeline) -> ExecutionReport {
        let mut report = ExecutionReport {
            stages: pipeline
                .stages()
                .iter()
                .map(|stage| StageReport {
                    name: stage.name().to_owned(),
                    outcome: StageOutcome::Skipped,
                })
                .collect(),
            ..ExecutionReport::default()
        };
        if pipeline.is_empty() {
            return report;
        }

        log::debug!("running pipeline of {} stage(s)", pipeline.len());
        let pending = self.launch_all(pipeline, &mut report);
        deliver_all(pending, &mut report);
        reap_all(&mut report);
        report
    }

    /// Launch stages left to right. Returns the buffered output of builtins
    /// that still has to be written to their pipes.
    fn launch_all(
        &mut self,
        pipeline: &Pipeline,
        report: &mut ExecutionReport,
    ) -> Vec<PendingOutput> {
        let mut pending = Vec::new();
        let mut incoming = match self.streams.dup_stdin() {
            Ok(fd) => fd,
            Err(e) => {
                report.pipeline_errors.push(e);
                return pending;
            }
        };

        let count = pipeline.len();
        for (index, stage) in pipeline.stages().iter().enumerate() {
            let last = index + 1 == count;
            let (outgoing, next_incoming) = match self.connect(last) {
                Ok(ends) => ends,
                Err(e) => {
                    log::warn!("aborting pipeline at stage {}: {e}", index + 1);
                    report.pipeline_errors.push(e);
                    return pending;
                }
            };

            let (outcome, output) = self.launch(stage, incoming, outgoing, last);
            let fatal = matches!(&outcome, StageOutcome::LaunchFailed(e) if e.is_fatal_to_pipeline());
            report.stages[index].outcome = outcome;
            pending.extend(output);

            if self.env.should_exit {
                log::debug!("exit requested at stage {}", index + 1);
                report.exit_requested = true;
                return pending;
            }
            if fatal {
                log::warn!("aborting pipeline after stage {}", index + 1);
                return pending;
            }
            match next_incoming {
                Some(read_end) => incoming = read_end,
                None => return pending,
            }
        }
        pending
    }

    /// Outgoing descriptor for a stage, and the read end for the next one.
    fn connect(&self, last: bool) -> Result<(OwnedFd, Option<OwnedFd>), ShellError> {
        if last {
            return Ok((self.streams.dup_stdout()?, None));
        }
        let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|errno| exhaustion("create pipe", io::Error::from(errno)))?;
        Ok((write_end, Some(read_end)))
    }

    /// Start one stage. Both descriptors are consumed here: closed on return,
    /// or held by the returned [`PendingOutput`] of a builtin that is not last.
    fn launch(
        &mut self,
        stage: &Stage,
        incoming: OwnedFd,
        outgoing: OwnedFd,
        last: bool,
    ) -> (StageOutcome, Option<PendingOutput>) {
        if let Some(handler) = self.builtins.resolve(stage.name()) {
            log::debug!("builtin {}", stage.name());
            let args: Vec<&str> = stage.args().iter().map(String::as_str).collect();
            let mut stdin = File::from(incoming);
            if last {
                let mut stdout = File::from(outgoing);
                let result = handler.invoke(&args, &mut stdin, &mut stdout, self.env);
                return (StageOutcome::Builtin(result), None);
            }
            // Nothing reads the pipe yet, so a large listing would fill it.
            let mut buffer = Vec::new();
            let result = handler.invoke(&args, &mut stdin, &mut buffer, self.env);
            let output = (!buffer.is_empty()).then(|| PendingOutput {
                stage: stage.name().to_owned(),
                bytes: buffer,
                sink: File::from(outgoing),
            });
            return (StageOutcome::Builtin(result), output);
        }

        let spawned = ExternalCommand::resolve(self.env, stage)
            .and_then(|cmd| cmd.spawn(incoming, outgoing, self.env));
        let outcome = match spawned {
            Ok(pid) => {
                log::debug!("spawned {} as pid {pid}", stage.name());
                StageOutcome::Process { pid, status: None }
            }
            Err(e) => {
                log::debug!("launch of {} failed: {e}", stage.name());
                StageOutcome::LaunchFailed(e)
            }
        };
        (outcome, None)
    }
}

/// Output of a builtin waiting for its pipe's reader to be launched.
struct PendingOutput {
    stage: String,
    bytes: Vec<u8>,
    sink: File,
}

/// Write every pending builtin output to its pipe, then close the pipe.
///
/// A reader that already went away is not an error: the bytes are dropped,
/// as a process writing to that pipe would have been stopped by `SIGPIPE`.
fn deliver_all(pending: Vec<PendingOutput>, report: &mut ExecutionReport) {
    for PendingOutput {
        stage,
        bytes,
        mut sink,
    } in pending
    {
        match sink.write_all(&bytes).and_then(|()| sink.flush()) {
            Ok(()) => log::trace!("delivered {} byte(s) from {stage}", bytes.len()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                log::debug!("{stage}: reader closed before output was delivered");
            }
            Err(e) => report
                .pipeline_errors
                .push(ShellError::os(format!("{stage}: write error"), e)),
        }
    }
}

/// Wait for every process recorded in `report`, in whatever order they end.
///
/// Only children started by this pipeline are reaped. Other children of the
/// process keep their exit status for whoever started them.
fn reap_all(report: &mut ExecutionReport) {
    loop {
        let outstanding: Vec<Pid> = report
            .stages
            .iter()
            .filter_map(|s| match s.outcome {
                StageOutcome::Process { pid, status: None } => Some(pid),
                _ => None,
            })
            .collect();
        if outstanding.is_empty() {
            return;
        }

        let reaped = next_finished(&outstanding).and_then(|pid| retry(|| waitpid(pid, None)));
        let wait_status = match reaped {
            Ok(wait_status) => wait_status,
            Err(errno) => {
                report.pipeline_errors.push(ShellError::os(
                    format!("wait for {} process(es)", outstanding.len()),
                    io::Error::from(errno),
                ));
                return;
            }
        };

        let (pid, termination) = match wait_status {
            WaitStatus::Exited(pid, code) => (pid, Termination::Exited(code)),
            WaitStatus::Signaled(pid, signal, _) => (pid, Termination::Signaled(signal)),
            other => {
                log::trace!("ignoring wait status {other:?}");
                continue;
            }
        };

        let found = report.stages.iter_mut().enumerate().find_map(|(i, s)| {
            match &mut s.outcome {
                StageOutcome::Process { pid: p, status } if *p == pid && status.is_none() => {
                    *status = Some(termination);
                    Some(i)
                }
                _ => None,
            }
        });
        if let Some(index) = found {
            log::debug!(
                "reaped pid {pid} (stage {}): {termination}, status {}",
                index + 1,
                termination.code()
            );
            report.completion_order.push(index);
        }
    }
}

/// The next of `ours` to reap: the first to finish when it can be told.
///
/// Peeks with `WNOWAIT` so the status stays in place. When the finished
/// child is not one of `ours`, blocks on the oldest of `ours` instead.
fn next_finished(ours: &[Pid]) -> nix::Result<Pid> {
    let peeked = retry(|| waitid(Id::All, WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT))?;
    match peeked.pid() {
        Some(pid) if ours.contains(&pid) => Ok(pid),
        other => {
            log::debug!("finished child {other:?} is not part of this pipeline");
            ours.first().copied().ok_or(Errno::ECHILD)
        }
    }
}

fn retry<T>(mut call: impl FnMut() -> nix::Result<T>) -> nix::Result<T> {
    loop {
        match call() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DISPLAY_LIMIT;
    use crate::parser::parse;
    use serial_test::serial;
    use std::io::{Read, Seek, SeekFrom};

    struct Harness {
        env: Environment,
        builtins: BuiltinRegistry,
        streams: StdStreams,
        out: File,
    }

    impl Harness {
        fn new() -> Self {
            let out = tempfile::tempfile().expect("temp stdout");
            let stdin = File::open("/dev/null").expect("open /dev/null");
            let streams = StdStreams::new(stdin, out.try_clone().expect("dup temp stdout"));
            Self {
                env: Environment::new(100),
                builtins: BuiltinRegistry::default(),
                streams,
                out,
            }
        }

        fn run(&mut self, line: &str) -> ExecutionReport {
            let pipeline = parse(line).expect("valid pipeline");
            PipelineExecutor::new(&self.streams, &self.builtins, &mut self.env).run(&pipeline)
        }

        fn output(&mut self) -> String {
            let mut s = String::new();
            self.out.seek(SeekFrom::Start(0)).unwrap();
            self.out.read_to_string(&mut s).unwrap();
            s
        }
    }

    #[test]
    #[serial]
    fn empty_pipeline_is_a_noop() {
        let mut h = Harness::new();
        let report = PipelineExecutor::new(&h.streams, &h.builtins, &mut h.env)
            .run(&Pipeline::default());
        assert!(report.is_empty());
        assert_eq!(report.spawned(), 0);
        assert!(h.output().is_empty());
    }

    #[test]
    #[serial]
    fn single_command_uses_session_stdout() {
        let mut h = Harness::new();
        let report = h.run("echo hello");
        assert_eq!(report.spawned(), 1);
        assert_eq!(report.status(0), Some(Termination::Exited(0)));
        assert_eq!(report.completion_order, vec![0]);
        assert_eq!(h.output(), "hello\n");
    }

    #[test]
    #[serial]
    fn reaps_in_completion_order() {
        let mut h = Harness::new();
        let report = h.run("sleep 0.3 | false");
        assert_eq!(report.spawned(), 2);
        assert_eq!(report.completion_order, vec![1, 0]);
        assert_eq!(report.status(0), Some(Termination::Exited(0)));
        assert_eq!(report.status(1), Some(Termination::Exited(1)));
    }

    #[test]
    #[serial]
    fn spawn_failure_is_reported_for_that_stage_only() {
        let mut h = Harness::new();
        let report = h.run("pipeshell-no-such-command | echo after");

        assert!(matches!(
            report.stages[0].outcome,
            StageOutcome::LaunchFailed(ShellError::SpawnFailure { .. })
        ));
        assert_eq!(report.status(1), Some(Termination::Exited(0)));
        assert_eq!(report.errors().count(), 1);
        assert!(report.pipeline_errors.is_empty());
        assert_eq!(h.output(), "after\n");
    }

    #[test]
    #[serial]
    fn failed_middle_stage_closes_both_neighbours() {
        let mut h = Harness::new();
        let report = h.run("echo lost | pipeshell-no-such-command | cat");
        assert_eq!(report.spawned(), 2);
        assert_eq!(report.completion_order.len(), 2);
        assert_eq!(report.status(2), Some(Termination::Exited(0)));
        assert!(h.output().is_empty());
    }

    #[test]
    #[serial]
    fn exit_skips_the_rest_of_the_pipeline() {
        let mut h = Harness::new();
        let report = h.run("echo a | exit | echo b");
        assert!(report.exit_requested);
        assert!(h.env.should_exit);
        assert!(matches!(report.stages[1].outcome, StageOutcome::Builtin(Ok(()))));
        assert!(matches!(report.stages[2].outcome, StageOutcome::Skipped));
        assert_eq!(report.spawned(), 1);
        assert_eq!(report.completion_order, vec![0]);
        assert!(h.output().is_empty());
    }

    #[test]
    #[serial]
    fn builtin_errors_do_not_stop_the_pipeline() {
        let mut h = Harness::new();
        let report = h.run("history a b | echo next");
        assert!(matches!(
            report.stages[0].outcome,
            StageOutcome::Builtin(Err(ShellError::InvalidArguments { .. }))
        ));
        assert_eq!(report.status(1), Some(Termination::Exited(0)));
        assert_eq!(h.output(), "next\n");
    }

    #[test]
    #[serial]
    fn other_children_keep_their_status() {
        let mut h = Harness::new();
        let mut own = std::process::Command::new("sh")
            .args(["-c", "exit 7"])
            .spawn()
            .expect("spawn unrelated child");
        std::thread::sleep(std::time::Duration::from_millis(200));

        let report = h.run("sleep 0.2 | echo piped");
        assert_eq!(report.completion_order.len(), 2);
        assert_eq!(report.status(0), Some(Termination::Exited(0)));
        assert_eq!(h.output(), "piped\n");

        let status = own.wait().expect("unrelated child still waitable");
        assert_eq!(status.code(), Some(7));
    }

    #[test]
    #[serial]
    fn builtin_output_larger_than_a_pipe_reaches_the_next_stage() {
        let mut h = Harness::new();
        let long = "x".repeat(20_000);
        for i in 0..10 {
            h.env.history.push(format!("true {i} {long}"));
        }

        let report = h.run("history | wc -c");
        let expected: usize = h
            .env
            .history
            .tail(DISPLAY_LIMIT)
            .map(|(ordinal, line)| crate::history::format_entry(ordinal, line).len() + 1)
            .sum();
        assert!(expected > 128 * 1024);
        assert!(matches!(report.stages[0].outcome, StageOutcome::Builtin(Ok(()))));
        assert_eq!(report.status(1), Some(Termination::Exited(0)));
        assert_eq!(h.output().trim(), expected.to_string());
    }

    #[test]
    #[serial]
    fn builtin_output_to_a_failed_stage_is_dropped() {
        let mut h = Harness::new();
        h.env.history.push("echo one");
        let report = h.run("history | pipeshell-no-such-command | cat");
        assert!(report.pipeline_errors.is_empty());
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.status(2), Some(Termination::Exited(0)));
        assert!(h.output().is_empty());
    }
}
