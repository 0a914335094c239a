//! Command execution
//!
//! Every process the agent starts goes through an [`Executor`]. The real
//! implementation spawns the process with `duct`; [`RecordingExecutor`] keeps
//! a log of invocations and replays scripted exit statuses instead, which is
//! what the service and hook tests run against.
//!
//! [`CommandRunner`] wraps one shell command line, runs it as a given user and
//! records the outcome. [`CommandSequence`] chains runners with a per-step
//! policy, e.g. "check status, start only if that failed".

use crate::{Error, Result};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One process to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments, not including the program
    pub args: Vec<String>,
    /// Working directory; inherited when unset
    pub cwd: Option<PathBuf>,
    /// Extra environment variables on top of the inherited environment
    pub env: IndexMap<String, String>,
}

impl Invocation {
    /// Create an invocation with no working directory or extra environment
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: IndexMap::new(),
        }
    }

    /// Program followed by its arguments
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(self.argv()))
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit status; `-1` when the process was killed by a signal
    pub status: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ProcessOutput {
    /// Output with the given status and nothing captured
    #[must_use]
    pub fn with_status(status: i32) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Spawns processes on behalf of the engine
pub trait Executor {
    /// Run `invocation` to completion
    ///
    /// A non-zero exit is not an error; only a failure to spawn is.
    fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput>;

    /// Name of the user the agent itself runs as
    fn current_user(&self) -> Option<String> {
        uzers::get_current_username().and_then(|name| name.into_string().ok())
    }
}

/// Executor that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    #[tracing::instrument(skip(self), fields(command = %invocation))]
    fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let mut expression = duct::cmd(invocation.program.as_str(), &invocation.args);
        if let Some(cwd) = &invocation.cwd {
            expression = expression.dir(cwd);
        }
        for (key, value) in &invocation.env {
            expression = expression.env(key, value);
        }

        let output = expression
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                Error::command_failure(&invocation.program, format!("failed to spawn: {e}"))
            })?;

        let status = output.status.code().unwrap_or(-1);
        tracing::debug!(status, "Process finished");

        Ok(ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Executor that records invocations instead of spawning them
///
/// Outputs queued with [`push_status`](Self::push_status) or
/// [`push_output`](Self::push_output) are handed out in order; once the queue
/// is empty every invocation succeeds with empty output. Clones share the same
/// log, so a test can keep one handle and give another to the code under test.
#[derive(Debug, Clone)]
pub struct RecordingExecutor {
    log: Rc<RefCell<Vec<Invocation>>>,
    outputs: Rc<RefCell<VecDeque<ProcessOutput>>>,
    current_user: Option<String>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingExecutor {
    /// New recorder that reports `root` as the current user
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Rc::default(),
            outputs: Rc::default(),
            current_user: Some("root".to_string()),
        }
    }

    /// Report `user` as the current user
    #[must_use]
    pub fn with_current_user(mut self, user: impl Into<String>) -> Self {
        self.current_user = Some(user.into());
        self
    }

    /// Queue the exit status for the next unanswered invocation
    pub fn push_status(&self, status: i32) {
        self.push_output(ProcessOutput::with_status(status));
    }

    /// Queue a full output for the next unanswered invocation
    pub fn push_output(&self, output: ProcessOutput) {
        self.outputs.borrow_mut().push_back(output);
    }

    /// Every invocation seen so far
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.borrow().clone()
    }

    /// The shell command line of every invocation, in order
    ///
    /// For `sh -c CMD` and `su USER -c CMD` this is `CMD`; anything else is
    /// rendered as a quoted argv.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .map(|inv| match inv.args.as_slice() {
                [flag, cmd] if flag == "-c" => cmd.clone(),
                [_, flag, cmd] if flag == "-c" && inv.program == "su" => cmd.clone(),
                _ => inv.to_string(),
            })
            .collect()
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.log.borrow_mut().push(invocation.clone());
        Ok(self.outputs.borrow_mut().pop_front().unwrap_or_default())
    }

    fn current_user(&self) -> Option<String> {
        self.current_user.clone()
    }
}

/// One shell command line and, once run, its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRunner {
    command: String,
    cwd: Option<PathBuf>,
    env: IndexMap<String, String>,
    output: Option<ProcessOutput>,
}

impl CommandRunner {
    /// Wrap a shell command line
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: IndexMap::new(),
            output: None,
        }
    }

    /// Wrap an argv list, quoting it into a single command line
    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(shell_words::join(argv))
    }

    /// Run in `cwd`
    #[must_use]
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Add environment variables
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The wrapped command line
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit status, `None` until run
    #[must_use]
    pub fn status(&self) -> Option<i32> {
        self.output.as_ref().map(|o| o.status)
    }

    /// Whether the command ran and exited with status 0
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status() == Some(0)
    }

    /// Captured standard output
    #[must_use]
    pub fn stdout(&self) -> &str {
        self.output.as_ref().map_or("", |o| o.stdout.as_str())
    }

    /// Captured standard error
    #[must_use]
    pub fn stderr(&self) -> &str {
        self.output.as_ref().map_or("", |o| o.stderr.as_str())
    }

    /// The invocation that runs this command as `user`
    ///
    /// No elevation happens when `user` is already the current user.
    pub fn invocation(&self, executor: &dyn Executor, user: &str) -> Invocation {
        let mut invocation = if executor.current_user().as_deref() == Some(user) {
            Invocation::new("sh", ["-c", self.command.as_str()])
        } else {
            Invocation::new("su", [user, "-c", self.command.as_str()])
        };
        invocation.cwd.clone_from(&self.cwd);
        invocation.env.clone_from(&self.env);
        invocation
    }

    /// Run the command as `user` and record the outcome
    ///
    /// A non-zero exit is recorded, not raised. A process that could not be
    /// spawned is recorded with status `-1` and the error on stderr.
    #[must_use]
    pub fn run(mut self, executor: &dyn Executor, user: &str) -> Self {
        let invocation = self.invocation(executor, user);
        tracing::debug!(user, command = %self.command, "Running command");

        let output = executor.execute(&invocation).unwrap_or_else(|e| {
            tracing::warn!(command = %self.command, "{e}");
            ProcessOutput {
                status: -1,
                stdout: String::new(),
                stderr: e.to_string(),
            }
        });
        self.output = Some(output);
        self
    }
}

impl fmt::Display for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandRunner:\n\tcommand: {}", self.command)?;
        if let Some(status) = self.status()
            && status != 0
        {
            write!(f, "\n\tstatus: {status}")?;
        }
        if !self.stdout().is_empty() {
            write!(f, "\n\tstdout: {}", self.stdout())?;
        }
        if !self.stderr().is_empty() {
            write!(f, "\n\tstderr: {}", self.stderr())?;
        }
        Ok(())
    }
}

/// When a step of a [`CommandSequence`] runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Run regardless of the previous step
    Always,
    /// Run only if the previous executed step failed
    OnFailure,
    /// Run only if the previous executed step succeeded
    OnSuccess,
}

impl StepPolicy {
    fn allows(self, previous: Option<&CommandRunner>) -> bool {
        match (self, previous) {
            (Self::Always, _) | (_, None) => true,
            (Self::OnFailure, Some(prev)) => !prev.succeeded(),
            (Self::OnSuccess, Some(prev)) => prev.succeeded(),
        }
    }
}

/// A short, ordered list of commands with per-step run conditions
#[derive(Debug, Clone, Default)]
pub struct CommandSequence {
    steps: Vec<(StepPolicy, CommandRunner)>,
}

impl CommandSequence {
    /// Start a sequence with `first`, which always runs
    #[must_use]
    pub fn new(first: CommandRunner) -> Self {
        Self {
            steps: vec![(StepPolicy::Always, first)],
        }
    }

    /// Append a step
    #[must_use]
    pub fn then(mut self, policy: StepPolicy, runner: CommandRunner) -> Self {
        self.steps.push((policy, runner));
        self
    }

    /// Run the steps in order as `user`
    ///
    /// Returns the runners that actually executed.
    pub fn run(self, executor: &dyn Executor, user: &str) -> Vec<CommandRunner> {
        let mut executed: Vec<CommandRunner> = Vec::with_capacity(self.steps.len());
        for (policy, runner) in self.steps {
            if policy.allows(executed.last()) {
                executed.push(runner.run(executor, user));
            } else {
                tracing::trace!(command = runner.command(), ?policy, "Step skipped");
            }
        }
        executed
    }
}
