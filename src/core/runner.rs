//! External command execution
//!
//! [`CommandRunner`] is the single seam between provisioning logic and the
//! outside world. Success is an exit code of zero plus, optionally, a marker
//! substring somewhere in stdout or stderr.

use std::process::{Command, Stdio};

use super::env::ProcessEnv;
use super::output;

/// Exit code reported when a command could not be started at all.
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// Outcome of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub succeeded: bool,
    /// -1 if the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StageResult {
    /// Classify a finished command.
    pub fn classify(exit_code: i32, stdout: String, stderr: String, marker: Option<&str>) -> Self {
        let succeeded =
            exit_code == 0 && marker.is_none_or(|m| format!("{}{}", stdout, stderr).contains(m));
        Self {
            succeeded,
            exit_code,
            stdout,
            stderr,
        }
    }

    /// A command that never ran.
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            exit_code: SPAWN_FAILURE_CODE,
            stdout: String::new(),
            stderr: message.into(),
        }
    }

    /// stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Run `argv` with exactly the variables in `env`.
    ///
    /// Never fails for a non-zero exit; that is reported through
    /// [`StageResult::succeeded`].
    fn run(&mut self, argv: &[String], env: &ProcessEnv, marker: Option<&str>) -> StageResult;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, argv: &[String], env: &ProcessEnv, marker: Option<&str>) -> StageResult {
        (**self).run(argv, env, marker)
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    verbose: bool,
    progress: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo every command line before running it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Show a spinner while a command runs.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, argv: &[String], env: &ProcessEnv, marker: Option<&str>) -> StageResult {
        let Some((program, args)) = argv.split_first() else {
            return StageResult::spawn_failure("empty command line");
        };

        let display = argv.join(" ");
        if self.verbose {
            output::detail(&format!("exec: {}", display));
        }

        let pb = self
            .progress
            .then(|| output::spinner(&format!("run: {}", output::truncate(&display, 60))));

        let result = Command::new(program)
            .args(args)
            .env_clear()
            .envs(env.vars())
            .stdin(Stdio::null())
            .output();

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        match result {
            Ok(out) => StageResult::classify(
                out.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&out.stdout).into_owned(),
                String::from_utf8_lossy(&out.stderr).into_owned(),
                marker,
            ),
            Err(e) => StageResult::spawn_failure(format!("failed to start {}: {}", program, e)),
        }
    }
}
