//! Provisioning error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::runner::StageResult;

/// Category a failure belongs to.
///
/// Everything except `Advisory` is fatal and maps to process exit status 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Download,
    Install,
    EnvironmentCreation,
    Verification,
    Advisory,
}

impl FailureKind {
    pub fn is_fatal(self) -> bool {
        !matches!(self, FailureKind::Advisory)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Configuration => "configuration error",
            FailureKind::Download => "download failure",
            FailureKind::Install => "install failure",
            FailureKind::EnvironmentCreation => "environment creation failure",
            FailureKind::Verification => "verification failure",
            FailureKind::Advisory => "advisory failure",
        };
        f.write_str(name)
    }
}

/// An external command that ran but did not succeed.
///
/// Rendering it yields the full diagnostic: command line, expected marker,
/// exit code and both output streams.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub command: String,
    pub marker: Option<String>,
    pub result: StageResult,
}

impl CommandFailure {
    pub fn new(argv: &[String], marker: Option<&str>, result: StageResult) -> Self {
        Self {
            command: argv.join(" "),
            marker: marker.map(str::to_string),
            result,
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Command: {}", self.command)?;
        if let Some(ref marker) = self.marker {
            writeln!(f, "Expected output: {:?}", marker)?;
        }
        writeln!(f, "Return code: {}", self.result.exit_code)?;
        writeln!(f, "Output (stdout):\n{}", self.result.stdout)?;
        write!(f, "Output (stderr):\n{}", self.result.stderr)
    }
}

/// Errors that abort provisioning.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("invalid stack version '{input}': {reason}")]
    Configuration { input: String, reason: String },

    #[error("could not download {what}\n{failure}")]
    Download {
        what: String,
        failure: Box<CommandFailure>,
    },

    #[error("could not install {what}\n{failure}")]
    Install {
        what: String,
        failure: Box<CommandFailure>,
    },

    #[error("could not create environment at {}\n{failure}", .prefix.display())]
    EnvironmentCreation {
        prefix: PathBuf,
        failure: Box<CommandFailure>,
    },

    #[error("could not remove existing environment at {}: {source}", .prefix.display())]
    EnvironmentReset {
        prefix: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} did not report the expected output\n{failure}")]
    Verification {
        what: String,
        failure: Box<CommandFailure>,
    },
}

impl ProvisionError {
    pub fn configuration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration { .. } => FailureKind::Configuration,
            Self::Download { .. } => FailureKind::Download,
            Self::Install { .. } => FailureKind::Install,
            Self::EnvironmentCreation { .. } | Self::EnvironmentReset { .. } => {
                FailureKind::EnvironmentCreation
            }
            Self::Verification { .. } => FailureKind::Verification,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// The captured command failure, when the error came from an external command.
    pub fn command_failure(&self) -> Option<&CommandFailure> {
        match self {
            Self::Download { failure, .. }
            | Self::Install { failure, .. }
            | Self::EnvironmentCreation { failure, .. }
            | Self::Verification { failure, .. } => Some(failure.as_ref()),
            Self::Configuration { .. } | Self::EnvironmentReset { .. } => None,
        }
    }
}
