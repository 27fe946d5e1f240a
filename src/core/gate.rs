//! Idempotency gates
//!
//! A stage is skipped when its target already exists and, if a probe is
//! given, the probe command reports the expected marker. This is the only
//! recovery mechanism: a re-run resumes by skipping finished stages.

use std::path::Path;

use super::env::ProcessEnv;
use super::runner::CommandRunner;

/// Command whose output proves a target is functional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub argv: Vec<String>,
    pub marker: String,
}

impl Probe {
    pub fn new<I, S>(argv: I, marker: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            marker: marker.into(),
        }
    }
}

/// Returns true if the stage guarding `target_path` can be skipped.
///
/// The probe is run at most once; it is never retried.
pub fn should_skip<R: CommandRunner + ?Sized>(
    runner: &mut R,
    env: &ProcessEnv,
    target_path: &Path,
    probe: Option<&Probe>,
) -> bool {
    if !target_path.exists() {
        return false;
    }

    match probe {
        None => true,
        Some(probe) => runner.run(&probe.argv, env, Some(&probe.marker)).succeeded,
    }
}
