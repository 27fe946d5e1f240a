//! Provisioning pipeline
//!
//! The stage order is fixed:
//! 1. runtime      - install Miniforge unless `conda info` already works
//! 2. environment  - create the QIIME 2 environment unless `qiime info` already works
//! 3. publish      - put the environment on PATH / PYTHONPATH (always)
//! 4. plugin       - pip-install the plugin (advisory)
//! 5. verify       - `qiime info` must report a release (fatal)
//! 6. import       - `python -c "import qiime2"` (advisory)
//! 7. cleanup      - delete downloaded installer and manifest
//!
//! Any fatal failure stops the run immediately; nothing after it executes.

use std::fmt;
use std::path::{Path, PathBuf};

use super::cleanup;
use super::config::Settings;
use super::env::{self, ProcessEnv, Publication};
use super::error::{CommandFailure, FailureKind, ProvisionError};
use super::gate::{self, Probe};
use super::output;
use super::runner::{CommandRunner, StageResult};
use super::verify;
use super::version::{StackConfig, url_filename};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Runtime,
    Environment,
    Publish,
    Plugin,
    Verify,
    Import,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Runtime,
        Stage::Environment,
        Stage::Publish,
        Stage::Plugin,
        Stage::Verify,
        Stage::Import,
        Stage::Cleanup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Runtime => "runtime",
            Stage::Environment => "environment",
            Stage::Publish => "publish",
            Stage::Plugin => "plugin",
            Stage::Verify => "verify",
            Stage::Import => "import",
            Stage::Cleanup => "cleanup",
        }
    }

    fn number(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Executed,
    Skipped,
    /// Stage failed in a way that does not affect the exit status
    Advisory(String),
}

impl StageOutcome {
    /// Failure category recorded by this outcome, if any.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            StageOutcome::Advisory(_) => Some(FailureKind::Advisory),
            StageOutcome::Executed | StageOutcome::Skipped => None,
        }
    }
}

/// What happened during one run.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub outcomes: Vec<(Stage, StageOutcome)>,
    pub runtime_prefix: PathBuf,
    pub env_prefix: PathBuf,
    /// Files downloaded during this run
    pub artifacts: Vec<PathBuf>,
    /// Environment handed to every child process
    pub env: ProcessEnv,
    pub publication: Option<Publication>,
    /// Files removed by cleanup
    pub removed: Vec<PathBuf>,
}

impl PipelineState {
    fn new(settings: &Settings, env: ProcessEnv) -> Self {
        Self {
            outcomes: Vec::new(),
            runtime_prefix: settings.runtime_prefix.clone(),
            env_prefix: settings.env_prefix.clone(),
            artifacts: Vec::new(),
            env,
            publication: None,
            removed: Vec::new(),
        }
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.outcomes.push((stage, outcome));
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|(s, _)| *s == stage).map(|(_, o)| o)
    }

    pub fn was_skipped(&self, stage: Stage) -> bool {
        self.outcome(stage) == Some(&StageOutcome::Skipped)
    }

    pub fn was_executed(&self, stage: Stage) -> bool {
        self.outcome(stage) == Some(&StageOutcome::Executed)
    }

    /// Advisory failures, in stage order.
    pub fn advisories(&self) -> impl Iterator<Item = (Stage, &str)> {
        self.outcomes.iter().filter_map(|(stage, outcome)| match outcome {
            StageOutcome::Advisory(detail) => Some((*stage, detail.as_str())),
            _ => None,
        })
    }
}

/// One line of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub stage: Stage,
    pub skip: bool,
    pub reason: String,
}

impl PlanEntry {
    fn run(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            skip: false,
            reason: reason.into(),
        }
    }

    fn skip(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            skip: true,
            reason: reason.into(),
        }
    }
}

/// Drives all stages for one requested stack.
pub struct ProvisioningPipeline<R> {
    settings: Settings,
    stack: StackConfig,
    runner: R,
    state: PipelineState,
}

impl<R: CommandRunner> ProvisioningPipeline<R> {
    pub fn new(settings: Settings, stack: StackConfig, runner: R, env: ProcessEnv) -> Self {
        let state = PipelineState::new(&settings, env);
        Self {
            settings,
            stack,
            runner,
            state,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stack(&self) -> &StackConfig {
        &self.stack
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Local path of the downloaded manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.settings.work_dir.join(&self.stack.artifact_filename)
    }

    /// Run every stage in order.
    pub fn run(&mut self) -> Result<(), ProvisionError> {
        output::action(&format!(
            "Provisioning QIIME 2 {} (Python {}.{}, {} distribution)",
            self.stack.version,
            self.stack.python_compat.0,
            self.stack.python_compat.1,
            self.stack.distribution
        ));
        output::detail(&format!("runtime prefix: {}", self.settings.runtime_prefix.display()));
        output::detail(&format!("environment prefix: {}", self.settings.env_prefix.display()));

        self.install_runtime()?;
        self.create_environment()?;
        self.publish_environment();
        self.install_plugin();
        self.verify()?;
        self.check_import();
        self.cleanup();

        let advisories = self.state.advisories().count();
        if advisories == 0 {
            output::success(&format!("QIIME 2 {} is ready", self.stack.version));
        } else {
            output::success(&format!(
                "QIIME 2 {} is ready ({} advisory warning{})",
                self.stack.version,
                advisories,
                if advisories == 1 { "" } else { "s" }
            ));
        }
        Ok(())
    }

    /// Evaluate the skip gates without installing anything.
    pub fn plan(&mut self) -> Vec<PlanEntry> {
        let mut entries = Vec::with_capacity(Stage::ALL.len());

        entries.push(if self.runtime_present() {
            PlanEntry::skip(Stage::Runtime, "conda already reports a version")
        } else {
            PlanEntry::run(
                Stage::Runtime,
                format!("install {}", url_filename(&self.settings.runtime_installer_url)),
            )
        });

        entries.push(if self.environment_present() {
            PlanEntry::skip(Stage::Environment, "environment already reports a release")
        } else {
            PlanEntry::run(
                Stage::Environment,
                format!("create from {}", self.stack.artifact_url),
            )
        });

        entries.push(PlanEntry::run(Stage::Publish, "always"));

        entries.push(match self.settings.plugin.clone() {
            None => PlanEntry::skip(Stage::Plugin, "no plugin configured"),
            Some(plugin) if self.plugin_present(&plugin) => {
                PlanEntry::skip(Stage::Plugin, format!("{} already installed", plugin))
            }
            Some(plugin) => PlanEntry::run(Stage::Plugin, format!("pip install {}", plugin)),
        });

        entries.push(PlanEntry::run(Stage::Verify, format!("{} info", self.settings.env_executable)));
        entries.push(PlanEntry::run(Stage::Import, format!("import {}", self.settings.library)));
        entries.push(PlanEntry::run(Stage::Cleanup, "remove downloaded files"));
        entries
    }

    fn header(&self, stage: Stage) {
        output::stage(stage.number(), Stage::ALL.len(), stage.name());
    }

    fn run_checked(
        &mut self,
        argv: &[String],
        marker: Option<&str>,
    ) -> Result<StageResult, Box<CommandFailure>> {
        let result = self.runner.run(argv, &self.state.env, marker);
        if result.succeeded {
            Ok(result)
        } else {
            Err(Box::new(CommandFailure::new(argv, marker, result)))
        }
    }

    fn download(&mut self, url: &str, dest: &Path, what: &str) -> Result<(), ProvisionError> {
        output::sub_action(&format!("downloading {}", url_filename(url)));
        let argv = self.settings.downloader.argv(url, dest);
        self.run_checked(&argv, None)
            .map_err(|failure| ProvisionError::Download {
                what: what.to_string(),
                failure,
            })?;
        self.state.artifacts.push(dest.to_path_buf());
        Ok(())
    }

    fn runtime_probe(&self) -> Probe {
        Probe::new(
            [self.settings.runtime_bin("conda").display().to_string(), "info".to_string()],
            self.settings.markers.runtime_probe.clone(),
        )
    }

    fn runtime_present(&mut self) -> bool {
        let conda = self.settings.runtime_bin("conda");
        let probe = self.runtime_probe();
        gate::should_skip(&mut self.runner, &self.state.env, &conda, Some(&probe))
    }

    fn environment_present(&mut self) -> bool {
        let exe = self.settings.env_bin(&self.settings.env_executable);
        let probe = Probe::new(
            [exe.display().to_string(), "info".to_string()],
            self.settings.markers.env_release.clone(),
        );
        gate::should_skip(&mut self.runner, &self.state.env, &exe, Some(&probe))
    }

    fn plugin_present(&mut self, plugin: &str) -> bool {
        let pip = self.settings.env_bin("pip");
        let probe = Probe::new(
            [pip.display().to_string(), "show".to_string(), plugin.to_string()],
            self.settings.markers.plugin_probe.clone(),
        );
        gate::should_skip(&mut self.runner, &self.state.env, &pip, Some(&probe))
    }

    fn install_runtime(&mut self) -> Result<(), ProvisionError> {
        self.header(Stage::Runtime);
        if self.runtime_present() {
            output::skip(&format!(
                "Miniforge already present at {}, skipping",
                self.settings.runtime_prefix.display()
            ));
            self.state.record(Stage::Runtime, StageOutcome::Skipped);
            return Ok(());
        }

        let installer = self.settings.installer_path();
        let url = self.settings.runtime_installer_url.clone();
        self.download(&url, &installer, "Miniforge installer")?;

        output::sub_action(&format!(
            "installing Miniforge to {}",
            self.settings.runtime_prefix.display()
        ));
        let argv = vec![
            "bash".to_string(),
            installer.display().to_string(),
            "-b".to_string(),
            "-f".to_string(),
            "-p".to_string(),
            self.settings.runtime_prefix.display().to_string(),
        ];
        let marker = self.settings.markers.runtime_install.clone();
        self.run_checked(&argv, Some(&marker))
            .map_err(|failure| ProvisionError::Install {
                what: "Miniforge".to_string(),
                failure,
            })?;

        if !self.runtime_present() {
            output::warning(&format!(
                "Miniforge installed but `conda info` does not report '{}'",
                self.settings.markers.runtime_probe
            ));
        }

        output::detail(&format!(
            "Miniforge installed to {}",
            self.settings.runtime_prefix.display()
        ));
        self.state.record(Stage::Runtime, StageOutcome::Executed);
        Ok(())
    }

    fn create_environment(&mut self) -> Result<(), ProvisionError> {
        self.header(Stage::Environment);
        if self.environment_present() {
            output::skip(&format!(
                "QIIME 2 already present at {}, skipping",
                self.settings.env_prefix.display()
            ));
            self.state.record(Stage::Environment, StageOutcome::Skipped);
            return Ok(());
        }

        let manifest = self.manifest_path();
        let url = self.stack.artifact_url.clone();
        self.download(&url, &manifest, "QIIME 2 environment manifest")?;

        let prefix = self.settings.env_prefix.clone();
        if prefix.symlink_metadata().is_ok() {
            output::sub_action(&format!("removing existing {}", prefix.display()));
            remove_path(&prefix).map_err(|source| ProvisionError::EnvironmentReset {
                prefix: prefix.clone(),
                source,
            })?;
        }

        output::sub_action(&format!(
            "creating QIIME 2 {} environment (this may take a while)",
            self.stack.version
        ));
        let mut argv = vec![
            self.settings
                .runtime_bin(&self.settings.package_manager)
                .display()
                .to_string(),
            "env".to_string(),
            "create".to_string(),
        ];
        argv.extend(self.settings.manager_flags.iter().cloned());
        argv.extend([
            "--prefix".to_string(),
            prefix.display().to_string(),
            "--file".to_string(),
            manifest.display().to_string(),
        ]);
        let marker = self.settings.markers.env_transaction.clone();
        self.run_checked(&argv, Some(&marker))
            .map_err(|failure| ProvisionError::EnvironmentCreation {
                prefix: prefix.clone(),
                failure,
            })?;

        output::detail(&format!(
            "QIIME 2 {} environment created at {}",
            self.stack.version,
            prefix.display()
        ));
        self.state.record(Stage::Environment, StageOutcome::Executed);
        Ok(())
    }

    fn publish_environment(&mut self) {
        self.header(Stage::Publish);
        let publication = env::publish(
            &self.state.env,
            &self.settings.env_prefix,
            self.stack.python_compat,
        );

        match publication.bin_problem {
            None => output::detail(&format!("added {} to PATH", publication.bin_dir.display())),
            Some(ref problem) => output::warning(&format!(
                "{}. PATH not updated",
                env::describe_unpublished("bin", &publication.bin_dir, problem)
            )),
        }
        match publication.site_packages_problem {
            None => output::detail(&format!(
                "added {} to PYTHONPATH",
                publication.site_packages.display()
            )),
            Some(ref problem) => output::warning(&format!(
                "{}. Imports might fail",
                env::describe_unpublished("site-packages", &publication.site_packages, problem)
            )),
        }

        self.state.env = publication.env.clone();
        self.state.publication = Some(publication);
        self.state.record(Stage::Publish, StageOutcome::Executed);
    }

    fn install_plugin(&mut self) {
        self.header(Stage::Plugin);
        let Some(plugin) = self.settings.plugin.clone() else {
            output::skip("no plugin configured, skipping");
            self.state.record(Stage::Plugin, StageOutcome::Skipped);
            return;
        };

        let pip = self.settings.env_bin("pip");
        if !pip.exists() {
            let detail = format!("pip not found at {}; {} not installed", pip.display(), plugin);
            output::warning(&detail);
            self.state.record(Stage::Plugin, StageOutcome::Advisory(detail));
            return;
        }

        if self.plugin_present(&plugin) {
            output::skip(&format!("{} already installed, skipping", plugin));
            self.state.record(Stage::Plugin, StageOutcome::Skipped);
            return;
        }

        output::sub_action(&format!("pip install {}", plugin));
        let argv = vec![pip.display().to_string(), "install".to_string(), plugin.clone()];
        let marker = format!("{} {}", self.settings.markers.plugin_install, plugin);
        match self.run_checked(&argv, Some(&marker)) {
            Ok(_) => {
                output::detail(&format!("{} installed", plugin));
                self.state.record(Stage::Plugin, StageOutcome::Executed);
            }
            Err(failure) => {
                output::warning(&format!("could not install {}", plugin));
                let detail = failure.to_string();
                output::diagnostic(&detail);
                self.state.record(Stage::Plugin, StageOutcome::Advisory(detail));
            }
        }
    }

    fn verify(&mut self) -> Result<(), ProvisionError> {
        self.header(Stage::Verify);
        verify::verify_command_line(&mut self.runner, &self.settings, &self.state.env)?;
        output::detail(&format!(
            "`{} info` reports a QIIME 2 release",
            self.settings.env_executable
        ));
        self.state.record(Stage::Verify, StageOutcome::Executed);
        Ok(())
    }

    fn check_import(&mut self) {
        self.header(Stage::Import);
        let check = verify::check_import(&mut self.runner, &self.settings, &self.state.env);
        if check.imported() {
            output::detail(&format!("{} can be imported", self.settings.library));
            self.state.record(Stage::Import, StageOutcome::Executed);
        } else {
            output::warning(&format!("{} could not be imported", self.settings.library));
            let detail = check.describe_failure(self.state.publication.as_ref());
            output::diagnostic(&detail);
            self.state.record(Stage::Import, StageOutcome::Advisory(detail));
        }
    }

    fn cleanup(&mut self) {
        self.header(Stage::Cleanup);
        let report = cleanup::remove_artifacts(&[self.settings.installer_path(), self.manifest_path()]);
        for path in &report.removed {
            output::detail(&format!("removed {}", path.display()));
        }
        for (path, err) in &report.failed {
            output::warning(&format!("could not remove {}: {}", path.display(), err));
        }
        self.state.removed = report.removed;
        self.state.record(Stage::Cleanup, StageOutcome::Executed);
    }
}

/// Remove a directory tree, a file or a symlink.
fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = path.symlink_metadata()?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
