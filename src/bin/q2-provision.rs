//! q2-provision CLI
//!
//! Usage:
//!   q2-provision                   Install the default QIIME 2 release
//!   q2-provision 2023.9            Install a specific release
//!   q2-provision --dry-run         Show what would run

use anyhow::{Context, Result};
use clap::Parser;
use q2_provision::{
    DEFAULT_VERSION, Downloader, ProcessEnv, ProvisionError, ProvisioningPipeline, Settings,
    StackConfig, SystemRunner, output, resolve,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "q2-provision")]
#[command(about = "Install Miniforge, QIIME 2 and plugins on a disposable Linux host")]
#[command(version)]
struct Cli {
    /// QIIME 2 release to install, e.g. 2024.2
    #[arg(value_name = "VERSION", default_value = DEFAULT_VERSION)]
    release: String,

    /// Miniforge installation prefix
    #[arg(long, env = "Q2_RUNTIME_PREFIX")]
    runtime_prefix: Option<PathBuf>,

    /// QIIME 2 environment prefix
    #[arg(long, env = "Q2_ENV_PREFIX")]
    env_prefix: Option<PathBuf>,

    /// Directory for downloaded installer and manifest
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(short, long, env = "Q2_PROVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Tool used for downloads
    #[arg(long, value_enum)]
    downloader: Option<Downloader>,

    /// Plugin to pip-install into the environment
    #[arg(long, conflicts_with = "no_plugin")]
    plugin: Option<String>,

    /// Do not install any plugin
    #[arg(long)]
    no_plugin: bool,

    /// Print the resolved configuration and stage plan without installing
    #[arg(long)]
    dry_run: bool,

    /// Echo every external command
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            let code = err
                .downcast_ref::<ProvisionError>()
                .map(ProvisionError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // Resolve before touching anything so a bad version never starts the pipeline.
    let stack = resolve(&cli.release)?;
    let settings = load_settings(&cli)?;

    if cli.dry_run {
        print_plan(settings, stack, cli.verbose);
        return Ok(());
    }

    std::fs::create_dir_all(&settings.work_dir).with_context(|| {
        format!("Failed to create work directory: {}", settings.work_dir.display())
    })?;

    let runner = SystemRunner::new().verbose(cli.verbose).progress(true);
    let mut pipeline = ProvisioningPipeline::new(settings, stack, runner, ProcessEnv::capture());
    pipeline.run()?;

    for (stage, outcome) in &pipeline.state().outcomes {
        if let Some(kind) = outcome.failure_kind() {
            output::warning(&format!("{} stage: {} (see above)", stage, kind));
        }
    }
    Ok(())
}

/// Defaults, then the settings file, then flags.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let config_path = cli.config.clone().or_else(Settings::default_path);
    let mut settings = Settings::load(config_path.as_deref())?;

    if let Some(ref prefix) = cli.runtime_prefix {
        settings.runtime_prefix = prefix.clone();
    }
    if let Some(ref prefix) = cli.env_prefix {
        settings.env_prefix = prefix.clone();
    }
    if let Some(ref dir) = cli.work_dir {
        settings.work_dir = dir.clone();
    }
    if let Some(downloader) = cli.downloader {
        settings.downloader = downloader;
    }
    if cli.plugin.is_some() {
        settings.set_plugin(cli.plugin.clone());
    }
    if cli.no_plugin {
        settings.set_plugin(None);
    }

    Ok(settings)
}

fn print_plan(settings: Settings, stack: StackConfig, verbose: bool) {
    output::info(&format!("QIIME 2 {}", stack.version));
    output::detail(&format!("distribution: {}", stack.distribution));
    output::detail(&format!(
        "python: {}.{} ({})",
        stack.python_compat.0, stack.python_compat.1, stack.runtime_tag
    ));
    output::detail(&format!("manifest: {}", stack.artifact_url));
    output::detail(&format!("downloader: {}", settings.downloader));
    output::detail(&format!("runtime prefix: {}", settings.runtime_prefix.display()));
    output::detail(&format!("environment prefix: {}", settings.env_prefix.display()));

    let runner = SystemRunner::new().verbose(verbose);
    let mut pipeline = ProvisioningPipeline::new(settings, stack, runner, ProcessEnv::capture());
    output::info("Plan:");
    for entry in pipeline.plan() {
        let line = format!("{:<12} {}", entry.stage.name(), entry.reason);
        if entry.skip {
            output::skip(&format!("skip {}", line));
        } else {
            output::sub_action(&format!("run  {}", line));
        }
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<ProvisionError>() {
        Some(provision) => {
            let text = provision.to_string();
            let mut lines = text.lines();
            output::error(lines.next().unwrap_or("provisioning failed"));
            let rest: Vec<&str> = lines.collect();
            if !rest.is_empty() {
                output::diagnostic(&rest.join("\n"));
            }
        }
        None => output::error(&format!("{:#}", err)),
    }
}
