//! Post-install verification
//!
//! The command-line check is fatal. The import check is advisory: a failed
//! import is reported with the full module search path but never changes the
//! exit status.

use std::path::PathBuf;

use super::config::Settings;
use super::env::{PYTHONPATH_VAR, ProcessEnv, Publication, describe_unpublished};
use super::error::{CommandFailure, ProvisionError};
use super::runner::{CommandRunner, StageResult};

/// Executable used for the command-line check.
///
/// Falls back to the bare name, resolved through the published `PATH`,
/// when the environment's own executable is missing.
pub fn cli_executable(settings: &Settings) -> String {
    let exe = settings.env_bin(&settings.env_executable);
    if exe.exists() {
        exe.display().to_string()
    } else {
        settings.env_executable.clone()
    }
}

/// Interpreter used for the import check.
pub fn python_executable(settings: &Settings) -> String {
    let exe = settings.env_bin("python");
    if exe.exists() {
        exe.display().to_string()
    } else {
        "python3".to_string()
    }
}

/// Run `<executable> info` and require the release marker.
pub fn verify_command_line<R: CommandRunner + ?Sized>(
    runner: &mut R,
    settings: &Settings,
    env: &ProcessEnv,
) -> Result<StageResult, ProvisionError> {
    let argv = vec![cli_executable(settings), "info".to_string()];
    let marker = settings.markers.env_release.as_str();
    let result = runner.run(&argv, env, Some(marker));

    if result.succeeded {
        Ok(result)
    } else {
        Err(ProvisionError::Verification {
            what: format!("`{} info`", settings.env_executable),
            failure: Box::new(CommandFailure::new(&argv, Some(marker), result)),
        })
    }
}

/// Outcome of importing the installed library.
#[derive(Debug, Clone)]
pub struct ImportCheck {
    pub argv: Vec<String>,
    pub result: StageResult,
    pub module_search_path: Vec<PathBuf>,
}

impl ImportCheck {
    pub fn imported(&self) -> bool {
        self.result.succeeded
    }

    /// Explanation of a failed import, including search-path state.
    pub fn describe_failure(&self, publication: Option<&Publication>) -> String {
        let mut lines = vec![
            format!("Command: {}", self.argv.join(" ")),
            format!("Return code: {}", self.result.exit_code),
        ];
        let error = self.result.combined_output();
        let error = error.trim();
        if !error.is_empty() {
            lines.push(format!("Error: {}", error));
        }

        if self.module_search_path.is_empty() {
            lines.push(format!("{} is empty", PYTHONPATH_VAR));
        } else {
            lines.push(format!("{}:", PYTHONPATH_VAR));
            lines.extend(self.module_search_path.iter().map(|p| format!("  {}", p.display())));
        }

        match publication {
            Some(p) => {
                if let Some(ref problem) = p.site_packages_problem {
                    lines.push(describe_unpublished("site-packages", &p.site_packages, problem));
                }
                if let Some(ref problem) = p.bin_problem {
                    lines.push(describe_unpublished("bin", &p.bin_dir, problem));
                }
            }
            None => lines.push("environment was never published".to_string()),
        }

        lines.join("\n")
    }
}

/// Try to import the installed library with the environment's interpreter.
pub fn check_import<R: CommandRunner + ?Sized>(
    runner: &mut R,
    settings: &Settings,
    env: &ProcessEnv,
) -> ImportCheck {
    let argv = vec![
        python_executable(settings),
        "-c".to_string(),
        format!("import {}", settings.library),
    ];
    let result = runner.run(&argv, env, None);

    ImportCheck {
        argv,
        result,
        module_search_path: env.path_list(PYTHONPATH_VAR),
    }
}
