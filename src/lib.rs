//! Provisioning for QIIME 2 on disposable Linux hosts
//!
//! Installs three layers in order and checks that the result works:
//!
//! 1. a Miniforge runtime (`conda`/`mamba`) under a fixed prefix,
//! 2. a QIIME 2 environment created from the release's manifest,
//! 3. a plugin (Empress by default) installed with the environment's `pip`.
//!
//! Every stage is skipped when its target already works, so re-running on a
//! half-provisioned host resumes where the last run stopped.
//!
//! # Example
//!
//! ```no_run
//! use q2_provision::{ProcessEnv, ProvisioningPipeline, Settings, SystemRunner, resolve};
//!
//! let stack = resolve("2024.2")?;
//! let runner = SystemRunner::new().progress(true);
//! let mut pipeline = ProvisioningPipeline::new(Settings::default(), stack, runner, ProcessEnv::capture());
//! pipeline.run()?;
//! # Ok::<(), q2_provision::ProvisionError>(())
//! ```
//!
//! # Version table
//!
//! | Release             | Manifest tag | Distribution |
//! |---------------------|--------------|--------------|
//! | before 2021.4       | `py36`       | core         |
//! | 2021.4 to 2023.7    | `py38`       | core         |
//! | 2023.9 to 2024.2    | `py38`       | amplicon     |
//! | 2024.5              | `py39`       | amplicon     |
//! | 2024.10 and later   | `py310`      | amplicon     |

mod core;

pub use crate::core::cleanup::{CleanupReport, remove_artifacts};
pub use crate::core::config::{Downloader, Markers, Settings};
pub use crate::core::env::{ProcessEnv, Publication, Unpublished, describe_unpublished, publish};
pub use crate::core::error::{CommandFailure, FailureKind, ProvisionError};
pub use crate::core::gate::{Probe, should_skip};
pub use crate::core::output;
pub use crate::core::pipeline::{PipelineState, PlanEntry, ProvisioningPipeline, Stage, StageOutcome};
pub use crate::core::runner::{CommandRunner, SPAWN_FAILURE_CODE, StageResult, SystemRunner};
pub use crate::core::verify::{ImportCheck, check_import, verify_command_line};
pub use crate::core::version::{DEFAULT_VERSION, Distribution, StackConfig, VersionSpec, resolve};
