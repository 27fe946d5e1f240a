//! Provisioning core
//!
//! Version resolution, command execution, skip gates and the stage pipeline.

pub mod cleanup;
pub mod config;
pub mod env;
pub mod error;
pub mod gate;
pub mod output;
pub mod pipeline;
pub mod runner;
pub mod verify;
pub mod version;
