//! Command Line Interface (CLI) layer for landsatpro.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) that turns flags and presets into
//! a pipeline run. For programmatic use, prefer `landsatpro::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
