pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, RunConfig};

pub use core::{
    etl::EtlEngine,
    orchestrator::{BatchOptions, BatchOrchestrator},
    pipeline::FlattenPipeline,
};
pub use domain::services::{TimestampLayout, WideningPolicy};
pub use utils::error::{EtlError, Result};
