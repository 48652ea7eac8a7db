pub mod context;
pub mod deploy;
pub mod error;
pub mod executor;
pub mod install;
pub mod lockfile;
pub mod manifest;
pub mod observability;
pub mod presets;
pub mod provision;
pub mod reporter;
pub mod runner;
pub mod shell;
pub mod validation;

pub use context::RunContext;
pub use error::RunnerError;
pub use executor::{RunVerdict, StageOutcome, StageStatus};
pub use manifest::Manifest;
pub use runner::{RunReport, run_pipeline};
