#![doc = "catalog-migrate: CLI glue over catalog-migrate-core."]

//! Config loading, HTTP clients for the source repository and the target
//! document store, and the command-line entrypoint.

pub mod cli;
pub mod load_config;
pub mod source;
pub mod upload;

pub use cli::{run, Cli, Commands};
