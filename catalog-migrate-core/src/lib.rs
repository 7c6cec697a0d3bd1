#![doc = "catalog-migrate-core: core logic library for catalog-migrate."]

//! This crate contains the pipelines that move a content-store catalog from the
//! source repository into the target document store:
//!
//! - [`download`] fetches a content store (and, recursively, the stores it links to)
//!   into a [`hierarchy::Hierarchy`], reading through a [`cache::Cache`].
//! - [`merge`] folds several hierarchies into one canonical tree.
//! - [`flatten`] turns a tree into ordered [`flatten::FlatRow`]s and CSV.
//! - [`synthesize`] derives the target sheet and page documents from rows.
//! - [`upload`] pushes documents and images with bounded concurrency, then
//!   previews and publishes them.
//! - [`synchronise`] wires the phases together per store and collects a report.
//!
//! Transport and credentials are not part of this crate: the source and target
//! APIs are reached through the traits in [`contract`].

pub mod cache;
pub mod contract;
pub mod download;
pub mod error;
pub mod flatten;
pub mod hierarchy;
pub mod markup;
pub mod merge;
pub mod retry;
pub mod store;
pub mod synchronise;
pub mod synthesize;
pub mod upload;
