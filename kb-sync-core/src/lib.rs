#![doc = "kb-sync-core: core logic library for kb-sync."]

//! This crate contains the synchronisation logic for pushing local files into a
//! knowledge base's file data source: existence checks, the two-phase upload,
//! the registered-file merge and the reprocessing trigger.
//! Transport (HTTP, authentication) is not included here; it is supplied through
//! the [`contract::KnowledgeBaseApi`] trait.
//!
//! # Usage
//! Build a [`config::SyncConfig`], hand an API implementation to
//! [`synchronise::synchronise`], and print the returned report.

pub mod config;
pub mod contract;
pub mod file_set;
pub mod registry;
pub mod synchronise;
pub mod uploader;
