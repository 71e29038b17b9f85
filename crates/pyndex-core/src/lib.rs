//! Core infrastructure for pyndex.
//!
//! This crate provides the language-agnostic pieces of the indexer:
//! - Kythe fact model: VNames, fact/edge entries, the de-duplicating store
//! - Newline-delimited JSON emission
//! - Error types and exit codes

pub mod error;
pub mod kythe;
