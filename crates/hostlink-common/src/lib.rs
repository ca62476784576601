//! # hostlink-common
//!
//! Shared types, error definitions, configuration models, and protocol
//! constants used across the entire hostlink workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the primitives that the wire codec and the
//! reporter build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
