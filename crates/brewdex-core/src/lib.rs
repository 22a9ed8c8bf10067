//! Core types and trait definitions for the brewdex catalog.
//!
//! This crate is deliberately free of async runtime and database
//! dependencies. Every other crate depends on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod draft;
pub mod error;
pub mod merge;
pub mod query;
pub mod record;
pub mod store;

pub use error::{Error, Result};
