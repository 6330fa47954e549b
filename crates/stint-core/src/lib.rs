//! # stint-core
//!
//! Core crate for Stint. Contains configuration schemas, typed
//! identifiers and the unified error system shared by the store,
//! the worker and the command-line binary.
//!
//! This crate has **no** internal dependencies on other Stint crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
