//! Core type definitions used across the Stint workspace.

pub mod id;

pub use id::*;
