//! Covenant-core: Shared types, errors, configuration, and collaborator traits
//!
//! This crate provides the foundational types used across the Covenant workspace.

pub mod clock;
pub mod collab;
pub mod config;
pub mod errors;
pub mod memory;
pub mod types;

pub use clock::*;
pub use collab::*;
pub use config::*;
pub use errors::*;
pub use types::*;
