//! CLI command implementations.

pub mod circuits;
pub mod common;
pub mod run;
pub mod targets;
