//! Core types for the oxidized-vita emulator
//!
//! This crate provides the error types, configuration and logging
//! infrastructure shared by the shader and kernel crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{EmulatorError, Result};
