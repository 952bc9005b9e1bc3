//! # VMT Common Library
//!
//! Shared code for the video metadata tagger workspace:
//! - Error type shared by configuration and startup code
//! - Layered TOML configuration (defaults, files, command-line overrides)
//! - Tracing subscriber initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
