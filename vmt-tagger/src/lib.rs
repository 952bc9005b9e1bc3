//! vmt-tagger library interface
//!
//! Matches video files against a movie/TV catalog and writes the resulting
//! metadata with external tools. Exposed as a library for integration tests.

pub mod artifacts;
pub mod catalog;
pub mod cli;
pub mod error;
pub mod inspect;
pub mod mapping;
pub mod orchestrator;
pub mod provider;
pub mod resolver;
pub mod scanner;
pub mod writers;

pub use crate::error::{Result, TaggerError};
