//! Errors that abort a whole run
//!
//! Everything here happens before the first file is processed (or while
//! writing a report); per-file problems never surface as a `TaggerError`.

use crate::catalog::CatalogError;
use crate::mapping::PlanError;
use crate::scanner::ScanError;
use thiserror::Error;

/// Exit code for configuration and startup errors
pub const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Debug, Error)]
pub enum TaggerError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] vmt_common::Error),

    /// Built-in or configured plan rejected
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Input selection failed
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Catalog client could not be built (missing credential, TLS setup)
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Backup directory not found: {0}")]
    RestoreSourceMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaggerError {
    pub fn exit_code(&self) -> u8 {
        EXIT_CONFIG_ERROR
    }
}

pub type Result<T> = std::result::Result<T, TaggerError>;
