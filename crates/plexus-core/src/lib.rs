//! # plexus-core
//!
//! Core crate for Plexus. Contains the configuration schemas and the
//! unified error system shared by the build-time manifest pipeline and
//! the runtime dispatch engine.
//!
//! This crate has **no** internal dependencies on other Plexus crates.

pub mod config;
pub mod error;
pub mod result;

pub use config::AppConfig;
pub use error::AppError;
pub use result::AppResult;
