//! Consilium Core Library
//!
//! This crate provides the foundational utilities shared by every Consilium crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - The `Domain` tag used by experts and knowledge snippets

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::ConsiliumConfig;
pub use domain::Domain;
pub use error::{AppError, AppResult};
