//! Shared types, errors, and configuration for the ledger platform.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - ISO 4217 currency codes
//! - Application-wide error types
//! - Configuration management
//! - Tracing subscriber setup for binaries

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::AppConfig;
pub use error::AppError;
