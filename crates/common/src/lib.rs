//! Common utilities and shared types for rmadesk.
//!
//! This crate provides foundational components used across all rmadesk crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based row identifiers and RMA numbers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use rmadesk_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let rma = id_gen.generate_rma_number(2025);
//!     println!("{} listening on port {}", rma, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{ArchivalConfig, AuthConfig, Config, StaffAccount, StaffRole};
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, RmaNumber};
