//! Camembert Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the Camembert workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Errors**: [`CommonError`] for invalid settings and subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use camembert_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> camembert_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
