//! hnpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the hnpipe workspace members:
//!
//! - **Error Handling**: [`CommonError`] and its result alias
//! - **Environment**: typed readers for environment-driven configuration
//! - **Logging**: one-call `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use hnpipe_common::env::env_or;
//! use hnpipe_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let batch_size: usize = env_or("HNPIPE_BATCH_SIZE", 1000)?;
//!     tracing::info!(batch_size, "Configured");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
