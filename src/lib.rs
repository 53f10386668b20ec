//! # rustcrossref
//!
//! Fault-tolerant pagination over the Crossref REST API.
//!
//! ## Modules
//!
//! - [`paginate`] - Cursor/offset paginator with backoff and page-size shrink
//! - [`client`] - Crossref API client contract and reqwest implementation
//! - [`rate_limit`] - Shared call-rate limiter
//! - [`progress`] - Progress reporting capability
//! - [`works`] - Flat summaries of work records
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use rustcrossref::{ClientConfig, CrossrefClient, PaginateOptions, Paginator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(CrossrefClient::new(ClientConfig::default())?);
//!     let options = PaginateOptions::default().cursor("*").max_items(100);
//!     let works: Vec<_> = Paginator::new(client).paginate(options).try_collect().await?;
//!     println!("Fetched {} works", works.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod paginate;
pub mod progress;
pub mod rate_limit;
pub mod works;

pub use client::{ApiClient, ApiResponse, ClientConfig, CrossrefClient};
pub use error::{CrossrefError, Result};
pub use paginate::{paginate, PaginateOptions, Paginator, Position, Record, RetryPolicy};
pub use progress::{ProgressFactory, ProgressReporter};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
