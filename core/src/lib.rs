//! Client for the Geckoboard datasets API.
//!
//! # Overview
//! Define a dataset schema, create or update it on the server, and push rows
//! to it either incrementally (append) or as a full overwrite (replace).
//!
//! ```no_run
//! # use geckoboard_core::{Client, Dataset, Field, TimeUnit};
//! # use tokio_util::sync::CancellationToken;
//! # #[tokio::main]
//! # async fn main() -> Result<(), geckoboard_core::Error> {
//! let client = Client::new("api-key");
//! let dataset = Dataset::new("sales.by_day")
//!     .with_field("day", Field::date("Day"))
//!     .with_field("amount", Field::money("Amount", "USD"))
//!     .with_field("call_time", Field::duration("Call time", TimeUnit::Seconds).optional())
//!     .with_unique_by(["day"]);
//!
//! let cancel = CancellationToken::new();
//! client.datasets().find_or_create(&cancel, &dataset).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - `Client` is an immutable handle (base URL, API key, HTTP client) that is
//!   cheap to clone and share between tasks.
//! - `DatasetService` does the batching; `Client` authenticates, sends and
//!   classifies each request.
//! - Every operation takes a `CancellationToken`; cancelling it aborts the
//!   in-flight request and stops any remaining batches.
//! - There is no retry policy. Errors are returned to the caller as-is.

pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod http;
pub mod types;

pub use client::{check_response, Client};
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use dataset::{batch_ranges, DatasetService, DEFAULT_MAX_RECORDS_PER_REQUEST};
pub use error::{ApiError, Detail, Error, Result, UrlError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use types::{Data, DataPayload, DataRow, Dataset, Field, FieldKind, TimeUnit};
