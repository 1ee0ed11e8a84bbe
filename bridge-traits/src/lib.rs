//! # Host Bridge Traits
//!
//! Seams between the metadata core and the outside world.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Outbound HTTP with bounded timeouts
//! - [`DatabaseAdapter`](database::DatabaseAdapter) - Row-oriented SQL access used by repositories
//! - [`Clock`](time::Clock) - Time source, injected so cache expiry and token
//!   lifetimes can be tested deterministically
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert their transport or driver errors into it and keep the
//! message actionable (URL, status, statement).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; implementations are shared behind `Arc`
//! across request handlers.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
//!
//! async fn fetch(client: &dyn HttpClient) -> bridge_traits::error::Result<String> {
//!     let request = HttpRequest::new(HttpMethod::Get, "https://example.com/Items")
//!         .timeout(std::time::Duration::from_secs(10));
//!     client.execute(request).await?.text()
//! }
//! ```

pub mod database;
pub mod error;
pub mod http;
pub mod time;

pub use database::{DatabaseAdapter, DatabaseConfig, QueryRow, QueryValue};
pub use error::BridgeError;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, SystemClock};
