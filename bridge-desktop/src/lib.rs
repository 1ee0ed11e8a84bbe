//! # Desktop Bridge Implementations
//!
//! Native implementations of bridge traits for server and desktop hosts.
//!
//! - `HttpClient` using `reqwest` (rustls, pooled connections, bounded timeouts)
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bridge_desktop::ReqwestHttpClient;
//! use bridge_traits::HttpClient;
//!
//! let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_timeout(Duration::from_secs(10))?);
//! ```

mod http;

pub use http::ReqwestHttpClient;
