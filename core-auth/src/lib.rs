//! # MediaServer Authentication
//!
//! Owns the MediaServer session: one bearer token per process, obtained with
//! a username/password login and shared by every request.
//!
//! ## Overview
//!
//! [`MediaServerSession`] is a single-flight token manager. Concurrent callers
//! of [`MediaServerSession::get_token`] never trigger more than one login at a
//! time; late arrivals wait on the login already in flight and receive the
//! same token or the same error. Downstream clients call
//! [`MediaServerSession::invalidate`] when the server rejects a token, and the
//! next `get_token` logs in again.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::MediaServerSession;
//!
//! let session = MediaServerSession::new(config.media_server.clone(), http_client);
//! let token = session.get_token().await?;
//! let header = session.authorization_header(Some(&token));
//! ```

pub mod error;
pub mod session;
pub mod types;

pub use error::{AuthError, Result};
pub use session::MediaServerSession;
pub use types::AuthSession;
