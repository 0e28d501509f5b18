//! Tile transport abstraction
//!
//! The fetch pipeline retrieves tile bytes through [`AsyncHttpClient`]. The
//! default implementation, [`AsyncReqwestClient`], applies each layer's
//! [`NetworkOptions`](crate::layer::NetworkOptions) headers and timeout.
//!
//! ```ignore
//! use tilestream::provider::AsyncReqwestClient;
//!
//! let client = AsyncReqwestClient::with_timeout(10)?;
//! ```

mod http;
mod types;

pub use http::{AsyncHttpClient, AsyncReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use types::TransportError;

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
