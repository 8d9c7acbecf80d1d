//! Request and response types flowing through the proxy.
//!
//! These are owned, cloneable values: a [`Response`] can be duplicated before
//! it is handed back to the caller so a copy can be written to the cache.

mod request;
mod response;

pub use request::Request;
pub use response::Response;

pub use reqwest::Method;
