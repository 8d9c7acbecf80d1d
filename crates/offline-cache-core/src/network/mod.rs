//! Network access for the proxy.
//!
//! The proxy only needs one primitive: perform a request and get back either
//! a response (any status) or a transport failure. [`Network`] captures that,
//! and [`HttpNetwork`] implements it on top of `reqwest`.

pub mod client;
pub mod error;

pub use client::{HttpNetwork, Network, NetworkFuture};
pub use error::NetworkError;
