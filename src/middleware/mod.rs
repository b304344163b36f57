//! HTTP middleware
//!
//! - `client_addr`: caller address from proxy headers or the socket peer
//! - `auth`: bearer token extractor
//! - `rate_limit`: per-address fixed-window limiter layer

pub mod auth;
pub mod client_addr;
pub mod rate_limit;
