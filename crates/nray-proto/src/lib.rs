//! Length-delimited, optionally TLS-wrapped request/reply transport
//! shared by `nray-server` and `nray-node`.

pub mod codec;
pub mod connection;
pub mod tls;

pub use connection::{Connection, DEFAULT_DEADLINE};
