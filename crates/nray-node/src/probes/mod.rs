//! Built-in TCP/UDP port scanners (§4.I component I).

pub mod payloads;
pub mod tcp;
pub mod udp;
