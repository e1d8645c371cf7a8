//! Stable machine id derivation (§4.G): an 8-hex-character identifier
//! derived from OS identifiers, so a node reconnecting after a restart
//! is recognized as the same machine by a pool that allows only one
//! registration per host. Falls back to a random id if the OS exposes
//! nothing stable to hash.

use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use sysinfo::System;

/// Derive (or, failing that, randomly generate) an 8-hex-character
/// machine id.
pub fn derive() -> String {
    let mut identifiers = Vec::new();
    if let Some(host) = System::host_name() {
        identifiers.push(host);
    }
    if let Some(os) = System::long_os_version() {
        identifiers.push(os);
    }
    if let Some(kernel) = System::kernel_version() {
        identifiers.push(kernel);
    }

    if identifiers.is_empty() {
        return random_id();
    }

    let mut hasher = DefaultHasher::new();
    for id in &identifiers {
        id.hash(&mut hasher);
    }
    format!("{:08x}", hasher.finish() as u32)
}

fn random_id() -> String {
    let value: u32 = rand::thread_rng().gen();
    format!("{value:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_is_eight_hex_chars() {
        let id = derive();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derivation_is_stable_across_calls() {
        assert_eq!(derive(), derive());
    }

    #[test]
    fn random_id_is_eight_hex_chars() {
        let id = random_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
