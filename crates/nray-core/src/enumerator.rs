//! Pseudo-random, stateless, full-coverage IPv4 address-space enumeration.
//!
//! Implements the cyclic multiplicative-group walk originally used by
//! ZMap/masscan-style scanners: pick a prime `p` just larger than the
//! block's address count, a generator `γ` of the group `(Z/pZ)*`, and
//! walk `c ← c·γ mod p` from a random start. Every residue in
//! `1..p-1` is visited exactly once before the walk returns to its
//! start; residues beyond the block's address count are skipped, and
//! host index `0` (outside the multiplicative group) is visited once
//! explicitly at the end of the walk.

use crate::blacklist::Blacklist;
use crate::error::{Error, Result};
use ipnetwork::Ipv4Network;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};

struct CyclicGroup {
    prime: u64,
    known_primitive_root: u64,
    prime_factors: &'static [u64],
}

/// Fixed table of primes just above 2^8, 2^16, 2^24, 2^28, and 2^32,
/// each with a known primitive root and the full factorization of
/// `p - 1` needed to test candidate exponents for coprimality.
static GROUPS: [CyclicGroup; 5] = [
    CyclicGroup {
        prime: 257,
        known_primitive_root: 3,
        prime_factors: &[2],
    },
    CyclicGroup {
        prime: 65537,
        known_primitive_root: 3,
        prime_factors: &[2],
    },
    CyclicGroup {
        prime: 16777259,
        known_primitive_root: 2,
        prime_factors: &[2, 23, 103, 3541],
    },
    CyclicGroup {
        prime: 268435459,
        known_primitive_root: 2,
        prime_factors: &[2, 3, 19, 87211],
    },
    CyclicGroup {
        prime: 4294967311,
        known_primitive_root: 3,
        prime_factors: &[2, 3, 5, 131, 364289],
    },
];

fn get_group(min_size: u64) -> Result<&'static CyclicGroup> {
    GROUPS
        .iter()
        .find(|g| g.prime > min_size)
        .ok_or_else(|| Error::InvalidCidr("block larger than 2^32 + 15".to_string()))
}

/// Mirrors the original's deliberately non-gcd coprimality check: for
/// each prime factor `q` of `p-1`, reject if `q` divides `candidate`,
/// `candidate` divides `q`, or they are equal.
fn is_coprime(candidate: u64, group: &CyclicGroup) -> bool {
    group.prime_factors.iter().all(|&q| {
        if q > candidate {
            q % candidate != 0
        } else if candidate > q {
            candidate % q != 0
        } else {
            false
        }
    })
}

fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

fn mod_pow(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    let mut result = 1u64;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, modulus);
        }
        exp >>= 1;
        base = mul_mod(base, base, modulus);
    }
    result
}

/// Pick a random exponent coprime to every factor of `p-1` and raise
/// the group's known primitive root to it, yielding a fresh generator
/// of the full group.
fn fresh_generator<R: Rng + ?Sized>(group: &CyclicGroup, rng: &mut R) -> u64 {
    loop {
        let candidate = rng.gen_range(1..group.prime);
        if is_coprime(candidate, group) {
            return mod_pow(group.known_primitive_root, candidate, group.prime);
        }
    }
}

fn host_count_v4(net: &Ipv4Network) -> u64 {
    1u64 << (32 - net.prefix() as u32)
}

fn nth_host_v4(net: &Ipv4Network, index: u64) -> Ipv4Addr {
    let base: u32 = net.network().into();
    Ipv4Addr::from(base.wrapping_add(index as u32))
}

/// Lazy, single-pass, finite iterator over every host in an IPv4 block
/// in pseudo-random order, skipping blacklisted addresses.
pub struct AddressEnumerator {
    network: Ipv4Network,
    blacklist: Blacklist,
    address_count: u64,
    generator: u64,
    prime: u64,
    start: u64,
    current: u64,
    finished: bool,
}

impl AddressEnumerator {
    pub fn new(network: Ipv4Network, blacklist: Blacklist) -> Result<Self> {
        let address_count = host_count_v4(&network);
        let group = get_group(address_count)?;
        let mut rng = rand::thread_rng();
        let generator = fresh_generator(group, &mut rng);
        let start = rng.gen_range(1..group.prime);
        Ok(Self {
            network,
            blacklist,
            address_count,
            generator,
            prime: group.prime,
            start,
            current: start,
            finished: false,
        })
    }
}

impl Iterator for AddressEnumerator {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        loop {
            if self.finished {
                return None;
            }
            let candidate = self.current;
            let advanced = mul_mod(candidate, self.generator, self.prime);
            if advanced == 0 {
                self.finished = true;
                self.current = 0;
            } else if advanced == self.start {
                self.current = 0;
            } else {
                self.current = advanced;
            }

            if candidate < self.address_count {
                let ip = IpAddr::V4(nth_host_v4(&self.network, candidate));
                if !self.blacklist.is_ip_blacklisted(&ip) {
                    return Some(ip);
                }
            }
        }
    }
}

/// Enumerate every host in `network`, skipping addresses in `blacklist`.
pub fn enumerate(network: Ipv4Network, blacklist: Blacklist) -> Result<AddressEnumerator> {
    AddressEnumerator::new(network, blacklist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn covers_every_host_exactly_once_in_a_slash_28() {
        let net: Ipv4Network = "172.24.12.0/28".parse().unwrap();
        let enumerator = enumerate(net, Blacklist::new()).unwrap();
        let ips: Vec<IpAddr> = enumerator.collect();
        assert_eq!(ips.len(), 16);
        let unique: HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 16);
        for ip in &ips {
            match ip {
                IpAddr::V4(v4) => assert!(net.contains(*v4)),
                IpAddr::V6(_) => panic!("unexpected IPv6 address from IPv4 enumerator"),
            }
        }
    }

    #[test]
    fn covers_every_host_exactly_once_in_a_slash_24() {
        let net: Ipv4Network = "10.20.30.0/24".parse().unwrap();
        let ips: Vec<IpAddr> = enumerate(net, Blacklist::new()).unwrap().collect();
        assert_eq!(ips.len(), 256);
        let unique: HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn order_is_not_strictly_increasing() {
        let net: Ipv4Network = "10.20.30.0/24".parse().unwrap();
        let ips: Vec<IpAddr> = enumerate(net, Blacklist::new()).unwrap().collect();
        let strictly_increasing = ips.windows(2).all(|w| w[0] < w[1]);
        assert!(!strictly_increasing);
    }

    #[test]
    fn blacklisted_host_never_emitted() {
        let net: Ipv4Network = "172.24.12.0/28".parse().unwrap();
        let mut blacklist = Blacklist::new();
        blacklist.add("172.24.12.5");
        let ips: Vec<IpAddr> = enumerate(net, blacklist).unwrap().collect();
        assert_eq!(ips.len(), 15);
        assert!(!ips.contains(&"172.24.12.5".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn rejects_block_larger_than_table_ceiling() {
        // No IPv4 CIDR can exceed 2^32 addresses, so this always succeeds;
        // guard against a future prime table shrinking below /0.
        let net: Ipv4Network = "0.0.0.0/0".parse().unwrap();
        assert!(enumerate(net, Blacklist::new()).is_ok());
    }
}
