//! Target blacklist: CIDR ranges and DNS names excluded from scanning.

use ipnetwork::IpNetwork;
use std::collections::HashSet;
use std::net::IpAddr;

/// Membership test for IPs (by containing CIDR) and DNS names (exact match).
///
/// The original implementation backs the IP side with a CIDR trie; a
/// linear scan over parsed networks gives the same membership answer
/// at the scale this tool targets (a handful to a few hundred
/// exclusions) without pulling in a standalone trie crate the example
/// pack doesn't otherwise use.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    networks: Vec<IpNetwork>,
    names: HashSet<String>,
    address_count: u64,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry of unclear type: CIDR, bare IPv4 literal, or DNS name.
    /// Returns the number of addresses newly covered (for progress accounting).
    pub fn add(&mut self, element: &str) -> u64 {
        if let Ok(net) = element.parse::<IpNetwork>() {
            return self.add_network(net);
        }
        if let Ok(ip) = element.parse::<IpAddr>() {
            let net = match ip {
                IpAddr::V4(v4) => IpNetwork::V4(ipnetwork::Ipv4Network::new(v4, 32).unwrap()),
                IpAddr::V6(v6) => IpNetwork::V6(ipnetwork::Ipv6Network::new(v6, 128).unwrap()),
            };
            return self.add_network(net);
        }
        self.add_dns_name(element);
        1
    }

    pub fn add_network(&mut self, net: IpNetwork) -> u64 {
        let count = net.size();
        self.networks.push(net);
        self.address_count += count;
        count
    }

    pub fn add_dns_name(&mut self, name: &str) {
        if self.names.insert(name.to_string()) {
            self.address_count += 1;
        }
    }

    pub fn is_ip_blacklisted(&self, ip: &IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(*ip))
    }

    pub fn is_dns_name_blacklisted(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn address_count(&self) -> u64 {
        self.address_count
    }
}

trait NetworkSize {
    fn size(&self) -> u64;
}

impl NetworkSize for IpNetwork {
    fn size(&self) -> u64 {
        match self {
            IpNetwork::V4(net) => 2u64.pow(32 - net.prefix() as u32),
            IpNetwork::V6(net) => {
                // Saturate: IPv6 blocks are out of scope (see Non-goals) but
                // a blacklist entry for one shouldn't panic.
                2u128
                    .checked_pow(128 - net.prefix() as u32)
                    .map(|v| v.min(u64::MAX as u128) as u64)
                    .unwrap_or(u64::MAX)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklists_single_ip() {
        let mut bl = Blacklist::new();
        bl.add("172.24.12.5");
        assert!(bl.is_ip_blacklisted(&"172.24.12.5".parse().unwrap()));
        assert!(!bl.is_ip_blacklisted(&"172.24.12.6".parse().unwrap()));
    }

    #[test]
    fn blacklists_cidr_range() {
        let mut bl = Blacklist::new();
        bl.add("10.0.0.0/24");
        assert!(bl.is_ip_blacklisted(&"10.0.0.17".parse().unwrap()));
        assert!(!bl.is_ip_blacklisted(&"10.0.1.17".parse().unwrap()));
    }

    #[test]
    fn blacklists_dns_name() {
        let mut bl = Blacklist::new();
        bl.add("evil.example.com");
        assert!(bl.is_dns_name_blacklisted("evil.example.com"));
        assert!(!bl.is_dns_name_blacklisted("good.example.com"));
    }
}
