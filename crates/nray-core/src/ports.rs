//! Port specification parsing: single ports, ranges, "topN", and "all".

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::warn;

/// Protocol dimension a port-list applies to; selects which top-ports
/// table `topN` draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Ordered, most-common-first TCP ports (nmap-style top-ports table).
/// The first ten entries are pinned by the coordination layer's
/// testable properties; later entries round out the table for larger
/// `topN` requests.
pub const TOP_TCP_PORTS: &[u16] = &[
    21, 22, 23, 25, 80, 110, 139, 443, 445, 3389, 111, 995, 993, 143, 53, 3306, 8080, 135, 8443,
    1723, 179, 513, 514, 8888, 199, 1025, 587, 8081, 161, 5060, 5900, 9100, 106, 2049, 6001, 3000,
    5432, 1720, 1110, 1433,
];

/// Ordered, most-common-first UDP ports.
pub const TOP_UDP_PORTS: &[u16] = &[
    161, 137, 138, 53, 123, 67, 68, 500, 514, 520, 631, 1434, 4500, 5353, 5060, 111, 69, 162, 49,
    2049,
];

pub fn top_ports(protocol: Protocol, n: usize) -> Vec<u16> {
    let table = match protocol {
        Protocol::Tcp => TOP_TCP_PORTS,
        Protocol::Udp => TOP_UDP_PORTS,
    };
    let n = n.min(table.len());
    table[..n].to_vec()
}

fn top_n_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^top-?(\d+)$").unwrap())
}

/// Parse a list of port-spec tokens (`"22"`, `"8080-8088"`, `"top10"`,
/// `"all"`) into the deduplicated set of ports they denote. Unknown
/// tokens are logged and skipped; returned order carries no meaning.
pub fn parse(tokens: &[impl AsRef<str>], protocol: Protocol) -> Vec<u16> {
    let mut ports: HashSet<u16> = HashSet::new();
    for token in tokens {
        let token = token.as_ref();
        if let Ok(single) = token.parse::<u16>() {
            ports.insert(single);
            continue;
        }
        if let Some((a, b)) = token.split_once('-') {
            if let (Ok(mut start), Ok(mut end)) = (a.trim().parse::<u16>(), b.trim().parse::<u16>())
            {
                if start > end {
                    std::mem::swap(&mut start, &mut end);
                }
                ports.extend(start..=end);
                continue;
            }
        }
        if let Some(caps) = top_n_regex().captures(token) {
            if let Ok(n) = caps[1].parse::<usize>() {
                ports.extend(top_ports(protocol, n));
                continue;
            }
        }
        if token.eq_ignore_ascii_case("all") {
            ports.extend(1..=u16::MAX);
            continue;
        }
        warn!("can't parse port token '{token}', skipping");
    }
    ports.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<u16>) -> Vec<u16> {
        v.sort_unstable();
        v
    }

    #[test]
    fn parses_single_port() {
        assert_eq!(sorted(parse(&["22"], Protocol::Tcp)), vec![22]);
    }

    #[test]
    fn parses_multiple_singles() {
        assert_eq!(sorted(parse(&["80", "443"], Protocol::Tcp)), vec![80, 443]);
    }

    #[test]
    fn parses_range() {
        assert_eq!(
            sorted(parse(&["8080-8088"], Protocol::Tcp)),
            (8080..=8088).collect::<Vec<_>>()
        );
    }

    #[test]
    fn swaps_reversed_range() {
        assert_eq!(
            sorted(parse(&["30-22"], Protocol::Tcp)),
            (22..=30).collect::<Vec<_>>()
        );
    }

    #[test]
    fn parses_top10_tcp() {
        assert_eq!(
            sorted(parse(&["top10"], Protocol::Tcp)),
            sorted(vec![21, 22, 23, 25, 80, 110, 139, 443, 445, 3389])
        );
    }

    #[test]
    fn dedups_overlapping_tokens() {
        let result = sorted(parse(
            &["top10", "top5", "139", "443", "21-23"],
            Protocol::Tcp,
        ));
        assert_eq!(
            result,
            sorted(vec![21, 22, 23, 25, 80, 110, 139, 443, 445, 3389])
        );
    }

    #[test]
    fn drops_unparseable_tokens_without_failing() {
        let result = sorted(parse(&["22", "garbage", "80"], Protocol::Tcp));
        assert_eq!(result, vec![22, 80]);
    }
}
