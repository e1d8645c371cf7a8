//! Protocol-specific UDP probe payloads (§4.H), ported from the
//! teacher's `prtip_network::protocol_payloads` and extended with the
//! MS-SQL, portmap, DB2, Citrix, and Sentinel probes this system's
//! well-known-ports table adds.
//!
//! Supports configured overrides: a caller-supplied map takes
//! priority over the built-in table for a given port.

use std::collections::HashMap;

/// Get the protocol-specific UDP payload for `port`, preferring an
/// override if one is configured. `None` means no known payload —
/// in "fast" mode the caller skips such ports rather than sending a
/// bare empty probe.
pub fn payload_for(port: u16, overrides: &HashMap<u16, Vec<u8>>) -> Option<Vec<u8>> {
    overrides.get(&port).cloned().or_else(|| builtin(port))
}

fn builtin(port: u16) -> Option<Vec<u8>> {
    match port {
        53 => Some(dns_query()),
        123 => Some(ntp_request()),
        137 => Some(netbios_name_query()),
        161 => Some(snmp_v2c_get_request()),
        111 => Some(rpc_null_call()),
        1434 => Some(mssql_ping()),
        523 => Some(db2_discovery()),
        1604 => Some(citrix_ica_browser()),
        5093 => Some(sentinel_license_query()),
        _ => None,
    }
}

/// DNS standard query for the root domain.
fn dns_query() -> Vec<u8> {
    vec![
        0x12, 0x34, // Transaction ID
        0x01, 0x00, // Flags: standard query
        0x00, 0x01, // Questions: 1
        0x00, 0x00, // Answer RRs: 0
        0x00, 0x00, // Authority RRs: 0
        0x00, 0x00, // Additional RRs: 0
        0x00, // Name: root (empty label)
        0x00, 0x01, // Type: A
        0x00, 0x01, // Class: IN
    ]
}

/// NTP version 3 client request.
fn ntp_request() -> Vec<u8> {
    let mut payload = vec![0x1B]; // LI=0, VN=3, Mode=3 (client)
    payload.resize(48, 0);
    payload
}

/// NetBIOS Name Service query for `*<00><00>`.
fn netbios_name_query() -> Vec<u8> {
    vec![
        0xAB, 0xCD, // Transaction ID
        0x01, 0x00, // Flags: query
        0x00, 0x01, // Questions: 1
        0x00, 0x00, // Answer RRs: 0
        0x00, 0x00, // Authority RRs: 0
        0x00, 0x00, // Additional RRs: 0
        0x20, // Length: 32 (encoded)
        0x43, 0x4B, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41,
        0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41,
        0x41, 0x41, 0x00, // Null terminator
        0x00, 0x21, // Type: NB
        0x00, 0x01, // Class: IN
    ]
}

/// SNMPv2c GetRequest for sysDescr.0 with community "public".
fn snmp_v2c_get_request() -> Vec<u8> {
    vec![
        0x30, 0x26, // SEQUENCE, length 38
        0x02, 0x01, 0x01, // INTEGER version (1 = SNMPv2c)
        0x04, 0x06, 0x70, 0x75, 0x62, 0x6C, 0x69, 0x63, // OCTET STRING "public"
        0xA0, 0x19, // GetRequest PDU
        0x02, 0x01, 0x00, // Request ID: 0
        0x02, 0x01, 0x00, // Error status: 0
        0x02, 0x01, 0x00, // Error index: 0
        0x30, 0x0E, // Variable bindings
        0x30, 0x0C, // Variable binding
        0x06, 0x08, 0x2B, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, // OID: 1.3.6.1.2.1.1.1.0
        0x05, 0x00, // NULL value
    ]
}

/// Sun RPC NULL call against the portmapper (program 100000, v2).
fn rpc_null_call() -> Vec<u8> {
    vec![
        0x00, 0x00, 0x00, 0x01, // XID
        0x00, 0x00, 0x00, 0x00, // Message type: Call
        0x00, 0x00, 0x00, 0x02, // RPC version: 2
        0x00, 0x01, 0x86, 0xA0, // Program: portmapper (100000)
        0x00, 0x00, 0x00, 0x02, // Program version: 2
        0x00, 0x00, 0x00, 0x00, // Procedure: NULL
        0x00, 0x00, 0x00, 0x00, // Credentials: NULL
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Verifier: NULL
        0x00, 0x00, 0x00, 0x00,
    ]
}

/// SQL Server Resolution Protocol "CLNT_UCAST_EX" broadcast probe.
fn mssql_ping() -> Vec<u8> {
    vec![0x02]
}

/// DB2 Discovery Service "DB2GETADDR" probe.
fn db2_discovery() -> Vec<u8> {
    let mut payload = b"DB2GETADDR".to_vec();
    payload.push(0x00);
    payload
}

/// Citrix ICA Browser "server info request" probe.
fn citrix_ica_browser() -> Vec<u8> {
    vec![0x1e, 0x00, 0x01, 0x30, 0x02, 0xfd, 0xa8, 0xe3, 0x00, 0x00]
}

/// Sentinel License Manager status-query probe.
fn sentinel_license_query() -> Vec<u8> {
    vec![0x72, 0x00, 0x00, 0x00, 0x00, 0x00]
}
