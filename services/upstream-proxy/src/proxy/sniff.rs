//! Host key extraction from the first chunk of a connection.

use std::fmt;
use std::sync::LazyLock;

use regex::bytes::Regex;

use super::sni::{parse_sni, TLS_HANDSHAKE_RECORD};

/// `Host:` at the start of any line, case-insensitive. A bracketed IPv6
/// literal keeps its brackets; otherwise the value stops at a space, colon
/// or line end. The value classes match raw bytes so a non-UTF-8 value is
/// captured whole and then rejected rather than cut short.
static HOST_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^host:[ \t]*(\[(?-u:[^\]\r\n])*\]|(?-u:[^ :\r\n])+)")
        .expect("host header pattern compiles")
});

/// How a first chunk was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tls,
    Plaintext,
}

impl Protocol {
    pub fn detect(first_chunk: &[u8]) -> Self {
        match first_chunk.first() {
            Some(&TLS_HANDSHAKE_RECORD) => Protocol::Tls,
            _ => Protocol::Plaintext,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tls => write!(f, "tls"),
            Protocol::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// Extract the routing host key, or `None` if the chunk carries none.
pub fn sniff(first_chunk: &[u8]) -> Option<String> {
    match Protocol::detect(first_chunk) {
        Protocol::Tls => parse_sni(first_chunk).into_hostname(),
        Protocol::Plaintext => host_header(first_chunk),
    }
}

/// Value of the first `Host` header line.
pub fn host_header(data: &[u8]) -> Option<String> {
    let captures = HOST_HEADER.captures(data)?;
    let value = captures.get(1)?;
    std::str::from_utf8(value.as_bytes()).ok().map(str::to_string)
}
