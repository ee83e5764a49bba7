//! SNI (Server Name Indication) extraction from TLS ClientHello.
//!
//! Parses the first chunk of a TLS connection to extract the SNI hostname
//! for routing decisions. Only a ClientHello carried in a single record is
//! supported; a fragmented handshake is treated like a truncated one. Every
//! declared length is checked against the buffer before it is followed.

/// TLS record type for handshake messages.
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const RECORD_HEADER_LEN: usize = 5;
const HANDSHAKE_HEADER_LEN: usize = 4;
/// record header (5) + handshake header (4) + client version (2) + random (32)
const SESSION_ID_OFFSET: usize = 43;
const EXTENSION_SERVER_NAME: u16 = 0x0000;
const NAME_TYPE_HOST_NAME: u8 = 0x00;

/// Result of SNI inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniResult {
    /// Extracted SNI hostname, exactly as sent.
    Found(String),
    /// TLS ClientHello present but no usable server_name extension.
    NoSni,
    /// Data is not a TLS ClientHello.
    NotTls,
    /// ClientHello is malformed, truncated, or spans several records.
    Malformed,
}

impl SniResult {
    /// The hostname, if one was found.
    pub fn into_hostname(self) -> Option<String> {
        match self {
            SniResult::Found(hostname) => Some(hostname),
            _ => None,
        }
    }
}

/// Bounds-checked big-endian reader over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Option<usize> {
        self.bytes(3)
            .map(|b| ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | (b[2] as usize))
    }

    /// Skip a field preceded by a one-byte length.
    fn skip_u8_prefixed(&mut self) -> Option<()> {
        let len = self.u8()? as usize;
        self.bytes(len).map(|_| ())
    }

    /// Skip a field preceded by a two-byte length.
    fn skip_u16_prefixed(&mut self) -> Option<()> {
        let len = self.u16()? as usize;
        self.bytes(len).map(|_| ())
    }
}

/// Parse SNI from a TLS ClientHello buffer.
///
/// TLS Record structure:
/// - byte 0: record type (0x16 = Handshake)
/// - bytes 1-2: version
/// - bytes 3-4: record length
/// - bytes 5+: handshake message
///
/// Handshake ClientHello:
/// - byte 0: handshake type (0x01 = ClientHello)
/// - bytes 1-3: length
/// - bytes 4-5: client version
/// - bytes 6-37: random (32 bytes)
/// - byte 38: session ID length
/// - variable: session ID
/// - 2 bytes: cipher suites length
/// - variable: cipher suites
/// - 1 byte: compression methods length
/// - variable: compression methods
/// - 2 bytes: extensions length
/// - variable: extensions
pub fn parse_sni(data: &[u8]) -> SniResult {
    match data.first() {
        Some(&TLS_HANDSHAKE_RECORD) => {}
        _ => return SniResult::NotTls,
    }

    match data.get(RECORD_HEADER_LEN) {
        Some(&HANDSHAKE_CLIENT_HELLO) => {}
        Some(_) => return SniResult::NotTls,
        None => return SniResult::Malformed,
    }

    parse_client_hello(data).unwrap_or(SniResult::Malformed)
}

/// `None` means a length ran past the end of the buffer.
fn parse_client_hello(data: &[u8]) -> Option<SniResult> {
    let mut header = Reader::at(data, 3);
    let record_len = header.u16()? as usize;
    let record = data.get(..RECORD_HEADER_LEN + record_len)?;

    header = Reader::at(record, RECORD_HEADER_LEN + 1);
    let handshake_len = header.u24()?;
    let hello_end = RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN + handshake_len;
    let hello = record.get(..hello_end)?;

    let mut reader = Reader::at(hello, SESSION_ID_OFFSET);
    reader.skip_u8_prefixed()?; // session id
    reader.skip_u16_prefixed()?; // cipher suites
    reader.skip_u8_prefixed()?; // compression methods

    if reader.remaining() == 0 {
        // No extensions block at all
        return Some(SniResult::NoSni);
    }

    let extensions_len = reader.u16()? as usize;
    let mut extensions = Reader::new(reader.bytes(extensions_len)?);

    while extensions.remaining() > 0 {
        let ext_type = extensions.u16()?;
        let ext_len = extensions.u16()? as usize;
        let payload = extensions.bytes(ext_len)?;

        if ext_type == EXTENSION_SERVER_NAME {
            return parse_server_name(payload);
        }
    }

    Some(SniResult::NoSni)
}

/// Parse the server_name extension payload.
///
/// - 2 bytes: list length
/// - 1 byte: name type (0 = hostname)
/// - 2 bytes: name length
/// - variable: name
fn parse_server_name(payload: &[u8]) -> Option<SniResult> {
    let mut reader = Reader::new(payload);
    let list_len = reader.u16()? as usize;
    let mut list = Reader::new(reader.bytes(list_len)?);

    let name_type = list.u8()?;
    let name_len = list.u16()? as usize;
    let name = list.bytes(name_len)?;

    if name_type != NAME_TYPE_HOST_NAME || name.is_empty() {
        return Some(SniResult::NoSni);
    }

    match std::str::from_utf8(name) {
        Ok(hostname) => Some(SniResult::Found(hostname.to_string())),
        Err(_) => Some(SniResult::Malformed),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn with_u16_len(body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    fn extension(ext_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = ext_type.to_be_bytes().to_vec();
        out.extend(with_u16_len(payload));
        out
    }

    fn server_name_extension(name_type: u8, name: &[u8]) -> Vec<u8> {
        let mut entry = vec![name_type];
        entry.extend(with_u16_len(name));
        extension(EXTENSION_SERVER_NAME, &with_u16_len(&entry))
    }

    /// Build a single-record ClientHello around an extensions block.
    pub(crate) fn client_hello_with(session_id: &[u8], extensions: Option<&[u8]>) -> Vec<u8> {
        let mut body = vec![0x03, 0x03]; // TLS 1.2
        body.extend_from_slice(&[0x5a; 32]); // random
        body.push(session_id.len() as u8);
        body.extend_from_slice(session_id);
        body.extend(with_u16_len(&[0x13, 0x01, 0x00, 0x2f])); // cipher suites
        body.extend_from_slice(&[0x01, 0x00]); // null compression
        if let Some(extensions) = extensions {
            body.extend(with_u16_len(extensions));
        }

        let mut handshake = vec![HANDSHAKE_CLIENT_HELLO];
        handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        handshake.extend(body);

        let mut record = vec![TLS_HANDSHAKE_RECORD, 0x03, 0x01];
        record.extend(with_u16_len(&handshake));
        record
    }

    /// A ClientHello whose only interesting extension is server_name.
    pub(crate) fn client_hello(hostname: &str) -> Vec<u8> {
        let mut extensions = extension(0x000a, &[0x00, 0x02, 0x00, 0x1d]); // supported_groups
        extensions.extend(server_name_extension(NAME_TYPE_HOST_NAME, hostname.as_bytes()));
        extensions.extend(extension(0x0015, &[0u8; 16])); // padding
        client_hello_with(&[], Some(&extensions))
    }

    #[test]
    fn test_parse_sni_found() {
        let hello = client_hello("example.com");
        assert_eq!(parse_sni(&hello), SniResult::Found("example.com".to_string()));
    }

    #[test]
    fn test_parse_sni_keeps_case() {
        let hello = client_hello("Example.COM");
        assert_eq!(parse_sni(&hello), SniResult::Found("Example.COM".to_string()));
    }

    #[test]
    fn test_parse_sni_after_session_id() {
        let extensions = server_name_extension(NAME_TYPE_HOST_NAME, b"a.test");
        let hello = client_hello_with(&[0xab; 32], Some(&extensions));
        assert_eq!(parse_sni(&hello), SniResult::Found("a.test".to_string()));
    }

    #[test]
    fn test_truncated_by_one_byte() {
        let hello = client_hello("example.com");
        let truncated = &hello[..hello.len() - 1];
        assert_eq!(parse_sni(truncated), SniResult::Malformed);
    }

    #[test]
    fn test_every_prefix_is_safe() {
        let hello = client_hello("example.com");
        for len in 0..hello.len() {
            let result = parse_sni(&hello[..len]);
            assert!(
                !matches!(result, SniResult::Found(_)),
                "prefix of {} bytes produced {:?}",
                len,
                result
            );
        }
    }

    #[test]
    fn test_trailing_bytes_after_record_ignored() {
        let mut hello = client_hello("example.com");
        hello.extend_from_slice(&[0x17, 0x03, 0x03, 0x00, 0x01, 0xff]);
        assert_eq!(parse_sni(&hello), SniResult::Found("example.com".to_string()));
    }

    #[test]
    fn test_no_extensions() {
        let hello = client_hello_with(&[], None);
        assert_eq!(parse_sni(&hello), SniResult::NoSni);
    }

    #[test]
    fn test_no_server_name_extension() {
        let extensions = extension(0x000a, &[0x00, 0x02, 0x00, 0x1d]);
        let hello = client_hello_with(&[], Some(&extensions));
        assert_eq!(parse_sni(&hello), SniResult::NoSni);
    }

    #[test]
    fn test_non_hostname_name_type() {
        let extensions = server_name_extension(0x01, b"a.test");
        let hello = client_hello_with(&[], Some(&extensions));
        assert_eq!(parse_sni(&hello), SniResult::NoSni);
    }

    #[test]
    fn test_invalid_utf8_hostname() {
        let extensions = server_name_extension(NAME_TYPE_HOST_NAME, &[0xff, 0xfe]);
        let hello = client_hello_with(&[], Some(&extensions));
        assert_eq!(parse_sni(&hello), SniResult::Malformed);
    }

    #[test]
    fn test_handshake_longer_than_record() {
        let mut hello = client_hello("example.com");
        // Claim a handshake body larger than the record carries.
        hello[6] = 0x01;
        assert_eq!(parse_sni(&hello), SniResult::Malformed);
    }

    #[test]
    fn test_overlong_extension_length() {
        let mut extensions = server_name_extension(NAME_TYPE_HOST_NAME, b"a.test");
        extensions[3] = 0xff;
        let hello = client_hello_with(&[], Some(&extensions));
        assert_eq!(parse_sni(&hello), SniResult::Malformed);
    }

    #[test]
    fn test_parse_not_tls() {
        let http_request = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(parse_sni(http_request), SniResult::NotTls);
        assert_eq!(parse_sni(&[0x16, 0x03, 0x01, 0x00, 0x10, 0x02]), SniResult::NotTls);
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(parse_sni(&[0x16, 0x03, 0x01]), SniResult::Malformed);
        assert_eq!(parse_sni(&[]), SniResult::NotTls);
    }
}
