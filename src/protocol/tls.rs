//! TLS record and hello-message decoder.
//!
//! Record header (5 bytes):
//!   content type (1) | legacy version (2) | length (2)
//!
//! Handshake header (4 bytes, inside a type-22 record):
//!   handshake type (1) | length (3)
//!
//! Only the first record in a segment is decoded; hellos that straddle
//! segments are decoded as far as the captured bytes allow and dropped
//! otherwise.

use super::{read_bytes, read_u16, read_u24, read_u8};
use serde::Serialize;

pub const TLS_RECORD_HEADER_LEN: usize = 5;

pub const CONTENT_CHANGE_CIPHER_SPEC: u8 = 20;
pub const CONTENT_ALERT: u8 = 21;
pub const CONTENT_HANDSHAKE: u8 = 22;
pub const CONTENT_APPLICATION_DATA: u8 = 23;

pub const HANDSHAKE_CLIENT_HELLO: u8 = 1;
pub const HANDSHAKE_SERVER_HELLO: u8 = 2;

pub const EXT_SERVER_NAME: u16 = 0x0000;
pub const EXT_SUPPORTED_VERSIONS: u16 = 0x002B;

pub const TLS_1_2: u16 = 0x0303;

/// Cheap sniff used when no well-known port matched: a known content type
/// followed by a 3.x version.
pub fn looks_like_record(payload: &[u8]) -> bool {
    payload.len() >= TLS_RECORD_HEADER_LEN
        && (CONTENT_CHANGE_CIPHER_SPEC..=CONTENT_APPLICATION_DATA).contains(&payload[0])
        && payload[1] == 0x03
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TlsAlert {
    pub level: u8,
    pub description: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsRecord {
    pub content_type: u8,
    pub version: u16,
    pub length: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<TlsAlert>,
}

impl TlsRecord {
    pub fn parse(payload: &[u8]) -> Option<TlsRecord> {
        let (content_type, off) = read_u8(payload, 0)?;
        if !(CONTENT_CHANGE_CIPHER_SPEC..=CONTENT_APPLICATION_DATA).contains(&content_type) {
            return None;
        }
        let (version, off) = read_u16(payload, off)?;
        let (length, off) = read_u16(payload, off)?;

        // A cut-off alert body still leaves a usable record header.
        let alert = if content_type == CONTENT_ALERT {
            read_u8(payload, off).and_then(|(level, next)| {
                read_u8(payload, next).map(|(description, _)| TlsAlert { level, description })
            })
        } else {
            None
        };

        Some(TlsRecord {
            content_type,
            version,
            length,
            alert,
        })
    }

    pub fn is_alert(&self) -> bool {
        self.content_type == CONTENT_ALERT
    }

    pub fn content_name(&self) -> &'static str {
        match self.content_type {
            CONTENT_CHANGE_CIPHER_SPEC => "ChangeCipherSpec",
            CONTENT_ALERT => "Alert",
            CONTENT_HANDSHAKE => "Handshake",
            CONTENT_APPLICATION_DATA => "ApplicationData",
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsExtension {
    pub ext_type: u16,
    pub length: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHello {
    pub version: u16,
    pub random: String,
    pub session_id: String,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<TlsExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHello {
    pub version: u16,
    pub random: String,
    pub session_id: String,
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: Vec<TlsExtension>,
    /// From `supported_versions`; TLS 1.3 servers keep 0x0303 in `version`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_version: Option<u16>,
}

impl ServerHello {
    pub fn negotiated_version(&self) -> u16 {
        self.selected_version.unwrap_or(self.version)
    }
}

/// Handshake body of a type-22 record, clamped to the record length.
fn handshake_body(payload: &[u8], expected: u8) -> Option<&[u8]> {
    let record = TlsRecord::parse(payload)?;
    if record.content_type != CONTENT_HANDSHAKE {
        return None;
    }
    let end = (TLS_RECORD_HEADER_LEN + record.length as usize).min(payload.len());
    let fragment = &payload[TLS_RECORD_HEADER_LEN..end];
    let (msg_type, off) = read_u8(fragment, 0)?;
    if msg_type != expected {
        return None;
    }
    let (len, off) = read_u24(fragment, off)?;
    let body_end = (off + len as usize).min(fragment.len());
    Some(&fragment[off..body_end])
}

pub fn parse_client_hello(payload: &[u8]) -> Option<ClientHello> {
    let body = handshake_body(payload, HANDSHAKE_CLIENT_HELLO)?;
    let (version, off) = read_u16(body, 0)?;
    let (random, off) = read_bytes(body, off, 32)?;
    let (sid_len, off) = read_u8(body, off)?;
    let (session_id, off) = read_bytes(body, off, sid_len as usize)?;

    let (suites_len, off) = read_u16(body, off)?;
    let (suites, off) = read_bytes(body, off, suites_len as usize)?;
    let cipher_suites = suites
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();

    let (comp_len, off) = read_u8(body, off)?;
    let (compression, off) = read_bytes(body, off, comp_len as usize)?;

    let mut sni = None;
    let extensions = read_extensions(body, off, |ext_type, data| {
        if ext_type == EXT_SERVER_NAME {
            sni = parse_sni(data);
        }
    })?;

    Some(ClientHello {
        version,
        random: hex(random),
        session_id: hex(session_id),
        cipher_suites,
        compression_methods: compression.to_vec(),
        extensions,
        sni,
    })
}

pub fn parse_server_hello(payload: &[u8]) -> Option<ServerHello> {
    let body = handshake_body(payload, HANDSHAKE_SERVER_HELLO)?;
    let (version, off) = read_u16(body, 0)?;
    let (random, off) = read_bytes(body, off, 32)?;
    let (sid_len, off) = read_u8(body, off)?;
    let (session_id, off) = read_bytes(body, off, sid_len as usize)?;
    let (cipher_suite, off) = read_u16(body, off)?;
    let (compression_method, off) = read_u8(body, off)?;

    let mut selected_version = None;
    let extensions = read_extensions(body, off, |ext_type, data| {
        if ext_type == EXT_SUPPORTED_VERSIONS {
            selected_version = read_u16(data, 0).map(|(v, _)| v);
        }
    })?;

    Some(ServerHello {
        version,
        random: hex(random),
        session_id: hex(session_id),
        cipher_suite,
        compression_method,
        extensions,
        selected_version,
    })
}

/// Walk the extension block. A hello that ends before the block is valid and
/// has no extensions; a block that overruns the body invalidates the hello.
fn read_extensions<F>(body: &[u8], off: usize, mut visit: F) -> Option<Vec<TlsExtension>>
where
    F: FnMut(u16, &[u8]),
{
    let mut extensions = Vec::new();
    if off >= body.len() {
        return Some(extensions);
    }
    let (total, off) = read_u16(body, off)?;
    let (block, _) = read_bytes(body, off, total as usize)?;

    let mut pos = 0;
    while pos < block.len() {
        let (ext_type, next) = read_u16(block, pos)?;
        let (length, next) = read_u16(block, next)?;
        let (data, next) = read_bytes(block, next, length as usize)?;
        visit(ext_type, data);
        extensions.push(TlsExtension { ext_type, length });
        pos = next;
    }
    Some(extensions)
}

/// First host_name entry of a server_name extension.
fn parse_sni(data: &[u8]) -> Option<String> {
    let (list_len, mut pos) = read_u16(data, 0)?;
    let end = (pos + list_len as usize).min(data.len());
    while pos < end {
        let (name_type, next) = read_u8(data, pos)?;
        let (name_len, next) = read_u16(data, next)?;
        let (name, next) = read_bytes(data, next, name_len as usize)?;
        if name_type == 0 {
            return std::str::from_utf8(name).ok().map(str::to_string);
        }
        pos = next;
    }
    None
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn version_name(version: u16) -> String {
    match version {
        0x0300 => "SSL 3.0".to_string(),
        0x0301 => "TLS 1.0".to_string(),
        0x0302 => "TLS 1.1".to_string(),
        0x0303 => "TLS 1.2".to_string(),
        0x0304 => "TLS 1.3".to_string(),
        other => format!("0x{:04x}", other),
    }
}

/// Lowercase, dash-separated version name for finding ids (`tls-1.0`).
pub fn version_slug(version: u16) -> String {
    version_name(version).to_lowercase().replace(' ', "-")
}

pub fn is_deprecated_version(version: u16) -> bool {
    version < TLS_1_2
}

/// Cipher suites considered broken: NULL, export-grade, anonymous, DES and RC4.
pub fn weak_cipher_name(suite: u16) -> Option<&'static str> {
    let name = match suite {
        0x0000 => "TLS_NULL_WITH_NULL_NULL",
        0x0001 => "TLS_RSA_WITH_NULL_MD5",
        0x0002 => "TLS_RSA_WITH_NULL_SHA",
        0x0003 => "TLS_RSA_EXPORT_WITH_RC4_40_MD5",
        0x0004 => "TLS_RSA_WITH_RC4_128_MD5",
        0x0005 => "TLS_RSA_WITH_RC4_128_SHA",
        0x0006 => "TLS_RSA_EXPORT_WITH_RC2_CBC_40_MD5",
        0x0008 => "TLS_RSA_EXPORT_WITH_DES40_CBC_SHA",
        0x0009 => "TLS_RSA_WITH_DES_CBC_SHA",
        0x000A => "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        0x0014 => "TLS_DHE_RSA_EXPORT_WITH_DES40_CBC_SHA",
        0x0015 => "TLS_DHE_RSA_WITH_DES_CBC_SHA",
        0x0016 => "TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0x0017 => "TLS_DH_anon_EXPORT_WITH_RC4_40_MD5",
        0x0018 => "TLS_DH_anon_WITH_RC4_128_MD5",
        0x001B => "TLS_DH_anon_WITH_3DES_EDE_CBC_SHA",
        0xC007 => "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA",
        0xC011 => "TLS_ECDHE_RSA_WITH_RC4_128_SHA",
        0xC012 => "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
        _ => return None,
    };
    Some(name)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_with_sni() {
        let payload = build::client_hello(0x0303, Some("example.org"));
        let record = TlsRecord::parse(&payload).unwrap();
        assert_eq!(record.content_type, CONTENT_HANDSHAKE);
        assert_eq!(record.content_name(), "Handshake");

        let hello = parse_client_hello(&payload).unwrap();
        assert_eq!(hello.version, 0x0303);
        assert_eq!(hello.cipher_suites, vec![0x1301, 0xC02F]);
        assert_eq!(hello.compression_methods, vec![0]);
        assert_eq!(hello.sni.as_deref(), Some("example.org"));
        assert_eq!(hello.extensions.len(), 1);
        assert_eq!(hello.random.len(), 64);
        assert!(parse_server_hello(&payload).is_none());
    }

    #[test]
    fn client_hello_without_sni() {
        let hello = parse_client_hello(&build::client_hello(0x0301, None)).unwrap();
        assert_eq!(hello.sni, None);
        assert!(hello.extensions.is_empty());
    }

    #[test]
    fn server_hello_selected_version() {
        let payload = build::server_hello(0x0303, 0x1301, Some(0x0304));
        let hello = parse_server_hello(&payload).unwrap();
        assert_eq!(hello.cipher_suite, 0x1301);
        assert_eq!(hello.selected_version, Some(0x0304));
        assert_eq!(hello.negotiated_version(), 0x0304);

        let plain = parse_server_hello(&build::server_hello(0x0301, 0x0005, None)).unwrap();
        assert_eq!(plain.negotiated_version(), 0x0301);
        assert!(plain.extensions.is_empty());
    }

    #[test]
    fn alert_record() {
        let record = TlsRecord::parse(&build::alert(2, 40)).unwrap();
        assert!(record.is_alert());
        assert_eq!(
            record.alert,
            Some(TlsAlert {
                level: 2,
                description: 40
            })
        );
    }

    #[test]
    fn header_only_alert_keeps_record() {
        let record = TlsRecord::parse(&[21, 3, 3, 0, 2]).unwrap();
        assert!(record.is_alert());
        assert_eq!(record.length, 2);
        assert_eq!(record.alert, None);

        // One body byte is still not a full alert.
        let record = TlsRecord::parse(&[21, 3, 3, 0, 2, 2]).unwrap();
        assert_eq!(record.alert, None);
    }

    #[test]
    fn truncated_hello_is_dropped() {
        let payload = build::client_hello(0x0303, Some("example.org"));
        assert!(parse_client_hello(&payload[..40]).is_none());
    }

    #[test]
    fn version_helpers() {
        assert_eq!(version_name(0x0301), "TLS 1.0");
        assert_eq!(version_slug(0x0301), "tls-1.0");
        assert_eq!(version_slug(0x0300), "ssl-3.0");
        assert!(is_deprecated_version(0x0302));
        assert!(!is_deprecated_version(0x0303));
        assert_eq!(weak_cipher_name(0x0005), Some("TLS_RSA_WITH_RC4_128_SHA"));
        assert_eq!(weak_cipher_name(0xC02F), None);
    }

    #[test]
    fn sniffing() {
        assert!(looks_like_record(&[23, 3, 3, 0, 1]));
        assert!(!looks_like_record(&[24, 3, 3, 0, 1]));
        assert!(!looks_like_record(&[22, 2, 0, 0, 1]));
        assert!(!looks_like_record(&[22, 3, 1]));
    }

    #[test]
    fn sniffing_requires_major_version_3() {
        // A plausible content type alone is not enough.
        for first in 20..=23u8 {
            assert!(looks_like_record(&[first, 3, 1, 0, 0]));
            assert!(!looks_like_record(&[first, 0x00, 0x01, 0, 0]));
            assert!(!looks_like_record(&[first, b'G', b'E', b'T', b' ']));
        }
    }
}
