//! HTTP/1.x start line and header decoder.
//!
//! Only the first segment of a message is seen, so the body is whatever
//! follows the blank line in that segment.

use serde::Serialize;
use std::collections::BTreeMap;

const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HttpStartLine {
    #[serde(rename_all = "camelCase")]
    Request {
        method: String,
        uri: String,
        version: String,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        version: String,
        status_code: u16,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMessage {
    pub start: HttpStartLine,
    /// Lowercased names; repeated headers are joined with ", ".
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
}

impl HttpMessage {
    pub fn parse(payload: &[u8]) -> Option<HttpMessage> {
        let text = String::from_utf8_lossy(payload);
        let (head, body) = match text.find("\r\n\r\n") {
            Some(pos) => (&text[..pos], &text[pos + 4..]),
            None => (&text[..], ""),
        };

        let mut lines = head.split("\r\n");
        let start = parse_start_line(lines.next()?)?;

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            let value = value.trim();
            headers
                .entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        Some(HttpMessage {
            start,
            headers,
            body: body.to_string(),
        })
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start, HttpStartLine::Request { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.start {
            HttpStartLine::Response { status_code, .. } => Some(status_code),
            HttpStartLine::Request { .. } => None,
        }
    }
}

fn is_version(token: &str) -> bool {
    let Some(rest) = token.strip_prefix("HTTP/") else {
        return false;
    };
    let bytes = rest.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit()
}

fn parse_start_line(line: &str) -> Option<HttpStartLine> {
    if line.starts_with("HTTP/") {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next()?;
        let code = parts.next()?;
        if !is_version(version) || code.len() != 3 {
            return None;
        }
        let status_code: u16 = code.parse().ok()?;
        if !(100..=599).contains(&status_code) {
            return None;
        }
        return Some(HttpStartLine::Response {
            version: version.to_string(),
            status_code,
            reason: parts.next().unwrap_or("").to_string(),
        });
    }

    let mut parts = line.split(' ');
    let method = parts.next()?;
    let uri = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() || !METHODS.contains(&method) || uri.is_empty() || !is_version(version)
    {
        return None;
    }
    Some(HttpStartLine::Request {
        method: method.to_string(),
        uri: uri.to_string(),
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\nAccept: text/html\r\n\r\n";
        let msg = HttpMessage::parse(raw).unwrap();
        assert!(msg.is_request());
        assert_eq!(
            msg.start,
            HttpStartLine::Request {
                method: "GET".into(),
                uri: "/index.html".into(),
                version: "HTTP/1.1".into(),
            }
        );
        assert_eq!(msg.header("HOST"), Some("example.com"));
        assert_eq!(msg.header("accept"), Some("*/*, text/html"));
        assert!(msg.body.is_empty());
    }

    #[test]
    fn parse_response_with_body() {
        let raw = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 5\r\n\r\nretry";
        let msg = HttpMessage::parse(raw).unwrap();
        assert_eq!(msg.status_code(), Some(503));
        match &msg.start {
            HttpStartLine::Response { reason, .. } => assert_eq!(reason, "Service Unavailable"),
            other => panic!("unexpected start line {:?}", other),
        }
        assert_eq!(msg.body, "retry");
    }

    #[test]
    fn headers_without_blank_line() {
        let msg = HttpMessage::parse(b"POST /login HTTP/1.0\r\nX-Test: 1").unwrap();
        assert_eq!(msg.header("x-test"), Some("1"));
    }

    #[test]
    fn rejects_non_http() {
        assert!(HttpMessage::parse(b"\x16\x03\x01\x00\x05hello").is_none());
        assert!(HttpMessage::parse(b"FETCH / HTTP/1.1\r\n\r\n").is_none());
        assert!(HttpMessage::parse(b"HTTP/1.1 abc OK\r\n\r\n").is_none());
        assert!(HttpMessage::parse(b"GET / HTTP/11\r\n\r\n").is_none());
        assert!(HttpMessage::parse(b"").is_none());
    }
}
