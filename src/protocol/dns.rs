//! DNS message decoder (RFC 1035 section 4).
//!
//! Header (12 bytes):
//!   id (2) | flags (2) | qdcount (2) | ancount (2) | nscount (2) | arcount (2)
//!
//! Flags:
//!   QR(1) | OPCODE(4) | AA(1) | TC(1) | RD(1) | RA(1) | Z(3) | RCODE(4)
//!
//! Names are label sequences that may end in a compression pointer. Once a
//! pointer is taken the caller resumes right after that first pointer, no
//! matter how many further jumps the name makes.

use super::{read_bytes, read_u16, read_u32, read_u8};
use serde::Serialize;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

pub const DNS_HEADER_LEN: usize = 12;

/// Upper bound on pointer jumps while reading one name.
const MAX_COMPRESSION_HOPS: usize = 64;

/// DNS response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            n => Rcode::Other(n),
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormErr => write!(f, "FORMERR"),
            Rcode::ServFail => write!(f, "SERVFAIL"),
            Rcode::NxDomain => write!(f, "NXDOMAIN"),
            Rcode::NotImp => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::Other(n) => write!(f, "RCODE({})", n),
        }
    }
}

/// Record types with dedicated rdata rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            12 => RecordType::Ptr,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            n => RecordType::Other(n),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Ns => write!(f, "NS"),
            RecordType::Cname => write!(f, "CNAME"),
            RecordType::Ptr => write!(f, "PTR"),
            RecordType::Mx => write!(f, "MX"),
            RecordType::Txt => write!(f, "TXT"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Other(n) => write!(f, "TYPE{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DnsFlags {
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
}

impl DnsFlags {
    pub fn from_bits(bits: u16) -> Self {
        DnsFlags {
            qr: bits & 0x8000 != 0,
            opcode: ((bits >> 11) & 0x0F) as u8,
            aa: bits & 0x0400 != 0,
            tc: bits & 0x0200 != 0,
            rd: bits & 0x0100 != 0,
            ra: bits & 0x0080 != 0,
            z: ((bits >> 4) & 0x07) as u8,
            rcode: (bits & 0x0F) as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn record_type(&self) -> RecordType {
        RecordType::from(self.qtype)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsMessage {
    pub id: u16,
    pub flags: DnsFlags,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub additionals: Vec<DnsRecord>,
}

impl DnsMessage {
    /// Decode a message that starts at the DNS header. Any truncation or
    /// malformed name aborts the whole message.
    pub fn parse(msg: &[u8]) -> Option<DnsMessage> {
        let (id, off) = read_u16(msg, 0)?;
        let (flags, off) = read_u16(msg, off)?;
        let (qdcount, off) = read_u16(msg, off)?;
        let (ancount, off) = read_u16(msg, off)?;
        let (nscount, off) = read_u16(msg, off)?;
        let (arcount, mut off) = read_u16(msg, off)?;

        let mut questions = Vec::new();
        for _ in 0..qdcount {
            let (name, next) = read_name(msg, off)?;
            let (qtype, next) = read_u16(msg, next)?;
            let (qclass, next) = read_u16(msg, next)?;
            questions.push(DnsQuestion {
                name,
                qtype,
                qclass,
            });
            off = next;
        }

        let (answers, off) = read_records(msg, off, ancount)?;
        let (authorities, off) = read_records(msg, off, nscount)?;
        let (additionals, _) = read_records(msg, off, arcount)?;

        Some(DnsMessage {
            id,
            flags: DnsFlags::from_bits(flags),
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.qr
    }

    #[inline]
    pub fn rcode(&self) -> Rcode {
        Rcode::from(self.flags.rcode)
    }

    pub fn first_question(&self) -> Option<&DnsQuestion> {
        self.questions.first()
    }
}

fn read_records(msg: &[u8], mut off: usize, count: u16) -> Option<(Vec<DnsRecord>, usize)> {
    let mut records = Vec::new();
    for _ in 0..count {
        let (record, next) = read_record(msg, off)?;
        records.push(record);
        off = next;
    }
    Some((records, off))
}

fn read_record(msg: &[u8], off: usize) -> Option<(DnsRecord, usize)> {
    let (name, off) = read_name(msg, off)?;
    let (rtype, off) = read_u16(msg, off)?;
    let (rclass, off) = read_u16(msg, off)?;
    let (ttl, off) = read_u32(msg, off)?;
    let (rdlength, off) = read_u16(msg, off)?;
    let (rdata_bytes, end) = read_bytes(msg, off, rdlength as usize)?;
    let rdata = render_rdata(msg, off, rdata_bytes, RecordType::from(rtype))?;
    Some((
        DnsRecord {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        },
        end,
    ))
}

/// Render rdata as text. Name-bearing types read from the whole message so
/// pointers resolve.
fn render_rdata(msg: &[u8], off: usize, rdata: &[u8], rtype: RecordType) -> Option<String> {
    match rtype {
        RecordType::A if rdata.len() == 4 => {
            Some(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string())
        }
        RecordType::Aaaa if rdata.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Some(super::ipv6::format_ipv6_full(&Ipv6Addr::from(octets)))
        }
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => {
            read_name(msg, off).map(|(name, _)| name)
        }
        RecordType::Mx => {
            let (preference, next) = read_u16(msg, off)?;
            let (exchange, _) = read_name(msg, next)?;
            Some(format!("{} {}", preference, exchange))
        }
        _ => Some(format!("<{} bytes>", rdata.len())),
    }
}

/// Read a possibly compressed name starting at `offset`.
///
/// Returns the dotted name and the offset where the next field begins: just
/// past the terminating zero label, or just past the first pointer if one
/// was followed.
pub fn read_name(msg: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = offset;
    let mut resume: Option<usize> = None;
    let mut hops = 0usize;

    loop {
        let (len, next) = read_u8(msg, pos)?;
        match len & 0xC0 {
            0x00 if len == 0 => {
                let end = resume.unwrap_or(next);
                return Some((labels.join("."), end));
            }
            0x00 => {
                let (label, after) = read_bytes(msg, next, len as usize)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                pos = after;
            }
            0xC0 => {
                let (low, after) = read_u8(msg, next)?;
                hops += 1;
                if hops > MAX_COMPRESSION_HOPS {
                    return None;
                }
                if resume.is_none() {
                    resume = Some(after);
                }
                pos = (((len & 0x3F) as usize) << 8) | low as usize;
            }
            // 0x40 and 0x80 prefixes are reserved.
            _ => return None,
        }
    }
}
